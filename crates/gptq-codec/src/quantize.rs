//! Grouped symmetric quantization.
//!
//! Rows are split into consecutive blocks of `group_size`. Each
//! (group, column) pair gets one scale derived from its absolute maximum:
//!
//! ```text
//! max_q_val  = 2^num_bits - 1
//! half_q_val = (max_q_val + 1) / 2
//! scale      = max(|w|) * 2 / max_q_val
//! code       = clamp(round(w / scale) + half_q_val, 0, max_q_val)
//! reference  = (code - half_q_val) * scale
//! ```
//!
//! `round` is round-half-to-even. A group whose scale is zero keeps it; its
//! codes collapse to `half_q_val` and its reference to `0.0`. That covers
//! all-zero groups and groups whose absmax is so small (subnormal) that the
//! scale underflows to zero. For the latter the reconstruction error is the
//! absmax itself rather than `scale / 2`.

use gptq_core::{half_q_val, max_q_val, GptqError, Matrix, QuantConfig, Result, WeightTensor};
use rand::Rng;
use tracing::{debug, warn};

use crate::permute::permute_rows;

/// Output of [`quantize_weights`].
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedWeights {
    /// Dequantized reference (`size_k x size_n`), permuted with `codes`.
    pub reference: Matrix<f32>,
    /// Codes in `[0, 2^num_bits - 1]` (`size_k x size_n`).
    pub codes: Matrix<u32>,
    /// Per-group scales (`num_groups x size_n`), in original group order.
    pub scales: Matrix<f32>,
    /// Group of each row; empty unless act_order was applied.
    pub group_index: Vec<u32>,
    /// Row permutation; empty unless act_order was applied.
    pub permutation: Vec<u32>,
}

impl QuantizedWeights {
    /// Whether act_order permuted the rows.
    pub fn is_act_order(&self) -> bool {
        !self.permutation.is_empty()
    }

    /// Number of scale groups.
    pub fn num_groups(&self) -> usize {
        self.scales.rows()
    }
}

/// Group quantizer bound to one [`QuantConfig`].
#[derive(Debug, Clone)]
pub struct GroupQuantizer {
    config: QuantConfig,
}

impl GroupQuantizer {
    /// Create a new quantizer, validating the config.
    pub fn new(config: QuantConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// 4-bit quantizer.
    pub fn q4(group_size: i32) -> Result<Self> {
        Self::new(QuantConfig::new(4, group_size))
    }

    /// 8-bit quantizer.
    pub fn q8(group_size: i32) -> Result<Self> {
        Self::new(QuantConfig::new(8, group_size))
    }

    /// Get the config.
    pub fn config(&self) -> &QuantConfig {
        &self.config
    }

    /// Quantize a weight matrix. `rng` is only drawn from when act_order is
    /// enabled.
    pub fn quantize<R: Rng + ?Sized>(&self, weights: &WeightTensor, rng: &mut R) -> Result<QuantizedWeights> {
        quantize_weights(
            weights,
            self.config.num_bits,
            self.config.group_size,
            self.config.act_order,
            rng,
        )
    }
}

/// Quantize `weights` (`size_k x size_n`) to `num_bits` codes with one scale
/// per group of `group_size` rows and column.
///
/// With `act_order`, rows of codes and reference are randomly permuted and
/// the group index and permutation are returned alongside.
pub fn quantize_weights<R: Rng + ?Sized>(
    weights: &WeightTensor,
    num_bits: u32,
    group_size: i32,
    act_order: bool,
    rng: &mut R,
) -> Result<QuantizedWeights> {
    let w = weights.to_f32()?;
    let config = QuantConfig::new(num_bits, group_size).with_act_order(act_order);
    config.validate()?;

    let (size_k, size_n) = w.shape();
    let group_size = config.resolve_group_size(size_k)?;

    if act_order && group_size >= size_k {
        return Err(GptqError::ActOrderRequiresGroups { group_size, size_k });
    }
    if let Some(index) = w.as_slice().iter().position(|v| !v.is_finite()) {
        return Err(GptqError::InvalidArgument(format!(
            "non-finite weight at row {}, column {}",
            index / size_n,
            index % size_n
        )));
    }

    let num_groups = size_k / group_size;
    debug!(size_k, size_n, num_bits, group_size, num_groups, act_order, "quantizing weights");

    let max_q = max_q_val(num_bits);
    let half_q = half_q_val(num_bits);

    let scales = group_scales(&w, group_size, max_q);
    let zero_groups = scales.as_slice().iter().filter(|&&s| s == 0.0).count();
    if zero_groups > 0 {
        warn!(zero_groups, "quantization groups with zero scale; codes collapsed to midpoint");
    }

    let mut codes = Matrix::filled(size_k, size_n, half_q);
    let mut reference = Matrix::filled(size_k, size_n, 0.0f32);

    for k in 0..size_k {
        let s_row = scales.row(k / group_size);
        for ((q, &v), &s) in codes.row_mut(k).iter_mut().zip(w.row(k)).zip(s_row) {
            *q = quantize_value(v, s, half_q, max_q);
        }
        for ((r, &q), &s) in reference.row_mut(k).iter_mut().zip(codes.row(k)).zip(s_row) {
            *r = (q as f32 - half_q as f32) * s;
        }
    }

    let mut out = QuantizedWeights {
        reference,
        codes,
        scales,
        group_index: Vec::new(),
        permutation: Vec::new(),
    };

    if act_order {
        let permuted = permute_rows(&out.codes, &out.reference, group_size, rng)?;
        out.reference = permuted.reference;
        out.codes = permuted.codes;
        out.group_index = permuted.group_index;
        out.permutation = permuted.permutation;
    }

    Ok(out)
}

/// `max(|w|) * (2 / max_q)` for every (group, column).
fn group_scales(w: &Matrix<f32>, group_size: usize, max_q: u32) -> Matrix<f32> {
    let (size_k, size_n) = w.shape();
    let num_groups = size_k / group_size;
    let mut scales = Matrix::filled(num_groups, size_n, 0.0f32);

    for k in 0..size_k {
        let amax = scales.row_mut(k / group_size);
        for (m, &v) in amax.iter_mut().zip(w.row(k)) {
            *m = m.max(v.abs());
        }
    }

    // 2 => symmetric. `amax * 2.0` overflows above f32::MAX / 2.
    let ratio = 2.0 / max_q as f32;
    scales.map(|amax| amax * ratio)
}

/// Quantize one value against its group scale.
#[inline]
fn quantize_value(v: f32, scale: f32, half_q: u32, max_q: u32) -> u32 {
    if scale == 0.0 {
        return half_q;
    }
    let q = (v / scale).round_ties_even() + half_q as f32;
    q.clamp(0.0, max_q as f32) as u32
}
