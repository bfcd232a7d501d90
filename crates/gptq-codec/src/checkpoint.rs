//! Assemble the tensors a GPTQ checkpoint stores for one linear layer.

use gptq_core::{half_q_val, resolve_group_size, GptqError, Matrix, Result};
use tracing::debug;

use crate::dequant::dequantize_weights;
use crate::pack::{gptq_pack, pack_zero_points};
use crate::permute::sort_weights;
use crate::quantize::QuantizedWeights;

/// Packed GPTQ tensors for one weight matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct GptqCheckpoint {
    /// Packed codes, `size_k / pack_factor x size_n`.
    pub qweight: Matrix<i32>,
    /// Packed zero-points, `num_groups x size_n / pack_factor`.
    pub qzeros: Matrix<i32>,
    /// Per-group scales, `num_groups x size_n`.
    pub scales: Matrix<f32>,
    /// Group of every packed row. Empty without act_order.
    pub g_idx: Vec<u32>,
    /// Rows of the act_order layout in packed order. Empty without act_order.
    pub sort_indices: Vec<u32>,
    /// Bits per code.
    pub num_bits: u32,
    /// Rows per group.
    pub group_size: usize,
}

impl GptqCheckpoint {
    /// Pack quantizer output.
    ///
    /// act_order output is first sorted back into group-contiguous order so
    /// every packed container holds rows of a single group.
    pub fn from_quantized(quantized: &QuantizedWeights, num_bits: u32, group_size: i32) -> Result<Self> {
        let (size_k, size_n) = quantized.codes.shape();
        let group_size = resolve_group_size(group_size, size_k)?;
        let num_groups = size_k / group_size;
        if quantized.scales.shape() != (num_groups, size_n) {
            return Err(GptqError::shape_2d(
                "scales",
                (num_groups, size_n),
                quantized.scales.shape(),
            ));
        }

        let (codes, g_idx, sort_indices) = if quantized.is_act_order() {
            let sorted = sort_weights(&quantized.codes, &quantized.group_index)?;
            (sorted.codes, sorted.group_index, sorted.sort_indices)
        } else {
            (quantized.codes.clone(), Vec::new(), Vec::new())
        };

        let qweight = gptq_pack(&codes, num_bits, size_k, size_n)?;
        let zero_points = Matrix::filled(num_groups, size_n, half_q_val(num_bits));
        let qzeros = pack_zero_points(&zero_points, num_bits)?;

        debug!(size_k, size_n, num_bits, group_size, act_order = !g_idx.is_empty(), "built gptq checkpoint");

        Ok(Self {
            qweight,
            qzeros,
            scales: quantized.scales.clone(),
            g_idx,
            sort_indices,
            num_bits,
            group_size,
        })
    }

    /// Dequantize back to `size_n x size_k` floats.
    pub fn dequantize(&self) -> Result<Matrix<f32>> {
        dequantize_weights(
            &self.qweight,
            &self.qzeros,
            &self.scales,
            &self.g_idx,
            self.num_bits,
            self.group_size as i32,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantize::quantize_weights;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn weights(seed: u64, size_k: usize, size_n: usize) -> Matrix<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        Matrix::from_fn(size_k, size_n, |_, _| rng.gen_range(-2.0f32..2.0))
    }

    #[test]
    fn test_checkpoint_matches_reference() {
        let w = weights(0, 128, 16);
        let mut rng = StdRng::seed_from_u64(1);
        let q = quantize_weights(&w.into(), 4, 32, false, &mut rng).unwrap();
        let ckpt = GptqCheckpoint::from_quantized(&q, 4, 32).unwrap();

        assert_eq!(ckpt.qweight.shape(), (16, 16));
        assert_eq!(ckpt.qzeros.shape(), (4, 2));
        assert!(ckpt.g_idx.is_empty());
        assert!(ckpt.sort_indices.is_empty());

        let deq = ckpt.dequantize().unwrap();
        assert_eq!(deq, q.reference.transpose());
    }

    #[test]
    fn test_checkpoint_act_order_is_group_sorted() {
        let w = weights(2, 128, 8);
        let mut rng = StdRng::seed_from_u64(3);
        let q = quantize_weights(&w.into(), 8, 64, true, &mut rng).unwrap();
        let ckpt = GptqCheckpoint::from_quantized(&q, 8, 64).unwrap();

        assert_eq!(ckpt.qweight.shape(), (32, 8));
        assert!(ckpt.g_idx.windows(2).all(|p| p[0] <= p[1]));
        assert_eq!(ckpt.sort_indices.len(), 128);

        // Row i of the packed layout is row sort_indices[i] of the quantizer output.
        let expected = q.reference.select_rows(&ckpt.sort_indices).unwrap();
        assert_eq!(ckpt.dequantize().unwrap(), expected.transpose());
    }

    #[test]
    fn test_checkpoint_rejects_mismatched_group_size() {
        let w = weights(4, 64, 8);
        let q = quantize_weights(&w.into(), 4, 32, false, &mut StdRng::seed_from_u64(0)).unwrap();
        assert!(matches!(
            GptqCheckpoint::from_quantized(&q, 4, 64),
            Err(GptqError::ShapeMismatch { name: "scales", .. })
        ));
    }
}
