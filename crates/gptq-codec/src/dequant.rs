//! Dequantization of GPTQ packed tensors.
//!
//! Inputs are the tensors a GPTQ checkpoint stores for one linear layer:
//!
//! - `qweight`: `size_k / pack_factor x size_n` containers, packed along rows
//! - `qzeros`: `num_groups x size_n / pack_factor` containers, packed along columns
//! - `scales`: `num_groups x size_n`
//! - `g_idx`: optional group of every row
//!
//! Dequantization: `value = scale * (code - (raw_zero + 1))`. The output is
//! transposed to `size_n x size_k`, the orientation inference kernels expect.

use gptq_core::{pack_factor, GptqError, Matrix, Result};
use tracing::debug;

use crate::pack::{gptq_unpack, unpack_zero_points};

/// Reconstruct floating point weights from packed GPTQ tensors.
///
/// `group_index` may be empty, in which case row `k` belongs to group
/// `k / group_size`. When present it must have one entry per row, and each
/// row is scaled by the group it names.
pub fn dequantize_weights(
    qweight: &Matrix<i32>,
    qzeros: &Matrix<i32>,
    scales: &Matrix<f32>,
    group_index: &[u32],
    num_bits: u32,
    group_size: i32,
) -> Result<Matrix<f32>> {
    let pack_factor = pack_factor(num_bits)?;
    let size_k = qweight.rows() * pack_factor;
    let size_n = qweight.cols();

    let group_size = if group_size == -1 {
        size_k
    } else if group_size > 0 {
        group_size as usize
    } else {
        return Err(GptqError::InvalidArgument(format!(
            "group_size must be positive or -1, got {group_size}"
        )));
    };
    if group_size == 0 || size_k % group_size != 0 {
        return Err(GptqError::Misaligned {
            dim: "size_k",
            value: size_k,
            multiple: group_size,
        });
    }
    let num_groups = size_k / group_size;

    if scales.shape() != (num_groups, size_n) {
        return Err(GptqError::shape_2d("scales", (num_groups, size_n), scales.shape()));
    }
    if size_n % pack_factor != 0 {
        return Err(GptqError::Misaligned {
            dim: "size_n",
            value: size_n,
            multiple: pack_factor,
        });
    }
    let zeros_shape = (num_groups, size_n / pack_factor);
    if qzeros.shape() != zeros_shape {
        return Err(GptqError::shape_2d("qzeros", zeros_shape, qzeros.shape()));
    }
    if !group_index.is_empty() {
        if group_index.len() != size_k {
            return Err(GptqError::ShapeMismatch {
                name: "group_index",
                expected: vec![size_k],
                actual: vec![group_index.len()],
            });
        }
        if let Some(&g) = group_index.iter().find(|&&g| g as usize >= num_groups) {
            return Err(GptqError::InvalidArgument(format!(
                "group index {g} out of range for {num_groups} groups"
            )));
        }
    }

    let codes = gptq_unpack(qweight, num_bits, size_k, size_n)?;
    let zeros = unpack_zero_points(qzeros, num_bits)?;

    let mut out = Matrix::filled(size_n, size_k, 0.0f32);
    for k in 0..size_k {
        let g = if group_index.is_empty() {
            k / group_size
        } else {
            group_index[k] as usize
        };
        let code_row = codes.row(k);
        let zero_row = zeros.row(g);
        let scale_row = scales.row(g);
        for n in 0..size_n {
            let q = code_row[n] as f32 - zero_row[n] as f32;
            out.set(n, k, scale_row[n] * q);
        }
    }

    debug!(size_k, size_n, num_bits, group_size, "dequantized gptq weights");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::{gptq_pack, pack_zero_points};

    #[test]
    fn test_dequantize_transposes_output() {
        // 8 rows x 8 cols of 4-bit codes, one group, zero-point 8, scale 0.5.
        let codes = Matrix::from_fn(8, 8, |r, c| ((r + c) % 16) as u32);
        let qweight = gptq_pack(&codes, 4, 8, 8).unwrap();
        let qzeros = pack_zero_points(&Matrix::filled(1, 8, 8), 4).unwrap();
        let scales = Matrix::filled(1, 8, 0.5f32);

        let w = dequantize_weights(&qweight, &qzeros, &scales, &[], 4, -1).unwrap();
        assert_eq!(w.shape(), (8, 8));
        for k in 0..8 {
            for n in 0..8 {
                let expected = 0.5 * (codes.get(k, n) as f32 - 8.0);
                assert_eq!(w.get(n, k), expected);
            }
        }
    }

    #[test]
    fn test_raw_zero_is_offset_by_one() {
        // All-zero qzeros means logical zero-point 1.
        let codes = Matrix::filled(4, 4, 1u32);
        let qweight = gptq_pack(&codes, 8, 4, 4).unwrap();
        let qzeros = Matrix::filled(1, 1, 0i32);
        let scales = Matrix::filled(1, 4, 3.0f32);

        let w = dequantize_weights(&qweight, &qzeros, &scales, &[], 8, 4).unwrap();
        assert!(w.as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_rectangular_output_shape() {
        let codes = Matrix::filled(32, 8, 9u32);
        let qweight = gptq_pack(&codes, 4, 32, 8).unwrap();
        let qzeros = pack_zero_points(&Matrix::filled(2, 8, 8), 4).unwrap();
        let scales = Matrix::from_fn(2, 8, |g, _| if g == 0 { 1.0 } else { 2.0 });

        let w = dequantize_weights(&qweight, &qzeros, &scales, &[], 4, 16).unwrap();
        assert_eq!(w.shape(), (8, 32));
        assert_eq!(w.get(0, 0), 1.0);
        assert_eq!(w.get(7, 31), 2.0);
    }

    #[test]
    fn test_group_index_selects_scale() {
        let codes = Matrix::filled(16, 8, 10u32);
        let qweight = gptq_pack(&codes, 4, 16, 8).unwrap();
        let qzeros = pack_zero_points(&Matrix::filled(2, 8, 8), 4).unwrap();
        let scales = Matrix::from_fn(2, 8, |g, _| (g + 1) as f32);
        // Rows alternate between groups.
        let g_idx: Vec<u32> = (0..16).map(|k| (k % 2) as u32).collect();

        let w = dequantize_weights(&qweight, &qzeros, &scales, &g_idx, 4, 8).unwrap();
        for k in 0..16 {
            let expected = if k % 2 == 0 { 2.0 } else { 4.0 };
            assert_eq!(w.get(3, k), expected);
        }
    }

    #[test]
    fn test_empty_qweight_rejected() {
        let qweight = Matrix::filled(0, 8, 0i32);
        let qzeros = Matrix::filled(1, 1, 0i32);
        let scales = Matrix::filled(1, 8, 1.0f32);
        assert!(matches!(
            dequantize_weights(&qweight, &qzeros, &scales, &[], 4, -1),
            Err(GptqError::Misaligned { dim: "size_k", value: 0, multiple: 0 })
        ));
    }

    #[test]
    fn test_eight_bit_zero_points_full_range() {
        // Logical zero-points 1..=256; raw 255 reaches the top byte.
        let size_n = 256;
        let zeros = Matrix::from_fn(1, size_n, |_, n| n as u32 + 1);
        let qzeros = pack_zero_points(&zeros, 8).unwrap();
        let codes = Matrix::from_fn(4, size_n, |k, _| 252 + k as u32);
        let qweight = gptq_pack(&codes, 8, 4, size_n).unwrap();
        let scales = Matrix::filled(1, size_n, 0.5f32);

        let w = dequantize_weights(&qweight, &qzeros, &scales, &[], 8, -1).unwrap();
        assert_eq!(w.shape(), (size_n, 4));
        for n in 0..size_n {
            for k in 0..4 {
                let expected = 0.5 * ((252 + k) as f32 - (n + 1) as f32);
                assert_eq!(w.get(n, k), expected);
            }
        }
        assert_eq!(w.get(255, 3), 0.5 * (255.0 - 256.0));
    }

    #[test]
    fn test_shape_checks() {
        let qweight = Matrix::filled(2, 8, 0i32); // size_k = 16
        let qzeros = Matrix::filled(1, 1, 0i32);
        let scales = Matrix::filled(1, 8, 1.0f32);

        assert!(dequantize_weights(&qweight, &qzeros, &scales, &[], 4, -1).is_ok());
        assert!(matches!(
            dequantize_weights(&qweight, &qzeros, &scales, &[], 4, 8),
            Err(GptqError::ShapeMismatch { name: "scales", .. })
        ));
        assert!(matches!(
            dequantize_weights(&qweight, &Matrix::filled(1, 2, 0), &scales, &[], 4, -1),
            Err(GptqError::ShapeMismatch { name: "qzeros", .. })
        ));
        assert!(matches!(
            dequantize_weights(&qweight, &qzeros, &scales, &[0; 3], 4, -1),
            Err(GptqError::ShapeMismatch { name: "group_index", .. })
        ));
        assert!(matches!(
            dequantize_weights(&qweight, &qzeros, &scales, &[1; 16], 4, -1),
            Err(GptqError::InvalidArgument(_))
        ));
        assert!(matches!(
            dequantize_weights(&qweight, &qzeros, &scales, &[], 4, 0),
            Err(GptqError::InvalidArgument(_))
        ));
        assert!(matches!(
            dequantize_weights(&qweight, &qzeros, &scales, &[], 4, 32),
            Err(GptqError::Misaligned { .. })
        ));
        assert!(matches!(
            dequantize_weights(&qweight, &qzeros, &scales, &[], 5, -1),
            Err(GptqError::UnsupportedNumBits(5))
        ));
    }
}
