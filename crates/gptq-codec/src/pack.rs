//! Sub-word packing of quantized codes into 32-bit containers.
//!
//! GPTQ stores `pack_factor = 32 / num_bits` codes per `int32`. Weights are
//! packed along the reduction axis with a stride of `pack_factor`: packed row
//! `r` holds original rows `r * pack_factor + i` for `i in 0..pack_factor`,
//! and row `r * pack_factor + i` occupies bits
//! `[num_bits * i, num_bits * (i + 1))`, lowest bits first.
//!
//! ```text
//! codes (size_k x size_n)           packed (size_k / 8 x size_n), 4-bit
//! row 0  ──┐                        ┌───────────────────────────────┐
//! row 1  ──┤                        │ r7 r6 r5 r4 r3 r2 r1 r0       │ row 0
//!  ...     ├─ rows 0::8 .. 7::8 ──► │ bits 31..28 ........ 3..0     │
//! row 7  ──┘                        └───────────────────────────────┘
//! ```
//!
//! Zero-points use the same slot layout but are packed along the column axis,
//! and the stored value is the logical zero-point minus one.

use gptq_core::{max_q_val, pack_factor, GptqError, Matrix, Result};
use tracing::debug;

/// Pack a `size_k x size_n` code matrix into `size_k / pack_factor` rows.
///
/// The container is assembled as `u32` and reinterpreted as `i32`, which is
/// the dtype the inference kernel reads.
pub fn gptq_pack(codes: &Matrix<u32>, num_bits: u32, size_k: usize, size_n: usize) -> Result<Matrix<i32>> {
    if codes.shape() != (size_k, size_n) {
        return Err(GptqError::shape_2d("codes", (size_k, size_n), codes.shape()));
    }
    let pack_factor = pack_factor(num_bits)?;
    if size_k % pack_factor != 0 {
        return Err(GptqError::Misaligned {
            dim: "size_k",
            value: size_k,
            multiple: pack_factor,
        });
    }
    check_codes(codes.as_slice(), num_bits)?;

    let packed_rows = size_k / pack_factor;
    let mut packed = vec![0u32; packed_rows * size_n];

    for i in 0..pack_factor {
        let shift = num_bits * i as u32;
        // codes[i::pack_factor, :]
        for (r, src_row) in (i..size_k).step_by(pack_factor).enumerate() {
            let dst = &mut packed[r * size_n..(r + 1) * size_n];
            for (word, &code) in dst.iter_mut().zip(codes.row(src_row)) {
                *word |= code << shift;
            }
        }
    }

    debug!(size_k, size_n, num_bits, packed_rows, "packed gptq weights");
    Matrix::from_vec(packed_rows, size_n, packed.into_iter().map(|w| w as i32).collect())
}

/// Inverse of [`gptq_pack`].
pub fn gptq_unpack(packed: &Matrix<i32>, num_bits: u32, size_k: usize, size_n: usize) -> Result<Matrix<u32>> {
    let pack_factor = pack_factor(num_bits)?;
    if size_k % pack_factor != 0 {
        return Err(GptqError::Misaligned {
            dim: "size_k",
            value: size_k,
            multiple: pack_factor,
        });
    }
    let packed_rows = size_k / pack_factor;
    if packed.shape() != (packed_rows, size_n) {
        return Err(GptqError::shape_2d("packed", (packed_rows, size_n), packed.shape()));
    }

    let mask = max_q_val(num_bits);
    let mut codes = Matrix::filled(size_k, size_n, 0u32);

    for i in 0..pack_factor {
        let shift = num_bits * i as u32;
        // codes[i::pack_factor, :] = (packed >> shift) & mask
        for (r, dst_row) in (i..size_k).step_by(pack_factor).enumerate() {
            let dst = codes.row_mut(dst_row);
            for (code, &word) in dst.iter_mut().zip(packed.row(r)) {
                *code = ((word as u32) >> shift) & mask;
            }
        }
    }

    debug!(size_k, size_n, num_bits, "unpacked gptq weights");
    Ok(codes)
}

/// Pack logical zero-points along the column axis.
///
/// `zero_points` is `num_groups x size_n`; the result is
/// `num_groups x size_n / pack_factor`. Each slot stores `z - 1`, so logical
/// zero-points must lie in `[1, 2^num_bits]`.
pub fn pack_zero_points(zero_points: &Matrix<u32>, num_bits: u32) -> Result<Matrix<i32>> {
    let pack_factor = pack_factor(num_bits)?;
    let (num_groups, size_n) = zero_points.shape();
    if size_n % pack_factor != 0 {
        return Err(GptqError::Misaligned {
            dim: "size_n",
            value: size_n,
            multiple: pack_factor,
        });
    }

    let limit = max_q_val(num_bits) + 1;
    let packed_cols = size_n / pack_factor;
    let mut packed = Vec::with_capacity(num_groups * packed_cols);

    for g in 0..num_groups {
        let row = zero_points.row(g);
        for (c, chunk) in row.chunks_exact(pack_factor).enumerate() {
            let mut word = 0u32;
            for (i, &z) in chunk.iter().enumerate() {
                if z == 0 || z > limit {
                    return Err(GptqError::CodeOutOfRange {
                        value: z,
                        index: g * size_n + c * pack_factor + i,
                        num_bits,
                    });
                }
                word |= (z - 1) << (num_bits * i as u32);
            }
            packed.push(word as i32);
        }
    }

    Matrix::from_vec(num_groups, packed_cols, packed)
}

/// Inverse of [`pack_zero_points`]; returns logical zero-points.
pub fn unpack_zero_points(packed: &Matrix<i32>, num_bits: u32) -> Result<Matrix<u32>> {
    let pack_factor = pack_factor(num_bits)?;
    let mask = max_q_val(num_bits);
    let (num_groups, packed_cols) = packed.shape();
    Ok(Matrix::from_fn(num_groups, packed_cols * pack_factor, |g, n| {
        let word = packed.get(g, n / pack_factor) as u32;
        let shift = num_bits * (n % pack_factor) as u32;
        ((word >> shift) & mask) + 1
    }))
}

fn check_codes(codes: &[u32], num_bits: u32) -> Result<()> {
    let max = max_q_val(num_bits);
    match codes.iter().position(|&c| c > max) {
        Some(index) => Err(GptqError::CodeOutOfRange {
            value: codes[index],
            index,
            num_bits,
        }),
        None => Ok(()),
    }
}
