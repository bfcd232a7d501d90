//! act_order row permutation and its sort-based inverse.
//!
//! GPTQ with `desc_act` visits rows in order of decreasing activation
//! magnitude, so a row's group no longer follows from its position. The
//! permutation here is random and simulates that layout. The three tensors
//! (`group_index`, codes, reference) are always permuted together.

use gptq_core::{GptqError, Matrix, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

/// Rows after a random act_order permutation.
#[derive(Debug, Clone, PartialEq)]
pub struct PermutedRows {
    /// Reference weights, permuted.
    pub reference: Matrix<f32>,
    /// Quantized codes, permuted.
    pub codes: Matrix<u32>,
    /// Group of each permuted row.
    pub group_index: Vec<u32>,
    /// `permutation[i]` is the original row now at position `i`.
    pub permutation: Vec<u32>,
}

/// Rows restored to group-contiguous order.
#[derive(Debug, Clone, PartialEq)]
pub struct SortedRows {
    /// Quantized codes, sorted by group.
    pub codes: Matrix<u32>,
    /// Monotone non-decreasing group index.
    pub group_index: Vec<u32>,
    /// `sort_indices[i]` is the input row now at position `i`.
    pub sort_indices: Vec<u32>,
}

/// Group of every row before permutation: `i / group_size`.
pub fn contiguous_group_index(size_k: usize, group_size: usize) -> Vec<u32> {
    (0..size_k).map(|i| (i / group_size) as u32).collect()
}

/// Apply one random permutation to the rows of `codes`, `reference` and the
/// group index.
pub fn permute_rows<R: Rng + ?Sized>(
    codes: &Matrix<u32>,
    reference: &Matrix<f32>,
    group_size: usize,
    rng: &mut R,
) -> Result<PermutedRows> {
    if codes.shape() != reference.shape() {
        return Err(GptqError::shape_2d("reference", codes.shape(), reference.shape()));
    }
    if group_size == 0 {
        return Err(GptqError::InvalidArgument("group_size must be positive".to_string()));
    }

    let size_k = codes.rows();
    let group_index = contiguous_group_index(size_k, group_size);

    let mut permutation: Vec<u32> = (0..size_k as u32).collect();
    permutation.shuffle(rng);

    let group_index: Vec<u32> = permutation.iter().map(|&p| group_index[p as usize]).collect();
    let codes = codes.select_rows(&permutation)?;
    let reference = reference.select_rows(&permutation)?;

    debug!(size_k, group_size, "applied act_order row permutation");

    Ok(PermutedRows {
        reference,
        codes,
        group_index,
        permutation,
    })
}

/// Stable-sort rows by group index.
///
/// This restores group locality before packing. Rows of the same group keep
/// their relative order from the input.
pub fn sort_weights(codes: &Matrix<u32>, group_index: &[u32]) -> Result<SortedRows> {
    if group_index.len() != codes.rows() {
        return Err(GptqError::ShapeMismatch {
            name: "group_index",
            expected: vec![codes.rows()],
            actual: vec![group_index.len()],
        });
    }

    let mut sort_indices: Vec<u32> = (0..group_index.len() as u32).collect();
    // `sort_by_key` is stable.
    sort_indices.sort_by_key(|&i| group_index[i as usize]);

    let sorted_index: Vec<u32> = sort_indices.iter().map(|&i| group_index[i as usize]).collect();
    let codes = codes.select_rows(&sort_indices)?;

    debug!(size_k = group_index.len(), "sorted rows by group index");

    Ok(SortedRows {
        codes,
        group_index: sorted_index,
        sort_indices,
    })
}
