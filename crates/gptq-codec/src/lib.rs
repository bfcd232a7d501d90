//! GPTQ weight quantization codec.
//!
//! Converts dense weight matrices into the packed 4-bit / 8-bit format read
//! by GPTQ and Marlin inference kernels, and back.
//!
//! This crate provides:
//! - Grouped symmetric quantization with optional act_order permutation
//! - Row permutation and its sort-based inverse
//! - Packing of codes and zero-points into 32-bit containers
//! - Dequantization of packed tensors
//! - A checkpoint writer assembling `qweight`, `qzeros`, `scales` and `g_idx`
//!
//! # Example
//!
//! ```ignore
//! use gptq_codec::{quantize_weights, GptqCheckpoint};
//! use rand::SeedableRng;
//!
//! let mut rng = rand::rngs::StdRng::seed_from_u64(0);
//! let quantized = quantize_weights(&weights, 4, 128, false, &mut rng)?;
//! let checkpoint = GptqCheckpoint::from_quantized(&quantized, 4, 128)?;
//!
//! // size_n x size_k
//! let restored = checkpoint.dequantize()?;
//! ```

#![warn(missing_docs)]

pub mod checkpoint;
pub mod dequant;
pub mod pack;
pub mod permute;
pub mod quantize;

pub use checkpoint::GptqCheckpoint;
pub use dequant::dequantize_weights;
pub use pack::{gptq_pack, gptq_unpack, pack_zero_points, unpack_zero_points};
pub use permute::{contiguous_group_index, permute_rows, sort_weights, PermutedRows, SortedRows};
pub use quantize::{quantize_weights, GroupQuantizer, QuantizedWeights};

pub use gptq_core::{pack_factor, Dtype, GptqError, Matrix, QuantConfig, Result, WeightTensor};
