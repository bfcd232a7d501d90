//! Core types and configuration for the GPTQ weight codec.
//!
//! This crate provides the foundational pieces shared by the codec:
//!
//! - [`Matrix`], a dense row-major container, and [`WeightTensor`], a
//!   dtype-tagged weight matrix
//! - [`QuantConfig`] and the bit-width / group-size helpers
//! - Error handling infrastructure

#![warn(missing_docs)]

mod config;
mod error;
mod types;

pub use config::*;
pub use error::*;
pub use types::*;
