//! Error types for the GPTQ codec.

use thiserror::Error;

use crate::Dtype;

/// Result type alias for codec operations.
pub type Result<T> = std::result::Result<T, GptqError>;

/// Main error type for codec operations.
///
/// Every variant except [`GptqError::Serialization`] is a precondition
/// violation: the caller supplied a configuration or tensor the format cannot
/// represent. They are reported before any output is produced.
#[derive(Error, Debug)]
pub enum GptqError {
    /// Bit width other than 4 or 8.
    #[error("Unsupported num_bits = {0} (supported: 4, 8)")]
    UnsupportedNumBits(u32),

    /// Group size outside the supported set and not equal to `size_k`.
    #[error("Unsupported group_size = {group_size} for size_k = {size_k}")]
    UnsupportedGroupSize {
        /// Requested group size.
        group_size: i32,
        /// Number of rows in the weight matrix.
        size_k: usize,
    },

    /// Group size larger than the reduction dimension.
    #[error("group_size = {group_size} exceeds size_k = {size_k}")]
    GroupSizeExceedsRows {
        /// Resolved group size.
        group_size: usize,
        /// Number of rows in the weight matrix.
        size_k: usize,
    },

    /// act_order requested without grouping.
    #[error("For act_order, group_size = {group_size} must be less than size_k = {size_k}")]
    ActOrderRequiresGroups {
        /// Resolved group size.
        group_size: usize,
        /// Number of rows in the weight matrix.
        size_k: usize,
    },

    /// Data type mismatch.
    #[error("Dtype mismatch: expected {expected}, got {actual}")]
    DtypeMismatch {
        /// Expected dtype.
        expected: String,
        /// Actual dtype.
        actual: Dtype,
    },

    /// Tensor shape mismatch.
    #[error("Shape mismatch for {name}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Tensor name.
        name: &'static str,
        /// Expected shape.
        expected: Vec<usize>,
        /// Actual shape.
        actual: Vec<usize>,
    },

    /// A dimension is not a multiple of the required block.
    #[error("{dim} = {value} is not a multiple of {multiple}")]
    Misaligned {
        /// Dimension name.
        dim: &'static str,
        /// Dimension value.
        value: usize,
        /// Required divisor.
        multiple: usize,
    },

    /// An integer code does not fit its bit width.
    #[error("Code {value} at index {index} does not fit in {num_bits} bits")]
    CodeOutOfRange {
        /// Offending value.
        value: u32,
        /// Flat index of the offending value.
        index: usize,
        /// Bit width of the container slot.
        num_bits: u32,
    },

    /// Invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration errors.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization errors.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GptqError {
    /// Shorthand for a 2D shape mismatch.
    pub fn shape_2d(name: &'static str, expected: (usize, usize), actual: (usize, usize)) -> Self {
        Self::ShapeMismatch {
            name,
            expected: vec![expected.0, expected.1],
            actual: vec![actual.0, actual.1],
        }
    }
}
