//! Common type definitions.

use half::{bf16, f16};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{GptqError, Result};

/// Data type for tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    /// 32-bit floating point.
    #[default]
    Float32,
    /// 16-bit floating point.
    Float16,
    /// Brain floating point (16-bit).
    BFloat16,
    /// 32-bit integer.
    Int32,
}

impl Dtype {
    /// Whether the dtype is a floating point type.
    #[must_use]
    pub const fn is_floating_point(&self) -> bool {
        !matches!(self, Self::Int32)
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Float32 => "float32",
            Self::Float16 => "float16",
            Self::BFloat16 => "bfloat16",
            Self::Int32 => "int32",
        };
        f.write_str(name)
    }
}

/// Dense row-major 2D array.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

impl<T: Copy> Matrix<T> {
    /// Wrap a row-major buffer.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<T>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(GptqError::ShapeMismatch {
                name: "matrix data",
                expected: vec![rows * cols],
                actual: vec![data.len()],
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// Matrix filled with a single value.
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    /// Build a matrix element by element.
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                data.push(f(r, c));
            }
        }
        Self { rows, cols, data }
    }

    /// Number of rows.
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `(rows, cols)`.
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Row-major element buffer.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Element at `(row, col)`.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> T {
        self.data[row * self.cols + col]
    }

    /// Overwrite the element at `(row, col)`.
    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: T) {
        self.data[row * self.cols + col] = value;
    }

    /// One row as a slice.
    #[inline]
    pub fn row(&self, row: usize) -> &[T] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// One row as a mutable slice.
    #[inline]
    pub fn row_mut(&mut self, row: usize) -> &mut [T] {
        &mut self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// Gather rows: output row `i` is input row `indices[i]`.
    ///
    /// Fails if an index is out of bounds.
    pub fn select_rows(&self, indices: &[u32]) -> Result<Self> {
        let mut data = Vec::with_capacity(indices.len() * self.cols);
        for &idx in indices {
            let idx = idx as usize;
            if idx >= self.rows {
                return Err(GptqError::InvalidArgument(format!(
                    "row index {idx} out of bounds for {} rows",
                    self.rows
                )));
            }
            data.extend_from_slice(self.row(idx));
        }
        Ok(Self {
            rows: indices.len(),
            cols: self.cols,
            data,
        })
    }

    /// Transposed copy.
    pub fn transpose(&self) -> Self {
        Self::from_fn(self.cols, self.rows, |r, c| self.get(c, r))
    }

    /// Apply `f` elementwise.
    pub fn map<U: Copy>(&self, f: impl FnMut(T) -> U) -> Matrix<U> {
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().copied().map(f).collect(),
        }
    }
}

/// A weight matrix tagged with its storage dtype.
#[derive(Debug, Clone, PartialEq)]
pub enum WeightTensor {
    /// 32-bit float weights.
    F32(Matrix<f32>),
    /// IEEE half precision weights.
    F16(Matrix<f16>),
    /// bfloat16 weights.
    BF16(Matrix<bf16>),
    /// Integer tensor (not quantizable).
    I32(Matrix<i32>),
}

impl WeightTensor {
    /// Storage dtype.
    pub fn dtype(&self) -> Dtype {
        match self {
            Self::F32(_) => Dtype::Float32,
            Self::F16(_) => Dtype::Float16,
            Self::BF16(_) => Dtype::BFloat16,
            Self::I32(_) => Dtype::Int32,
        }
    }

    /// `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        match self {
            Self::F32(m) => m.shape(),
            Self::F16(m) => m.shape(),
            Self::BF16(m) => m.shape(),
            Self::I32(m) => m.shape(),
        }
    }

    /// Widen floating point weights to `f32`.
    ///
    /// Integer tensors are rejected with [`GptqError::DtypeMismatch`].
    pub fn to_f32(&self) -> Result<Matrix<f32>> {
        match self {
            Self::F32(m) => Ok(m.clone()),
            Self::F16(m) => Ok(m.map(f16::to_f32)),
            Self::BF16(m) => Ok(m.map(bf16::to_f32)),
            Self::I32(_) => Err(GptqError::DtypeMismatch {
                expected: "floating point".to_string(),
                actual: self.dtype(),
            }),
        }
    }
}

impl From<Matrix<f32>> for WeightTensor {
    fn from(m: Matrix<f32>) -> Self {
        Self::F32(m)
    }
}

impl From<Matrix<f16>> for WeightTensor {
    fn from(m: Matrix<f16>) -> Self {
        Self::F16(m)
    }
}

impl From<Matrix<bf16>> for WeightTensor {
    fn from(m: Matrix<bf16>) -> Self {
        Self::BF16(m)
    }
}

impl From<Matrix<i32>> for WeightTensor {
    fn from(m: Matrix<i32>) -> Self {
        Self::I32(m)
    }
}
