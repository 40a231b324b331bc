//! Row-major tensor container used by every stage of the pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{NpuError, Result};

/// Element type of a [`Tensor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    #[serde(rename = "int8")]
    I8,
    #[serde(rename = "float32")]
    F32,
}

impl DType {
    /// Canonical name used in manifests and diagnostics.
    pub const fn name(self) -> &'static str {
        match self {
            Self::I8 => "int8",
            Self::F32 => "float32",
        }
    }

    pub const fn size_in_bytes(self) -> usize {
        match self {
            Self::I8 => 1,
            Self::F32 => 4,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for DType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "int8" | "i8" => Ok(Self::I8),
            "float32" | "f32" => Ok(Self::F32),
            other => Err(format!("unknown dtype '{other}'. Expected one of: int8, float32")),
        }
    }
}

/// Typed payload of a [`Tensor`].
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    I8(Vec<i8>),
    F32(Vec<f32>),
}

impl TensorData {
    pub fn len(&self) -> usize {
        match self {
            Self::I8(v) => v.len(),
            Self::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> DType {
        match self {
            Self::I8(_) => DType::I8,
            Self::F32(_) => DType::F32,
        }
    }
}

/// Product of `shape`, or `None` if it overflows `usize`.
pub fn checked_numel(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

/// An n-dimensional, row-major tensor.
///
/// Every dimension is strictly positive and the payload length always equals
/// the product of the shape. Tensors are immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: TensorData,
}

impl Tensor {
    /// Build a tensor, validating the shape against the payload length.
    pub fn new(shape: Vec<usize>, data: TensorData) -> Result<Self> {
        if let Some(axis) = shape.iter().position(|&d| d == 0) {
            return Err(NpuError::invalid_arg(
                "tensor",
                format!("dimension {axis} of shape {shape:?} is zero"),
            ));
        }
        let numel = checked_numel(&shape).ok_or_else(|| NpuError::ShapeMismatch {
            op: "tensor",
            expected: format!("an element count that fits in usize for shape {shape:?}"),
            found: format!("{} elements", data.len()),
        })?;
        if numel != data.len() {
            return Err(NpuError::ShapeMismatch {
                op: "tensor",
                expected: format!("{numel} elements for shape {shape:?}"),
                found: format!("{} elements", data.len()),
            });
        }
        Ok(Self { shape, data })
    }

    pub fn from_i8(shape: Vec<usize>, data: Vec<i8>) -> Result<Self> {
        Self::new(shape, TensorData::I8(data))
    }

    pub fn from_f32(shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        Self::new(shape, TensorData::F32(data))
    }

    /// Reinterpret raw bytes as two's-complement INT8 values.
    pub fn from_i8_bytes(shape: Vec<usize>, bytes: &[u8]) -> Result<Self> {
        Self::from_i8(shape, bytes.iter().map(|&b| b as i8).collect())
    }

    /// All-zero INT8 tensor.
    pub fn zeros_i8(shape: Vec<usize>) -> Result<Self> {
        let numel = checked_numel(&shape)
            .ok_or_else(|| NpuError::invalid_arg("tensor", format!("shape {shape:?} has too many elements")))?;
        Self::from_i8(shape, vec![0; numel])
    }

    /// `n x n` INT8 identity matrix.
    pub fn identity_i8(n: usize) -> Result<Self> {
        let numel = n
            .checked_mul(n)
            .ok_or_else(|| NpuError::invalid_arg("tensor", format!("identity of size {n} is too large")))?;
        let mut data = vec![0i8; numel];
        for i in 0..n {
            data[i * n + i] = 1;
        }
        Self::from_i8(vec![n, n], data)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    pub fn as_i8(&self) -> Option<&[i8]> {
        match &self.data {
            TensorData::I8(v) => Some(v),
            TensorData::F32(_) => None,
        }
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match &self.data {
            TensorData::F32(v) => Some(v),
            TensorData::I8(_) => None,
        }
    }

    /// INT8 payload, or [`NpuError::InvalidDtype`] naming the operation and operand.
    pub fn expect_i8(&self, op: &'static str, operand: &'static str) -> Result<&[i8]> {
        self.as_i8().ok_or(NpuError::InvalidDtype {
            op,
            operand,
            expected: DType::I8,
            found: self.dtype(),
        })
    }

    /// Floating payload, or [`NpuError::InvalidDtype`].
    pub fn expect_f32(&self, op: &'static str, operand: &'static str) -> Result<&[f32]> {
        self.as_f32().ok_or(NpuError::InvalidDtype {
            op,
            operand,
            expected: DType::F32,
            found: self.dtype(),
        })
    }

    /// `(rows, cols)` of a rank-2 tensor.
    pub fn dims2(&self, op: &'static str, operand: &'static str) -> Result<(usize, usize)> {
        match self.shape.as_slice() {
            &[rows, cols] => Ok((rows, cols)),
            other => Err(NpuError::ShapeMismatch {
                op,
                expected: format!("rank-2 `{operand}`"),
                found: format!("shape {other:?}"),
            }),
        }
    }

    /// Transpose a rank-2 tensor of either dtype.
    pub fn transpose2d(&self) -> Result<Self> {
        let (rows, cols) = self.dims2("transpose", "input")?;
        let data = match &self.data {
            TensorData::I8(v) => TensorData::I8(transpose(v, rows, cols)),
            TensorData::F32(v) => TensorData::F32(transpose(v, rows, cols)),
        };
        Self::new(vec![cols, rows], data)
    }

    /// Multi-dimensional coordinate of a flat row-major index.
    pub fn unravel(&self, mut index: usize) -> Vec<usize> {
        let mut coord = vec![0; self.shape.len()];
        for (axis, &dim) in self.shape.iter().enumerate().rev() {
            coord[axis] = index % dim;
            index /= dim;
        }
        coord
    }

    /// Raw row-major bytes of an INT8 tensor.
    pub fn to_i8_bytes(&self) -> Option<Vec<u8>> {
        self.as_i8().map(|v| v.iter().map(|&x| x as u8).collect())
    }
}

fn transpose<T: Copy + Default>(src: &[T], rows: usize, cols: usize) -> Vec<T> {
    let mut out = vec![T::default(); src.len()];
    for r in 0..rows {
        for c in 0..cols {
            out[c * rows + r] = src[r * cols + c];
        }
    }
    out
}
