//! Symmetric INT8 quantization codec
//!
//! Maps floating tensors to INT8 with a single positive per-tensor scale and
//! a zero-point fixed at 0:
//!
//! - `scale = max(|x|) / 127`, or `1.0` for an all-zero tensor
//! - `q = clamp(round(x / scale), -127, 127)`
//! - `x' = q * scale`
//!
//! The codec never emits `-128` so that the representable range stays
//! symmetric around zero.

use tnpu_common::{NpuError, Result, Tensor};

pub mod symmetric;

pub use symmetric::{QMAX, QMIN, dequantize_value, quantize_value, symmetric_scale};

/// INT8 payload plus the scale it was quantized with.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedTensor {
    values: Tensor,
    scale: f32,
}

impl QuantizedTensor {
    /// Wrap an existing INT8 tensor and scale.
    pub fn new(values: Tensor, scale: f32) -> Result<Self> {
        values.expect_i8("quantized_tensor", "values")?;
        validate_scale("quantized_tensor", scale)?;
        Ok(Self { values, scale })
    }

    pub fn values(&self) -> &Tensor {
        &self.values
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn shape(&self) -> &[usize] {
        self.values.shape()
    }

    pub fn into_parts(self) -> (Tensor, f32) {
        (self.values, self.scale)
    }

    /// Reconstruct the floating tensor.
    pub fn dequantize(&self) -> Result<Tensor> {
        dequantize(&self.values, self.scale)
    }
}

/// Quantize a floating tensor.
///
/// When `scale` is `None` it is derived from the tensor with
/// [`symmetric_scale`]. Non-finite elements are rejected because no finite
/// scale can represent them.
pub fn quantize(tensor: &Tensor, scale: Option<f32>) -> Result<QuantizedTensor> {
    let data = tensor.expect_f32("quantize", "tensor")?;
    if let Some(idx) = data.iter().position(|x| !x.is_finite()) {
        return Err(NpuError::invalid_arg(
            "quantize",
            format!("element {idx} is not finite ({})", data[idx]),
        ));
    }

    let scale = match scale {
        Some(s) => {
            validate_scale("quantize", s)?;
            s
        }
        None => symmetric_scale(data),
    };

    let values = data.iter().map(|&x| quantize_value(x, scale)).collect();
    let values = Tensor::from_i8(tensor.shape().to_vec(), values)?;
    Ok(QuantizedTensor { values, scale })
}

/// `value = q * scale`, elementwise.
pub fn dequantize(q: &Tensor, scale: f32) -> Result<Tensor> {
    let data = q.expect_i8("dequantize", "q")?;
    validate_scale("dequantize", scale)?;
    let values = data.iter().map(|&v| dequantize_value(v, scale)).collect();
    Tensor::from_f32(q.shape().to_vec(), values)
}

fn validate_scale(op: &'static str, scale: f32) -> Result<()> {
    if scale.is_finite() && scale > 0.0 {
        Ok(())
    } else {
        Err(NpuError::invalid_arg(op, format!("scale must be finite and > 0, got {scale}")))
    }
}
