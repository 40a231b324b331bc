//! Elementwise activations over INT8 tensors.

use std::f64::consts::PI;

use tnpu_common::{Result, Tensor, round_saturate_i8};

/// GELU with tanh approximation: 0.5 * x * (1 + tanh(sqrt(2/pi) * (x + 0.044715 * x^3)))
#[inline]
pub fn gelu_scalar(x: f64) -> f64 {
    let sqrt_2_over_pi = (2.0 / PI).sqrt();
    let inner = sqrt_2_over_pi * (x + 0.044715 * x * x * x);
    0.5 * x * (1.0 + inner.tanh())
}

/// Apply [`gelu_scalar`] to every element of an INT8 tensor of any shape,
/// rounding and saturating back into INT8.
pub fn gelu(x: &Tensor) -> Result<Tensor> {
    let data = x.expect_i8("gelu", "x")?;
    let out = data.iter().map(|&v| round_saturate_i8(gelu_scalar(v as f64))).collect();
    Tensor::from_i8(x.shape().to_vec(), out)
}
