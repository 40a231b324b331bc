//! Golden reference kernels for the tiny-npu INT8 datapath.
//!
//! Every kernel takes INT8 [`Tensor`]s and returns a freshly allocated INT8
//! [`Tensor`]. Inputs are validated up front: a wrong dtype or shape fails
//! with [`NpuError::InvalidDtype`] or [`NpuError::ShapeMismatch`] before any
//! arithmetic happens.
//!
//! GEMM and the vector ops model the hardware's fixed-point arithmetic
//! exactly. Softmax, layer norm and GELU widen to floating point and round
//! back, so hardware results for those are compared with a tolerance.
//! Layer norm and unmasked softmax widen to `f32` like the hardware's FP32
//! units; the causal softmax and GELU carry `f64` constants and run in `f64`.

use tnpu_common::{NpuError, Result, Tensor};

pub mod activations;
pub mod attention;
pub mod gemm;
pub mod layernorm;
mod reduce;
pub mod softmax;
pub mod vector;

pub use activations::{gelu, gelu_scalar};
pub use attention::{CONTEXT_SHIFT, QKV_SHIFT, SCORE_SHIFT, attention_head};
pub use gemm::{GemmParams, gemm, gemm_accumulate, requantize};
pub use layernorm::{DEFAULT_EPS, layer_norm};
pub use softmax::{CAUSAL_MASK_BIAS, softmax};
pub use vector::{vec_add, vec_mul};

/// Both operands must have identical shapes.
fn check_same_shape(op: &'static str, a: &Tensor, b: &Tensor) -> Result<()> {
    if a.shape() != b.shape() {
        return Err(NpuError::shape(op, a.shape(), b.shape()));
    }
    Ok(())
}
