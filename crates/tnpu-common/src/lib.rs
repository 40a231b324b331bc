//! Common types for the tiny-npu golden reference
//!
//! This crate provides the foundational types shared by the quantization
//! codec, the weight pack format, the golden kernels and the
//! cross-verification harness: the [`Tensor`] container, the error
//! taxonomy, and the harness configuration.

pub mod config;
pub mod error;
pub mod tensor;

pub use config::*;
pub use error::*;
pub use tensor::*;

/// Smallest value representable in the INT8 domain.
pub const I8_MIN: i32 = i8::MIN as i32;
/// Largest value representable in the INT8 domain.
pub const I8_MAX: i32 = i8::MAX as i32;

/// Saturate a widened integer into the INT8 range.
#[inline]
pub fn saturate_i8(v: i32) -> i8 {
    v.clamp(I8_MIN, I8_MAX) as i8
}

/// Round a floating value to the nearest integer (ties to even) and saturate
/// into the INT8 range.
///
/// NaN maps to 0.
#[inline]
pub fn round_saturate_i8(v: f64) -> i8 {
    if v.is_nan() {
        return 0;
    }
    v.round_ties_even().clamp(I8_MIN as f64, I8_MAX as f64) as i8
}
