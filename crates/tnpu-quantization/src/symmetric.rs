//! Scalar helpers for symmetric INT8 quantization.

/// Largest quantized magnitude. `-128` is never produced.
pub const QMAX: i32 = 127;
pub const QMIN: i32 = -QMAX;

/// Per-tensor symmetric scale: `max(|x|) / 127`, or `1.0` when every
/// element is zero.
///
/// The result is floored at `f32::MIN_POSITIVE` so that tensors whose
/// magnitudes are all subnormal still get a usable, strictly positive scale.
pub fn symmetric_scale(data: &[f32]) -> f32 {
    let max_abs = data.iter().fold(0.0f32, |acc, &x| acc.max(x.abs()));
    if max_abs == 0.0 {
        return 1.0;
    }
    (max_abs / QMAX as f32).max(f32::MIN_POSITIVE)
}

/// Quantize one value: round to nearest (ties to even), clamp to `[-127, 127]`.
#[inline]
pub fn quantize_value(value: f32, scale: f32) -> i8 {
    let q = (value / scale).round_ties_even();
    q.clamp(QMIN as f32, QMAX as f32) as i8
}

#[inline]
pub fn dequantize_value(quantized: i8, scale: f32) -> f32 {
    quantized as f32 * scale
}
