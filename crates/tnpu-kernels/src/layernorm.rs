//! Per-row layer normalization with INT8 affine parameters.

use tnpu_common::{NpuError, Result, Tensor, round_saturate_i8};

use crate::reduce::pairwise_sum;

pub const DEFAULT_EPS: f64 = 1e-5;

/// `y = (x - mean) / sqrt(var + eps) * gamma + beta`, per row.
///
/// `x` is `[M, N]`; `gamma` and `beta` are `[N]`. Everything runs in `f32`
/// (the hardware's FP32 datapath, `eps` included): the mean, then the
/// population variance as the mean of squared deviations, both summed with
/// [`pairwise_sum`]. The result is rounded and saturated back into INT8.
/// This path approximates the hardware rather than matching it bit for bit.
pub fn layer_norm(x: &Tensor, gamma: &Tensor, beta: &Tensor, eps: f64) -> Result<Tensor> {
    let data = x.expect_i8("layer_norm", "x")?;
    let g = gamma.expect_i8("layer_norm", "gamma")?;
    let b = beta.expect_i8("layer_norm", "beta")?;
    let (rows, cols) = x.dims2("layer_norm", "x")?;
    if gamma.shape() != [cols] {
        return Err(NpuError::shape("layer_norm", [cols], gamma.shape()));
    }
    if beta.shape() != [cols] {
        return Err(NpuError::shape("layer_norm", [cols], beta.shape()));
    }
    if !eps.is_finite() || eps < 0.0 {
        return Err(NpuError::invalid_arg("layer_norm", format!("eps must be finite and >= 0, got {eps}")));
    }

    let n = cols as f32;
    let eps = eps as f32;
    let mut out = Vec::with_capacity(rows * cols);
    let mut dev = vec![0f32; cols];
    let mut sq = vec![0f32; cols];
    for row in data.chunks_exact(cols) {
        let xs: Vec<f32> = row.iter().map(|&v| v as f32).collect();
        let mean = pairwise_sum(&xs) / n;
        for ((d, s), &v) in dev.iter_mut().zip(sq.iter_mut()).zip(&xs) {
            *d = v - mean;
            *s = *d * *d;
        }
        let var = pairwise_sum(&sq) / n;
        let std = (var + eps).sqrt();
        out.extend(dev.iter().zip(g).zip(b).map(|((&d, &gv), &bv)| {
            round_saturate_i8((d / std * gv as f32 + bv as f32) as f64)
        }));
    }
    Tensor::from_i8(vec![rows, cols], out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vec_i8(data: &[i8]) -> Tensor {
        Tensor::from_i8(vec![data.len()], data.to_vec()).unwrap()
    }

    #[test]
    fn normalizes_to_unit_variance() {
        // mean 0, population variance 1
        let x = Tensor::from_i8(vec![1, 4], vec![-1, 1, -1, 1]).unwrap();
        let y = layer_norm(&x, &vec_i8(&[10; 4]), &vec_i8(&[0; 4]), 0.0).unwrap();
        assert_eq!(y.as_i8().unwrap(), &[-10, 10, -10, 10]);
    }

    #[test]
    fn constant_row_yields_beta() {
        let x = Tensor::from_i8(vec![2, 3], vec![7; 6]).unwrap();
        let y = layer_norm(&x, &vec_i8(&[100; 3]), &vec_i8(&[1, 2, 3]), DEFAULT_EPS).unwrap();
        assert_eq!(y.as_i8().unwrap(), &[1, 2, 3, 1, 2, 3]);
    }

    #[test]
    fn statistics_are_single_precision() {
        // Element 4 lands on -82 in f32; an f64 pipeline yields -81.
        let x = Tensor::from_i8(vec![1, 8], vec![58, -47, -12, 85, 123, 57, -5, -7]).unwrap();
        let gamma = vec_i8(&[-49, 37, -47, -66, -108, -53, -27, -49]);
        let beta = vec_i8(&[126, -50, 4, -45, 101, 12, -44, -79]);
        let y = layer_norm(&x, &gamma, &beta, DEFAULT_EPS).unwrap();
        assert_eq!(y.as_i8().unwrap(), &[102, -104, 42, -110, -82, -13, -26, -44]);
    }

    #[test]
    fn output_saturates() {
        let x = Tensor::from_i8(vec![1, 2], vec![-100, 100]).unwrap();
        let y = layer_norm(&x, &vec_i8(&[127, 127]), &vec_i8(&[127, 127]), DEFAULT_EPS).unwrap();
        assert_eq!(y.as_i8().unwrap(), &[0, 127]);
    }

    #[test]
    fn rejects_gamma_length_mismatch() {
        let x = Tensor::from_i8(vec![1, 4], vec![0; 4]).unwrap();
        let err = layer_norm(&x, &vec_i8(&[1; 3]), &vec_i8(&[0; 4]), DEFAULT_EPS).unwrap_err();
        assert!(matches!(err, NpuError::ShapeMismatch { op: "layer_norm", .. }));
    }

    #[test]
    fn rejects_negative_eps() {
        let x = Tensor::from_i8(vec![1, 1], vec![0]).unwrap();
        assert!(layer_norm(&x, &vec_i8(&[1]), &vec_i8(&[0]), -1.0).is_err());
    }
}
