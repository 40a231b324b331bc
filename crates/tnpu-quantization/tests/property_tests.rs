//! Property tests for the symmetric INT8 codec.

use proptest::prelude::*;
use tnpu_common::Tensor;
use tnpu_quantization::{dequantize, quantize};

fn finite_tensor() -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec(-1.0e6f32..1.0e6f32, 1..256)
}

proptest! {
    /// dequantize(quantize(x)) stays within half a quantization step of x.
    #[test]
    fn round_trip_error_is_bounded_by_half_scale(data in finite_tensor()) {
        let t = Tensor::from_f32(vec![data.len()], data.clone()).unwrap();
        let q = quantize(&t, None).unwrap();
        let scale = q.scale();
        let back = dequantize(q.values(), scale).unwrap();
        for (orig, deq) in data.iter().zip(back.as_f32().unwrap()) {
            let err = (orig - deq).abs();
            prop_assert!(
                err <= scale * 0.5 * (1.0 + 1e-4),
                "error {} exceeds scale/2 = {} (x={}, x'={})", err, scale * 0.5, orig, deq
            );
        }
    }

    /// Quantized values never leave the symmetric range.
    #[test]
    fn values_stay_in_symmetric_range(data in finite_tensor(), scale in 1e-3f32..10.0) {
        let t = Tensor::from_f32(vec![data.len()], data).unwrap();
        let q = quantize(&t, Some(scale)).unwrap();
        prop_assert!(q.values().as_i8().unwrap().iter().all(|&v| (-127..=127).contains(&v)));
    }

    /// Quantization is deterministic.
    #[test]
    fn quantization_is_deterministic(data in finite_tensor()) {
        let t = Tensor::from_f32(vec![data.len()], data).unwrap();
        let a = quantize(&t, None).unwrap();
        let b = quantize(&t, None).unwrap();
        prop_assert_eq!(a, b);
    }

    /// The derived scale is always strictly positive.
    #[test]
    fn derived_scale_is_positive(data in prop::collection::vec(any::<f32>().prop_filter("finite", |x| x.is_finite()), 1..64)) {
        let t = Tensor::from_f32(vec![data.len()], data).unwrap();
        let q = quantize(&t, None).unwrap();
        prop_assert!(q.scale() > 0.0 && q.scale().is_finite());
    }
}
