//! Elementwise fixed-point vector unit operations.

use tnpu_common::{Result, Tensor, saturate_i8};

use crate::check_same_shape;

/// Q7 fractional bits used by [`vec_mul`].
const Q7_SHIFT: u32 = 7;

/// Saturating elementwise add: widen to 16 bits, add, clamp to INT8.
pub fn vec_add(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    elementwise("vec_add", a, b, |x, y| x + y)
}

/// Q7 elementwise multiply: widen to 16 bits, multiply, arithmetic shift
/// right by 7, clamp to INT8.
pub fn vec_mul(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    elementwise("vec_mul", a, b, |x, y| (x * y) >> Q7_SHIFT)
}

fn elementwise(op: &'static str, a: &Tensor, b: &Tensor, f: impl Fn(i16, i16) -> i16) -> Result<Tensor> {
    let av = a.expect_i8(op, "a")?;
    let bv = b.expect_i8(op, "b")?;
    check_same_shape(op, a, b)?;
    let out = av.iter().zip(bv).map(|(&x, &y)| saturate_i8(f(x as i16, y as i16) as i32)).collect();
    Tensor::from_i8(a.shape().to_vec(), out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tnpu_common::NpuError;

    fn row(data: &[i8]) -> Tensor {
        Tensor::from_i8(vec![1, data.len()], data.to_vec()).unwrap()
    }

    #[test]
    fn add_saturates_instead_of_wrapping() {
        let c = vec_add(&row(&[120, 120]), &row(&[10, 10])).unwrap();
        assert_eq!(c.as_i8().unwrap(), &[127, 127]);
        let c = vec_add(&row(&[-120, 5]), &row(&[-10, -6])).unwrap();
        assert_eq!(c.as_i8().unwrap(), &[-128, -1]);
    }

    #[test]
    fn mul_is_q7() {
        // 64 * 64 = 4096 >> 7 = 32 ; -128 * -128 = 16384 >> 7 = 128 -> 127
        let c = vec_mul(&row(&[64, -128, -1, 127]), &row(&[64, -128, 1, 127])).unwrap();
        assert_eq!(c.as_i8().unwrap(), &[32, 127, -1, 126]);
    }

    #[test]
    fn rejects_shape_mismatch() {
        let err = vec_add(&row(&[1, 2]), &row(&[1, 2, 3])).unwrap_err();
        assert!(matches!(err, NpuError::ShapeMismatch { op: "vec_add", .. }));
    }
}
