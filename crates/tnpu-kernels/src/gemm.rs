//! INT8 x INT8 matrix multiply with INT32 accumulation and requantization.

use tnpu_common::{NpuError, Result, Tensor, saturate_i8};
use tracing::trace;

/// Requantization parameters applied to every accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GemmParams {
    /// Integer multiplier applied before the shift.
    pub scale: i32,
    /// Arithmetic right shift; must be below 32.
    pub shift: u32,
}

impl GemmParams {
    pub const fn new(scale: i32, shift: u32) -> Self {
        Self { scale, shift }
    }

    /// Shift that keeps a `k`-wide reduction of unit-ish inputs inside INT8:
    /// `ceil(log2(k)) + 1`.
    pub fn for_reduction(k: usize) -> Self {
        let ceil_log2 = k.max(1).next_power_of_two().trailing_zeros();
        Self { scale: 1, shift: ceil_log2 + 1 }
    }

    fn validate(&self) -> Result<()> {
        if self.shift >= i32::BITS {
            return Err(NpuError::invalid_arg("gemm", format!("shift {} must be below 32", self.shift)));
        }
        Ok(())
    }
}

impl Default for GemmParams {
    fn default() -> Self {
        Self::new(1, 0)
    }
}

/// Requantize one INT32 accumulator.
///
/// With `shift > 0` this is `(acc * scale + (1 << (shift - 1))) >> shift`,
/// i.e. round-half-up before an arithmetic shift; otherwise `acc * scale`.
/// The result saturates to `[-128, 127]`. Intermediate arithmetic wraps
/// like the 32-bit hardware datapath.
#[inline]
pub fn requantize(acc: i32, params: GemmParams) -> i8 {
    let scaled = acc.wrapping_mul(params.scale);
    let rounded = match params.shift {
        0 => scaled,
        s => scaled.wrapping_add(1 << (s - 1)) >> s,
    };
    saturate_i8(rounded)
}

/// `C = requantize(A x B)` for `A: [M, K]`, `B: [K, N]`.
pub fn gemm(a: &Tensor, b: &Tensor, params: GemmParams) -> Result<Tensor> {
    gemm_impl(a, b, None, params)
}

/// `C = requantize(A x B + prev)`, adding the widened previous output into
/// the accumulator before requantization.
pub fn gemm_accumulate(a: &Tensor, b: &Tensor, prev: &Tensor, params: GemmParams) -> Result<Tensor> {
    gemm_impl(a, b, Some(prev), params)
}

fn gemm_impl(a: &Tensor, b: &Tensor, prev: Option<&Tensor>, params: GemmParams) -> Result<Tensor> {
    let a_data = a.expect_i8("gemm", "a")?;
    let b_data = b.expect_i8("gemm", "b")?;
    let (m, k) = a.dims2("gemm", "a")?;
    let (kb, n) = b.dims2("gemm", "b")?;
    if k != kb {
        return Err(NpuError::ShapeMismatch {
            op: "gemm",
            expected: format!("b with {k} rows to match a {:?}", a.shape()),
            found: format!("b {:?}", b.shape()),
        });
    }

    let prev_data = match prev {
        Some(p) => {
            let data = p.expect_i8("gemm", "prev")?;
            if p.shape() != [m, n] {
                return Err(NpuError::shape("gemm", [m, n], p.shape()));
            }
            Some(data)
        }
        None => None,
    };
    params.validate()?;

    trace!(m, k, n, scale = params.scale, shift = params.shift, accumulate = prev.is_some(), "gemm");

    let mut out = vec![0i8; m * n];
    for i in 0..m {
        let a_row = &a_data[i * k..(i + 1) * k];
        for j in 0..n {
            let mut acc = 0i32;
            for (kk, &av) in a_row.iter().enumerate() {
                acc = acc.wrapping_add(av as i32 * b_data[kk * n + j] as i32);
            }
            if let Some(p) = prev_data {
                acc = acc.wrapping_add(p[i * n + j] as i32);
            }
            out[i * n + j] = requantize(acc, params);
        }
    }
    Tensor::from_i8(vec![m, n], out)
}
