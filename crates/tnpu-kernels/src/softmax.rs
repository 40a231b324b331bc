//! Row softmax over INT8 logits producing INT8 probabilities in `[0, 127]`.
//!
//! Without a mask the row is computed in `f32`. The causal mask is an `f64`
//! bias, so masked rows are computed in `f64`. Sums use [`pairwise_sum`].

use tnpu_common::{Result, Tensor};

use crate::reduce::pairwise_sum;

/// Bias added to masked (strictly upper-triangular) logits under a causal mask.
pub const CAUSAL_MASK_BIAS: f64 = -1e9;

/// Probability `1.0` maps to this code.
const PROB_ONE: f64 = 127.0;

/// Numerically stable softmax along each row of a `[M, N]` INT8 tensor.
///
/// With `causal`, column `j > i` of row `i` is biased by
/// [`CAUSAL_MASK_BIAS`] before the row max is taken, so it always rounds to
/// zero. Probabilities are scaled by 127, rounded (ties to even) and clamped
/// to `[0, 127]`; row sums land near 127 but are not forced to it.
pub fn softmax(x: &Tensor, causal: bool) -> Result<Tensor> {
    let data = x.expect_i8("softmax", "x")?;
    let (rows, cols) = x.dims2("softmax", "x")?;

    let mut out = Vec::with_capacity(data.len());
    for (i, row) in data.chunks_exact(cols).enumerate() {
        if causal {
            causal_row(row, i, &mut out);
        } else {
            plain_row(row, &mut out);
        }
    }
    debug_assert_eq!(out.len(), rows * cols);
    Tensor::from_i8(vec![rows, cols], out)
}

fn plain_row(row: &[i8], out: &mut Vec<i8>) {
    let max = row.iter().map(|&v| v as f32).fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = row.iter().map(|&v| (v as f32 - max).exp()).collect();
    let sum = pairwise_sum(&exps);
    let one = PROB_ONE as f32;
    out.extend(exps.iter().map(|e| (e / sum * one).round_ties_even().clamp(0.0, one) as i8));
}

fn causal_row(row: &[i8], i: usize, out: &mut Vec<i8>) {
    let logits: Vec<f64> = row
        .iter()
        .enumerate()
        .map(|(j, &v)| v as f64 + if j > i { CAUSAL_MASK_BIAS } else { 0.0 })
        .collect();
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum = pairwise_sum(&exps);
    out.extend(exps.iter().map(|e| (e / sum * PROB_ONE).round_ties_even().clamp(0.0, PROB_ONE) as i8));
}
