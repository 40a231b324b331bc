//! Single-head attention composed from the GEMM and softmax kernels.

use tnpu_common::{NpuError, Result, Tensor};
use tracing::debug;

use crate::gemm::{GemmParams, gemm};
use crate::softmax::softmax;

/// Shift applied to the Q, K and V projections.
pub const QKV_SHIFT: u32 = 7;
/// Shift applied to `Q x K^T`; stands in for the `1/sqrt(D)` scaling.
pub const SCORE_SHIFT: u32 = 4;
/// Shift applied to `probs x V`.
pub const CONTEXT_SHIFT: u32 = 7;

/// `softmax(Q K^T) V` for one head, with the hardware's fixed step order:
///
/// 1. `q, k, v = gemm(x, W*, 1, 7)`
/// 2. `scores = gemm(q, k^T, 1, 4)`
/// 3. `probs = softmax(scores, causal)`
/// 4. `context = gemm(probs, v, 1, 7)`
///
/// `x` is `[S, H]`; the three weights are `[H, D]`. Returns `[S, D]`.
pub fn attention_head(x: &Tensor, wq: &Tensor, wk: &Tensor, wv: &Tensor, causal: bool) -> Result<Tensor> {
    x.expect_i8("attention_head", "x")?;
    let (seq, hidden) = x.dims2("attention_head", "x")?;
    let (wh, head_dim) = wq.dims2("attention_head", "wq")?;
    if wh != hidden {
        return Err(NpuError::ShapeMismatch {
            op: "attention_head",
            expected: format!("wq with {hidden} rows to match x {:?}", x.shape()),
            found: format!("wq {:?}", wq.shape()),
        });
    }
    for (name, w) in [("wk", wk), ("wv", wv)] {
        if w.shape() != wq.shape() {
            return Err(NpuError::ShapeMismatch {
                op: "attention_head",
                expected: format!("{name} shaped like wq {:?}", wq.shape()),
                found: format!("{name} {:?}", w.shape()),
            });
        }
    }

    let proj = GemmParams::new(1, QKV_SHIFT);
    let q = gemm(x, wq, proj)?;
    let k = gemm(x, wk, proj)?;
    let v = gemm(x, wv, proj)?;

    let scores = gemm(&q, &k.transpose2d()?, GemmParams::new(1, SCORE_SHIFT))?;
    let probs = softmax(&scores, causal)?;
    let context = gemm(&probs, &v, GemmParams::new(1, CONTEXT_SHIFT))?;

    debug!(seq, hidden, head_dim, causal, "attention head");
    Ok(context)
}
