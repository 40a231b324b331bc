//! Elementwise comparison of golden and hardware INT8 outputs.

use std::fmt;

use serde::{Deserialize, Serialize};
use tnpu_common::{NpuError, Result, Tensor};

/// Number of mismatching coordinates kept for diagnostics.
pub const MAX_EXAMPLES: usize = 5;

/// One differing element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MismatchExample {
    pub coord: Vec<usize>,
    pub golden: i8,
    pub candidate: i8,
    pub diff: u32,
}

/// Outcome of comparing two tensors of the same shape.
///
/// A failed comparison is a result, not an error: `passed` is `false` and
/// the counts and examples describe the differences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comparison {
    pub passed: bool,
    pub tolerance: u32,
    pub max_diff: u32,
    /// Elements whose difference exceeds the tolerance.
    pub mismatches: usize,
    pub total: usize,
    /// First [`MAX_EXAMPLES`] mismatches in row-major order.
    pub examples: Vec<MismatchExample>,
}

/// Compare `candidate` against `golden`.
///
/// Shapes must match exactly. Differences are taken in a widened signed
/// domain so `-128` vs `127` yields 255 rather than overflowing. The
/// comparison passes iff the largest difference is within `tolerance`.
pub fn compare(golden: &Tensor, candidate: &Tensor, tolerance: u32) -> Result<Comparison> {
    let g = golden.expect_i8("compare", "golden")?;
    let c = candidate.expect_i8("compare", "candidate")?;
    if golden.shape() != candidate.shape() {
        return Err(NpuError::shape("compare", golden.shape(), candidate.shape()));
    }

    let mut max_diff = 0u32;
    let mut mismatches = 0usize;
    let mut examples = Vec::new();
    for (i, (&gv, &cv)) in g.iter().zip(c).enumerate() {
        let diff = (gv as i16 - cv as i16).unsigned_abs() as u32;
        max_diff = max_diff.max(diff);
        if diff > tolerance {
            mismatches += 1;
            if examples.len() < MAX_EXAMPLES {
                examples.push(MismatchExample { coord: golden.unravel(i), golden: gv, candidate: cv, diff });
            }
        }
    }

    Ok(Comparison { passed: max_diff <= tolerance, tolerance, max_diff, mismatches, total: g.len(), examples })
}

impl Comparison {
    /// Multi-line human-readable report.
    pub fn diagnostic(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.passed {
            return write!(f, "{}/{} match (max_diff={})", self.total, self.total, self.max_diff);
        }
        write!(
            f,
            "{}/{} mismatch (max_diff={}, tolerance={})",
            self.mismatches, self.total, self.max_diff, self.tolerance
        )?;
        for ex in &self.examples {
            write!(f, "\n  {:?}: golden {} vs hw {} (diff={})", ex.coord, ex.golden, ex.candidate, ex.diff)?;
        }
        Ok(())
    }
}
