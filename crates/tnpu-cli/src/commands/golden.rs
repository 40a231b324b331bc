//! Golden kernel self-test.
//!
//! Runs a seeded GEMM, a causal softmax and GELU on fixed points, then checks
//! the results against their known properties. Needs no simulator.

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::Serialize;
use tnpu_common::Tensor;
use tnpu_kernels::{GemmParams, gelu, gemm, softmax};
use tnpu_quantization::quantize;
use tracing::debug;

const GEMM_DIMS: (usize, usize, usize) = (4, 8, 4);
const SOFTMAX_DIM: usize = 4;
const GELU_POINTS: [i8; 5] = [-10, -5, 0, 5, 10];
const GELU_EXPECTED: [i8; 5] = [0, 0, 0, 5, 10];

/// Golden command arguments
#[derive(Args, Debug, Clone)]
pub struct GoldenCommand {
    /// Seed for the random GEMM and softmax inputs
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

/// Everything the self-test computed.
#[derive(Debug, Clone, Serialize)]
pub struct GoldenReport {
    pub seed: u64,
    pub gemm_shape: Vec<usize>,
    pub gemm_output: Vec<i8>,
    pub softmax_row_sums: Vec<i32>,
    pub gelu_output: Vec<i8>,
    /// Checks that did not hold; empty on success.
    pub violations: Vec<String>,
}

impl GoldenReport {
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }
}

impl GoldenCommand {
    pub fn execute(&self) -> Result<GoldenReport> {
        let report = run_self_test(self.seed)?;
        let (m, _, n) = GEMM_DIMS;

        println!("GEMM {:?} (seed {}):", report.gemm_shape, report.seed);
        for row in report.gemm_output.chunks(n).take(m) {
            println!("  {row:?}");
        }
        println!("Causal softmax row sums: {:?}", report.softmax_row_sums);
        println!("GELU {:?} -> {:?}", GELU_POINTS, report.gelu_output);

        if report.passed() {
            println!("{}", style("Golden self-test passed").green());
        } else {
            for v in &report.violations {
                println!("{} {v}", style("FAIL").red());
            }
        }
        Ok(report)
    }
}

fn random_int8(rng: &mut ChaCha8Rng, rows: usize, cols: usize) -> Result<Tensor> {
    let data: Vec<f32> = (0..rows * cols).map(|_| rng.sample::<f32, _>(StandardNormal) * 0.5).collect();
    let floating = Tensor::from_f32(vec![rows, cols], data)?;
    Ok(quantize(&floating, None)?.into_parts().0)
}

/// Compute the self-test without printing anything.
pub fn run_self_test(seed: u64) -> Result<GoldenReport> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut violations = Vec::new();

    let (m, k, n) = GEMM_DIMS;
    let a = random_int8(&mut rng, m, k)?;
    let b = random_int8(&mut rng, k, n)?;
    let params = GemmParams::for_reduction(k);
    let c = gemm(&a, &b, params).context("golden GEMM failed")?;
    let again = gemm(&a, &b, params).context("golden GEMM failed")?;
    if c != again {
        violations.push("GEMM is not deterministic".to_string());
    }
    debug!(?params, "golden GEMM done");

    let scores = random_int8(&mut rng, SOFTMAX_DIM, SOFTMAX_DIM)?;
    let probs = softmax(&scores, true).context("golden softmax failed")?;
    let p = probs.as_i8().unwrap_or_default();
    let mut softmax_row_sums = Vec::with_capacity(SOFTMAX_DIM);
    for (i, row) in p.chunks(SOFTMAX_DIM).enumerate() {
        let sum: i32 = row.iter().map(|&v| v as i32).sum();
        // Each element rounds independently, so the sum drifts by at most half a step per element.
        if (sum - 127).abs() > SOFTMAX_DIM.div_ceil(2) as i32 {
            violations.push(format!("softmax row {i} sums to {sum}"));
        }
        if row[i + 1..].iter().any(|&v| v != 0) {
            violations.push(format!("softmax row {i} has non-zero masked entries"));
        }
        softmax_row_sums.push(sum);
    }

    let points = Tensor::from_i8(vec![GELU_POINTS.len()], GELU_POINTS.to_vec())?;
    let activated = gelu(&points).context("golden GELU failed")?;
    let gelu_output = activated.as_i8().unwrap_or_default().to_vec();
    if gelu_output != GELU_EXPECTED {
        violations.push(format!("GELU gave {gelu_output:?}, expected {GELU_EXPECTED:?}"));
    }

    Ok(GoldenReport {
        seed,
        gemm_shape: c.shape().to_vec(),
        gemm_output: c.as_i8().unwrap_or_default().to_vec(),
        softmax_row_sums,
        gelu_output,
        violations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_test_passes_and_is_reproducible() {
        let first = run_self_test(42).unwrap();
        let second = run_self_test(42).unwrap();
        assert!(first.passed(), "{:?}", first.violations);
        assert_eq!(first.gemm_shape, vec![4, 4]);
        assert_eq!(first.gemm_output, second.gemm_output);
        assert_eq!(first.gelu_output, GELU_EXPECTED.to_vec());
        assert_eq!(first.softmax_row_sums[0], 127);
    }

    #[test]
    fn seed_changes_gemm_inputs() {
        let a = run_self_test(1).unwrap();
        let b = run_self_test(2).unwrap();
        assert!(a.passed() && b.passed());
        assert_ne!(a.gemm_output, b.gemm_output);
    }
}
