//! Operator test cases and their lifecycle.

use std::fmt;
use std::path::Path;
use std::time::Instant;

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use tnpu_common::{NpuError, Result, Tensor};
use tnpu_kernels::{GemmParams, gemm};
use tnpu_quantization::quantize;
use tracing::{debug, info, warn};

use crate::artifacts::{CaseDir, GemmCaseConfig, prepare_case_dir, read_raw_i8, write_json, write_raw_i8};
use crate::compare::{Comparison, compare};
use crate::simulator::Simulator;

// ── Lifecycle ──────────────────────────────────────────────────────

/// Steps a case moves through. `Passed`, `Failed` and `Errored` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseState {
    Created,
    InputsGenerated,
    GoldenComputed,
    HardwareExecuted,
    Compared,
    Passed,
    Failed,
    Errored,
}

impl fmt::Display for CaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::InputsGenerated => "inputs_generated",
            Self::GoldenComputed => "golden_computed",
            Self::HardwareExecuted => "hardware_executed",
            Self::Compared => "compared",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Errored => "errored",
        };
        f.write_str(s)
    }
}

/// Terminal verdict of a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    Failed,
    Errored,
}

impl Outcome {
    pub fn state(self) -> CaseState {
        match self {
            Self::Passed => CaseState::Passed,
            Self::Failed => CaseState::Failed,
            Self::Errored => CaseState::Errored,
        }
    }
}

/// Named input tensors produced by [`OperatorCase::generate_inputs`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaseInputs {
    tensors: Vec<(&'static str, Tensor)>,
}

impl CaseInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &'static str, tensor: Tensor) -> Self {
        self.tensors.push((name, tensor));
        self
    }

    pub fn get(&self, name: &'static str) -> Result<&Tensor> {
        self.tensors
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, t)| t)
            .ok_or_else(|| NpuError::invalid_arg("case inputs", format!("no input named `{name}`")))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Tensor)> {
        self.tensors.iter().map(|(n, t)| (*n, t))
    }
}

// ── Strategy interface ─────────────────────────────────────────────

/// One operator under test.
///
/// Implementations are stateless: inputs flow from `generate_inputs` into
/// `compute_golden`, and the hardware result is read back from the case
/// directory, so a case can run concurrently with its siblings.
pub trait OperatorCase: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> String;

    /// Sample inputs with `rng` and write every artifact the simulator
    /// needs into `dir`.
    fn generate_inputs(&self, rng: &mut ChaCha8Rng, input_scale: f32, dir: &CaseDir) -> Result<CaseInputs>;

    fn compute_golden(&self, inputs: &CaseInputs) -> Result<Tensor>;

    /// Run the simulator on `dir` and read its output back.
    fn invoke_hardware(&self, simulator: &dyn Simulator, dir: &CaseDir) -> Result<Tensor>;
}

// ── GEMM ───────────────────────────────────────────────────────────

/// `[M, K] x [K, N]` GEMM with `scale = 1` and `shift = ceil(log2 K) + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GemmCase {
    name: String,
    m: usize,
    k: usize,
    n: usize,
}

impl GemmCase {
    /// Case named `GEMM_{M}x{K}x{N}`.
    pub fn new(m: usize, k: usize, n: usize) -> Result<Self> {
        Self::named(format!("GEMM_{m}x{k}x{n}"), m, k, n)
    }

    pub fn named(name: impl Into<String>, m: usize, k: usize, n: usize) -> Result<Self> {
        if m == 0 || k == 0 || n == 0 {
            return Err(NpuError::invalid_arg("gemm case", format!("dimensions must be positive, got {m}x{k}x{n}")));
        }
        Ok(Self { name: name.into(), m, k, n })
    }

    pub fn dims(&self) -> (usize, usize, usize) {
        (self.m, self.k, self.n)
    }

    pub fn params(&self) -> GemmParams {
        GemmParams::for_reduction(self.k)
    }

    pub fn config(&self) -> GemmCaseConfig {
        let p = self.params();
        GemmCaseConfig { m: self.m, k: self.k, n: self.n, scale: p.scale, shift: p.shift }
    }
}

fn sample_quantized(rng: &mut ChaCha8Rng, rows: usize, cols: usize, input_scale: f32) -> Result<Tensor> {
    let data: Vec<f32> = (0..rows * cols).map(|_| rng.sample::<f32, _>(StandardNormal) * input_scale).collect();
    let floating = Tensor::from_f32(vec![rows, cols], data)?;
    Ok(quantize(&floating, None)?.into_parts().0)
}

impl OperatorCase for GemmCase {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        format!("GEMM test: [{},{}] @ [{},{}]", self.m, self.k, self.k, self.n)
    }

    fn generate_inputs(&self, rng: &mut ChaCha8Rng, input_scale: f32, dir: &CaseDir) -> Result<CaseInputs> {
        let a = sample_quantized(rng, self.m, self.k, input_scale)?;
        let b = sample_quantized(rng, self.k, self.n, input_scale)?;
        write_raw_i8(&dir.input_a(), &a)?;
        write_raw_i8(&dir.input_b(), &b)?;
        write_json(&dir.config(), &self.config())?;
        Ok(CaseInputs::new().with("A", a).with("B", b))
    }

    fn compute_golden(&self, inputs: &CaseInputs) -> Result<Tensor> {
        gemm(inputs.get("A")?, inputs.get("B")?, self.params())
    }

    fn invoke_hardware(&self, simulator: &dyn Simulator, dir: &CaseDir) -> Result<Tensor> {
        simulator.run(dir.root())?;
        read_raw_i8(&dir.output(), &[self.m, self.n])
    }
}

// ── Execution ──────────────────────────────────────────────────────

/// Per-case result as recorded in the suite summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseReport {
    pub name: String,
    pub description: String,
    pub outcome: Outcome,
    /// Last lifecycle step that completed before the verdict.
    pub reached: CaseState,
    /// Comparison diagnostic on failure, captured error on `Errored`.
    pub message: Option<String>,
    pub comparison: Option<Comparison>,
    pub elapsed_ms: u64,
}

impl CaseReport {
    pub fn final_state(&self) -> CaseState {
        self.outcome.state()
    }
}

/// Inputs every case execution needs besides the case itself.
pub struct CaseRun<'a> {
    pub dir: &'a Path,
    pub rng: ChaCha8Rng,
    pub input_scale: f32,
    pub tolerance: u32,
    pub simulator: &'a dyn Simulator,
}

/// Drive one case through its lifecycle. Errors are captured into the
/// report and never propagate.
pub fn run_case(case: &dyn OperatorCase, run: CaseRun<'_>) -> CaseReport {
    let start = Instant::now();
    let mut reached = CaseState::Created;
    let result = execute(case, run, &mut reached);
    let elapsed_ms = start.elapsed().as_millis() as u64;

    let (outcome, message, comparison) = match result {
        Ok(cmp) if cmp.passed => {
            info!(max_diff = cmp.max_diff, elapsed_ms, "case passed");
            (Outcome::Passed, None, Some(cmp))
        }
        Ok(cmp) => {
            warn!(mismatches = cmp.mismatches, total = cmp.total, max_diff = cmp.max_diff, "case failed");
            (Outcome::Failed, Some(cmp.diagnostic()), Some(cmp))
        }
        Err(e) => {
            warn!(error = %e, step = %reached, "case errored");
            (Outcome::Errored, Some(e.to_string()), None)
        }
    };

    CaseReport {
        name: case.name().to_string(),
        description: case.description(),
        outcome,
        reached,
        message,
        comparison,
        elapsed_ms,
    }
}

fn execute(case: &dyn OperatorCase, mut run: CaseRun<'_>, reached: &mut CaseState) -> Result<Comparison> {
    prepare_case_dir(run.dir)?;
    let dir = CaseDir::new(run.dir);

    let inputs = case.generate_inputs(&mut run.rng, run.input_scale, &dir)?;
    *reached = CaseState::InputsGenerated;
    debug!(dir = %run.dir.display(), "inputs generated");

    let golden = case.compute_golden(&inputs)?;
    *reached = CaseState::GoldenComputed;

    let hardware = case.invoke_hardware(run.simulator, &dir)?;
    *reached = CaseState::HardwareExecuted;

    let cmp = compare(&golden, &hardware, run.tolerance)?;
    *reached = CaseState::Compared;
    Ok(cmp)
}
