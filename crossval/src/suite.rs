//! Test suites: ordered collections of cases run against one simulator.

use std::path::PathBuf;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tnpu_common::{HarnessConfig, NpuError, Result};
use tracing::{info, info_span, warn};

use crate::case::{CaseReport, CaseRun, GemmCase, OperatorCase, run_case};
use crate::report::{REPORT_FILE, SuiteSummary};
use crate::simulator::Simulator;

/// Knobs shared by every case in a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub artifact_root: PathBuf,
    pub tolerance: u32,
    pub seed: u64,
    pub jobs: usize,
    pub input_scale: f32,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from_config(&HarnessConfig::default())
    }
}

impl RunOptions {
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            artifact_root: config.artifact_root.clone(),
            tolerance: config.tolerance,
            seed: config.seed,
            jobs: config.jobs,
            input_scale: config.input_scale,
        }
    }
}

/// 64-bit FNV-1a.
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |h, &b| (h ^ b as u64).wrapping_mul(0x0000_0100_0000_01b3))
}

/// Seed of a case's private generator: independent of scheduling order.
pub fn case_seed(suite_seed: u64, case_name: &str) -> u64 {
    suite_seed ^ fnv1a(case_name.as_bytes())
}

/// Named, ordered collection of operator cases.
pub struct TestSuite {
    name: String,
    cases: Vec<Box<dyn OperatorCase>>,
}

impl TestSuite {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), cases: Vec::new() }
    }

    /// Append a case. Names double as artifact directory names, so a name
    /// already in the suite is rejected.
    pub fn add_case(&mut self, case: impl OperatorCase + 'static) -> Result<()> {
        if self.cases.iter().any(|c| c.name() == case.name()) {
            return Err(NpuError::invalid_arg(
                "test suite",
                format!("duplicate case name `{}` in suite `{}`", case.name(), self.name),
            ));
        }
        self.cases.push(Box::new(case));
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn case_names(&self) -> impl Iterator<Item = &str> {
        self.cases.iter().map(|c| c.name())
    }

    /// Run every case and summarize.
    ///
    /// Each case writes only under `<artifact_root>/<case name>/` and draws
    /// inputs from its own seeded generator, so the summary is the same for
    /// any `jobs`. A case that errors is recorded and the others still run.
    /// The summary is also written to `<artifact_root>/suite_report.json`;
    /// failing to write it is logged, not fatal.
    pub fn run_all(&self, options: &RunOptions, simulator: &dyn Simulator) -> SuiteSummary {
        info!(suite = %self.name, cases = self.cases.len(), jobs = options.jobs, seed = options.seed, "running suite");

        let reports: Vec<CaseReport> = if options.jobs > 1 {
            match rayon::ThreadPoolBuilder::new().num_threads(options.jobs).build() {
                Ok(pool) => pool.install(|| {
                    self.cases.par_iter().map(|c| self.run_one(c.as_ref(), options, simulator)).collect::<Vec<_>>()
                }),
                Err(e) => {
                    warn!(error = %e, "could not build thread pool, running sequentially");
                    self.run_sequential(options, simulator)
                }
            }
        } else {
            self.run_sequential(options, simulator)
        };

        let summary = SuiteSummary::from_reports(&self.name, options.seed, options.tolerance, reports);
        info!(passed = summary.passed, failed = summary.failed, errored = summary.errored, total = summary.total, "suite finished");

        if let Err(e) = self.write_report(options, &summary) {
            warn!(error = %e, "could not write suite report");
        }
        summary
    }

    fn run_sequential(&self, options: &RunOptions, simulator: &dyn Simulator) -> Vec<CaseReport> {
        self.cases.iter().map(|c| self.run_one(c.as_ref(), options, simulator)).collect()
    }

    fn run_one(&self, case: &dyn OperatorCase, options: &RunOptions, simulator: &dyn Simulator) -> CaseReport {
        let span = info_span!("case", name = case.name());
        let _guard = span.enter();
        let dir = options.artifact_root.join(case.name());
        run_case(
            case,
            CaseRun {
                dir: &dir,
                rng: ChaCha8Rng::seed_from_u64(case_seed(options.seed, case.name())),
                input_scale: options.input_scale,
                tolerance: options.tolerance,
                simulator,
            },
        )
    }

    fn write_report(&self, options: &RunOptions, summary: &SuiteSummary) -> Result<()> {
        std::fs::create_dir_all(&options.artifact_root)
            .map_err(|e| NpuError::io(&options.artifact_root, e))?;
        summary.write_json(&options.artifact_root.join(REPORT_FILE))
    }
}

/// GEMM suite covering exact fit, tiling in K and N, and degenerate shapes.
pub fn default_gemm_suite() -> Result<TestSuite> {
    let mut suite = TestSuite::new("GEMM Engine Tests");
    for (name, m, k, n) in [
        ("GEMM_16x16x16", 16, 16, 16),
        ("GEMM_small", 4, 8, 4),
        ("GEMM_K_tiling", 16, 64, 16),
        ("GEMM_N_tiling", 16, 16, 64),
        ("GEMM_large", 64, 64, 64),
        ("GEMM_vector", 1, 16, 1),
        ("GEMM_K=1", 16, 1, 16),
    ] {
        suite.add_case(GemmCase::named(name, m, k, n)?)?;
    }
    Ok(suite)
}

/// Suite of ad-hoc GEMM shapes, each named `GEMM_{M}x{K}x{N}`.
pub fn gemm_suite(name: impl Into<String>, dims: &[(usize, usize, usize)]) -> Result<TestSuite> {
    let mut suite = TestSuite::new(name);
    for &(m, k, n) in dims {
        suite.add_case(GemmCase::new(m, k, n)?)?;
    }
    Ok(suite)
}
