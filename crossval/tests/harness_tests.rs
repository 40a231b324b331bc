//! End-to-end harness tests against in-process simulator doubles.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tnpu_common::{ExecutionError, Result, Tensor};
use tnpu_crossval::artifacts::{CaseDir, GemmCaseConfig, read_json, read_raw_i8, write_raw_i8};
use tnpu_crossval::{
    CaseState, Outcome, REPORT_FILE, RunOptions, Simulator, SimulatorRun, SuiteSummary, default_gemm_suite,
    gemm_suite,
};
use tnpu_kernels::{GemmParams, gemm};

// ---------------------------------------------------------------------------
// Simulator doubles
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
enum Behaviour {
    /// Compute the correct answer.
    Exact,
    /// Correct answer with the first element off by `delta`.
    OffBy(i8),
    /// Exit non-zero.
    Crash,
    /// Exit zero but never write `C_hw.bin`.
    NoOutput,
}

struct FakeSimulator {
    behaviour: Behaviour,
    /// Case directory names that crash regardless of `behaviour`.
    crash_on: Vec<&'static str>,
    calls: AtomicUsize,
}

impl FakeSimulator {
    fn new(behaviour: Behaviour) -> Self {
        Self { behaviour, crash_on: Vec::new(), calls: AtomicUsize::new(0) }
    }

    fn crashing_on(mut self, name: &'static str) -> Self {
        self.crash_on.push(name);
        self
    }
}

fn ran_ok() -> SimulatorRun {
    SimulatorRun { stdout_tail: String::new(), stderr_tail: String::new(), elapsed: Duration::ZERO }
}

fn crash() -> tnpu_common::NpuError {
    ExecutionError::NonZeroExit {
        status: "exit status: 2".into(),
        stdout_tail: "loading A.bin".into(),
        stderr_tail: "assertion failed: fifo overflow".into(),
    }
    .into()
}

impl Simulator for FakeSimulator {
    fn run(&self, case_dir: &Path) -> Result<SimulatorRun> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = case_dir.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if self.crash_on.iter().any(|n| *n == name) {
            return Err(crash());
        }

        let dir = CaseDir::new(case_dir);
        let cfg: GemmCaseConfig = read_json(&dir.config())?;
        let a = read_raw_i8(&dir.input_a(), &[cfg.m, cfg.k])?;
        let b = read_raw_i8(&dir.input_b(), &[cfg.k, cfg.n])?;
        let c = gemm(&a, &b, GemmParams::new(cfg.scale, cfg.shift))?;

        match self.behaviour {
            Behaviour::Exact => write_raw_i8(&dir.output(), &c)?,
            Behaviour::OffBy(delta) => {
                let mut v = c.as_i8().unwrap().to_vec();
                v[0] = v[0].wrapping_add(delta);
                write_raw_i8(&dir.output(), &Tensor::from_i8(c.shape().to_vec(), v)?)?;
            }
            Behaviour::Crash => return Err(crash()),
            Behaviour::NoOutput => {}
        }
        Ok(ran_ok())
    }
}

fn options(root: &Path, jobs: usize) -> RunOptions {
    RunOptions { artifact_root: root.to_path_buf(), jobs, ..RunOptions::default() }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[test]
fn exact_simulator_passes_default_suite() {
    let dir = tempfile::tempdir().unwrap();
    let suite = default_gemm_suite().unwrap();
    let sim = FakeSimulator::new(Behaviour::Exact);

    let summary = suite.run_all(&options(dir.path(), 1), &sim);

    assert_eq!(summary.total, 7);
    assert_eq!(summary.passed, 7, "{summary:?}");
    assert!(summary.failing.is_empty());
    assert_eq!(summary.exit_code(), 0);
    assert_eq!(sim.calls.load(Ordering::SeqCst), 7);
    for case in &summary.cases {
        assert_eq!(case.reached, CaseState::Compared);
        assert_eq!(case.final_state(), CaseState::Passed);
    }
}

#[test]
fn one_wrong_element_fails_with_coordinates() {
    let dir = tempfile::tempdir().unwrap();
    let suite = gemm_suite("one", &[(4, 8, 4)]).unwrap();

    let summary = suite.run_all(&options(dir.path(), 1), &FakeSimulator::new(Behaviour::OffBy(1)));

    let case = &summary.cases[0];
    let cmp = case.comparison.as_ref().unwrap();
    assert_eq!(case.outcome, Outcome::Failed);
    assert_eq!(cmp.mismatches, 1);
    assert_eq!(cmp.examples[0].coord, vec![0, 0]);
    assert!(case.message.as_ref().unwrap().contains("1/16 mismatch"));
    assert_eq!(summary.failing, vec!["GEMM_4x8x4"]);
    assert_eq!(summary.exit_code(), 1);
}

#[test]
fn tolerance_absorbs_small_differences() {
    let dir = tempfile::tempdir().unwrap();
    let suite = gemm_suite("one", &[(4, 8, 4)]).unwrap();
    let mut opts = options(dir.path(), 1);
    opts.tolerance = 255;

    let summary = suite.run_all(&opts, &FakeSimulator::new(Behaviour::OffBy(1)));
    assert_eq!(summary.passed, 1);
}

#[test]
fn crash_is_errored_with_captured_output() {
    let dir = tempfile::tempdir().unwrap();
    let suite = gemm_suite("one", &[(2, 2, 2)]).unwrap();

    let summary = suite.run_all(&options(dir.path(), 1), &FakeSimulator::new(Behaviour::Crash));

    let case = &summary.cases[0];
    assert_eq!(case.outcome, Outcome::Errored);
    assert_eq!(case.reached, CaseState::GoldenComputed);
    assert!(case.comparison.is_none());
    let msg = case.message.as_ref().unwrap();
    assert!(msg.contains("fifo overflow"), "{msg}");
    assert!(msg.contains("exit status: 2"), "{msg}");
}

#[test]
fn missing_output_is_errored() {
    let dir = tempfile::tempdir().unwrap();
    let suite = gemm_suite("one", &[(2, 2, 2)]).unwrap();

    let summary = suite.run_all(&options(dir.path(), 1), &FakeSimulator::new(Behaviour::NoOutput));

    let case = &summary.cases[0];
    assert_eq!(case.outcome, Outcome::Errored);
    assert!(case.message.as_ref().unwrap().contains("C_hw.bin"));
}

#[test]
fn one_crashing_case_does_not_stop_siblings() {
    let dir = tempfile::tempdir().unwrap();
    let suite = default_gemm_suite().unwrap();
    let sim = FakeSimulator::new(Behaviour::Exact).crashing_on("GEMM_K_tiling");

    let summary = suite.run_all(&options(dir.path(), 1), &sim);

    assert_eq!(summary.passed, 6);
    assert_eq!(summary.errored, 1);
    assert_eq!(summary.failing, vec!["GEMM_K_tiling"]);
    assert_eq!(sim.calls.load(Ordering::SeqCst), 7);
}

// ---------------------------------------------------------------------------
// Artifacts and determinism
// ---------------------------------------------------------------------------

#[test]
fn each_case_owns_its_directory() {
    let dir = tempfile::tempdir().unwrap();
    let suite = default_gemm_suite().unwrap();
    suite.run_all(&options(dir.path(), 1), &FakeSimulator::new(Behaviour::Exact));

    for name in suite.case_names() {
        let case = CaseDir::new(dir.path().join(name));
        assert!(case.input_a().is_file(), "{name}");
        assert!(case.input_b().is_file(), "{name}");
        assert!(case.output().is_file(), "{name}");
        let cfg: GemmCaseConfig = read_json(&case.config()).unwrap();
        assert_eq!(std::fs::read(case.output()).unwrap().len(), cfg.m * cfg.n);
    }

    let report: SuiteSummary = read_json(&dir.path().join(REPORT_FILE)).unwrap();
    assert_eq!(report.total, 7);
    assert_eq!(report.suite, "GEMM Engine Tests");
}

#[test]
fn same_seed_reproduces_inputs_and_verdicts() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    let suite = default_gemm_suite().unwrap();
    let sim = FakeSimulator::new(Behaviour::OffBy(3)).crashing_on("GEMM_vector");

    let a = suite.run_all(&options(first.path(), 1), &sim);
    let b = suite.run_all(&options(second.path(), 1), &sim);

    assert_eq!(a.verdicts(), b.verdicts());
    assert_eq!(a.failing, b.failing);
    for name in suite.case_names() {
        let x = std::fs::read(first.path().join(name).join("A.bin")).unwrap();
        let y = std::fs::read(second.path().join(name).join("A.bin")).unwrap();
        assert_eq!(x, y, "{name}");
    }
}

#[test]
fn different_seed_changes_inputs() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    let suite = gemm_suite("one", &[(8, 8, 8)]).unwrap();
    let sim = FakeSimulator::new(Behaviour::Exact);

    suite.run_all(&options(first.path(), 1), &sim);
    suite.run_all(&RunOptions { seed: 7, ..options(second.path(), 1) }, &sim);

    let x = std::fs::read(first.path().join("GEMM_8x8x8").join("A.bin")).unwrap();
    let y = std::fs::read(second.path().join("GEMM_8x8x8").join("A.bin")).unwrap();
    assert_ne!(x, y);
}

#[test]
fn parallel_run_matches_sequential_run() {
    let seq_dir = tempfile::tempdir().unwrap();
    let par_dir = tempfile::tempdir().unwrap();
    let suite = default_gemm_suite().unwrap();
    let sim = FakeSimulator::new(Behaviour::Exact).crashing_on("GEMM_small");

    let seq = suite.run_all(&options(seq_dir.path(), 1), &sim);
    let par = suite.run_all(&options(par_dir.path(), 4), &sim);

    assert_eq!(seq.verdicts(), par.verdicts());
    assert_eq!(seq.failing, par.failing);
    let names: Vec<_> = par.cases.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, suite.case_names().collect::<Vec<_>>());
}

#[test]
fn rerun_overwrites_only_its_own_directory() {
    let dir = tempfile::tempdir().unwrap();
    let sibling = dir.path().join("unrelated");
    std::fs::create_dir_all(&sibling).unwrap();
    std::fs::write(sibling.join("keep.txt"), b"keep").unwrap();

    let suite = gemm_suite("one", &[(2, 2, 2)]).unwrap();
    let stale = dir.path().join("GEMM_2x2x2").join("stale.bin");
    std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
    std::fs::write(&stale, b"old").unwrap();

    suite.run_all(&options(dir.path(), 1), &FakeSimulator::new(Behaviour::Exact));

    assert!(!stale.exists());
    assert_eq!(std::fs::read(sibling.join("keep.txt")).unwrap(), b"keep");
}
