//! Cross-verification of the tiny-npu hardware model against the golden
//! kernels.
//!
//! A [`TestSuite`] holds [`OperatorCase`]s. Running a case generates seeded
//! INT8 inputs into its own artifact directory, computes the golden output,
//! invokes the [`Simulator`], and [`compare`]s the two. Per-case failures are
//! recorded in the [`SuiteSummary`] and never abort the suite.

pub mod artifacts;
pub mod case;
pub mod compare;
pub mod report;
pub mod simulator;
pub mod suite;

pub use case::{CaseInputs, CaseReport, CaseRun, CaseState, GemmCase, OperatorCase, Outcome, run_case};
pub use compare::{Comparison, MAX_EXAMPLES, MismatchExample, compare};
pub use report::{REPORT_FILE, SuiteSummary};
pub use simulator::{OUTPUT_TAIL_LINES, ProcessSimulator, Simulator, SimulatorRun, tail_lines};
pub use suite::{RunOptions, TestSuite, case_seed, default_gemm_suite, gemm_suite};
