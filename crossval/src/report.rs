//! Suite-level summary, written as `suite_report.json`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tnpu_common::Result;

use crate::artifacts::write_json;
use crate::case::{CaseReport, Outcome};

pub const REPORT_FILE: &str = "suite_report.json";

/// Aggregated results of one suite run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteSummary {
    pub suite: String,
    pub seed: u64,
    pub tolerance: u32,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub total: usize,
    /// Names of failed or errored cases, in suite order.
    pub failing: Vec<String>,
    pub cases: Vec<CaseReport>,
}

impl SuiteSummary {
    pub fn from_reports(suite: impl Into<String>, seed: u64, tolerance: u32, cases: Vec<CaseReport>) -> Self {
        let count = |o: Outcome| cases.iter().filter(|c| c.outcome == o).count();
        let failing = cases.iter().filter(|c| c.outcome != Outcome::Passed).map(|c| c.name.clone()).collect();
        Self {
            suite: suite.into(),
            seed,
            tolerance,
            passed: count(Outcome::Passed),
            failed: count(Outcome::Failed),
            errored: count(Outcome::Errored),
            total: cases.len(),
            failing,
            cases,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.passed == self.total
    }

    /// `0` when every case passed, `1` otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.all_passed() { 0 } else { 1 }
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        write_json(path, self)
    }

    /// Summary without per-case timings, for comparing repeated runs.
    pub fn verdicts(&self) -> Vec<(&str, Outcome)> {
        self.cases.iter().map(|c| (c.name.as_str(), c.outcome)).collect()
    }
}
