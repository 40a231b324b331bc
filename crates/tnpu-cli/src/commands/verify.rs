//! Run a GEMM suite against the hardware simulator.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tnpu_common::HarnessConfig;
use tnpu_crossval::{ProcessSimulator, RunOptions, SuiteSummary, TestSuite, default_gemm_suite, gemm_suite};
use tracing::info;

use crate::output::{self, OutputFormat};

/// Verify command arguments
#[derive(Args, Debug, Clone, Default)]
pub struct VerifyCommand {
    /// Simulator executable, or a directory holding it
    #[arg(long, value_name = "PATH")]
    pub simulator: Option<PathBuf>,

    /// Root directory for per-case artifacts
    #[arg(long, value_name = "DIR")]
    pub artifacts: Option<PathBuf>,

    /// Maximum allowed elementwise difference
    #[arg(long)]
    pub tolerance: Option<u32>,

    /// Number of cases run concurrently
    #[arg(long)]
    pub jobs: Option<usize>,

    /// Suite seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Per-case simulator timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// GEMM shape to test instead of the default suite (repeatable)
    #[arg(long = "case", value_name = "M,K,N", value_parser = parse_dims)]
    pub cases: Vec<(usize, usize, usize)>,

    /// Summary format on stdout
    #[arg(long, value_enum, ignore_case = true, default_value = "text")]
    pub format: OutputFormat,
}

/// Parse `M,K,N` into strictly positive dimensions.
pub fn parse_dims(s: &str) -> Result<(usize, usize, usize), String> {
    let dims = s
        .split(',')
        .map(|p| p.trim().parse::<usize>().map_err(|e| format!("invalid dimension '{p}': {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    match dims.as_slice() {
        &[m, k, n] if m > 0 && k > 0 && n > 0 => Ok((m, k, n)),
        &[_, _, _] => Err(format!("dimensions must be positive, got '{s}'")),
        _ => Err(format!("expected M,K,N, got '{s}'")),
    }
}

impl VerifyCommand {
    /// Configuration with the command-line flags applied on top.
    pub fn resolve(&self, base: &HarnessConfig) -> Result<HarnessConfig> {
        let mut config = base.clone();
        if let Some(sim) = &self.simulator {
            config.simulator = Some(sim.clone());
        }
        if let Some(dir) = &self.artifacts {
            config.artifact_root = dir.clone();
        }
        if let Some(tolerance) = self.tolerance {
            config.tolerance = tolerance;
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = timeout;
        }
        config.validate().context("Invalid verify options")?;
        Ok(config)
    }

    pub fn suite(&self) -> Result<TestSuite> {
        let suite = if self.cases.is_empty() {
            default_gemm_suite()?
        } else {
            gemm_suite("GEMM Engine Tests (custom)", &self.cases)?
        };
        Ok(suite)
    }

    pub fn execute(&self, base: &HarnessConfig) -> Result<SuiteSummary> {
        let config = self.resolve(base)?;
        let program = config
            .simulator_executable()
            .context("No simulator configured; pass --simulator or set TNPU_SIMULATOR")?;
        anyhow::ensure!(program.is_file(), "simulator not found: {}", program.display());

        let simulator = ProcessSimulator::new(program, Duration::from_secs(config.timeout_secs));
        let suite = self.suite()?;
        let options = RunOptions::from_config(&config);
        info!(simulator = %simulator.program().display(), artifacts = %options.artifact_root.display(), "verifying");

        let summary = suite.run_all(&options, &simulator);
        println!("{}", output::summary(&summary, self.format)?);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dims() {
        assert_eq!(parse_dims("4,8,4").unwrap(), (4, 8, 4));
        assert_eq!(parse_dims(" 1, 16 ,1").unwrap(), (1, 16, 1));
        assert!(parse_dims("4,8").unwrap_err().contains("M,K,N"));
        assert!(parse_dims("4,0,4").unwrap_err().contains("positive"));
        assert!(parse_dims("4,x,4").unwrap_err().contains("'x'"));
    }

    #[test]
    fn flags_override_config() {
        let cmd = VerifyCommand { tolerance: Some(2), jobs: Some(3), seed: Some(9), ..Default::default() };
        let cfg = cmd.resolve(&HarnessConfig::default()).unwrap();
        assert_eq!((cfg.tolerance, cfg.jobs, cfg.seed), (2, 3, 9));
        assert_eq!(cfg.timeout_secs, HarnessConfig::default().timeout_secs);
    }

    #[test]
    fn zero_jobs_is_rejected() {
        let cmd = VerifyCommand { jobs: Some(0), ..Default::default() };
        assert!(cmd.resolve(&HarnessConfig::default()).is_err());
    }

    #[test]
    fn custom_cases_replace_default_suite() {
        let cmd = VerifyCommand { cases: vec![(2, 3, 4), (1, 1, 1)], ..Default::default() };
        let suite = cmd.suite().unwrap();
        assert_eq!(suite.case_names().collect::<Vec<_>>(), vec!["GEMM_2x3x4", "GEMM_1x1x1"]);
        assert_eq!(VerifyCommand::default().suite().unwrap().len(), 7);
    }

    #[test]
    fn repeated_case_is_rejected() {
        let cmd = VerifyCommand { cases: vec![(4, 8, 4), (4, 8, 4)], ..Default::default() };
        let err = cmd.suite().err().unwrap();
        assert!(format!("{err:#}").contains("duplicate case name"));
    }

    #[test]
    fn missing_simulator_is_an_error() {
        let cmd = VerifyCommand { simulator: Some(PathBuf::from("/nonexistent/sim")), ..Default::default() };
        let err = cmd.execute(&HarnessConfig::default()).unwrap_err();
        assert!(err.to_string().contains("simulator not found"));
    }
}
