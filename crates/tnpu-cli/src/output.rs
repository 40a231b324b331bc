//! Terminal rendering of weight-pack manifests and suite summaries.
//!
//! Every command that prints a result goes through here, so the text layout
//! and the JSON shape live in one place.

use std::fmt::Write as _;

use anyhow::{Context, Result};
use clap::ValueEnum;
use console::style;
use tnpu_crossval::{Outcome, SuiteSummary};
use tnpu_pack::{Manifest, PackHeader};

/// What a command writes to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Aligned, colored text.
    #[default]
    Text,
    /// The serialized manifest or `suite_report.json` body.
    Json,
}

/// Header line, totals, then one row per tensor in name order.
pub fn manifest(header: &PackHeader, manifest: &Manifest, format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        return serde_json::to_string_pretty(manifest).context("Failed to serialize manifest");
    }

    let mut out = String::new();
    let _ = writeln!(out, "format: {} v{}", manifest.format, header.version);
    let _ = writeln!(out, "tensors: {}", header.tensor_count);
    let _ = write!(out, "payload: {} bytes", manifest.payload_len());
    for (name, entry) in &manifest.tensors {
        let _ = write!(
            out,
            "\n  {name:<24} {:<14} scale={:<12e} offset={:<8} nbytes={}",
            format!("{:?}", entry.shape),
            entry.scale,
            entry.offset,
            entry.nbytes
        );
    }
    Ok(out)
}

/// Per-case verdicts with indented failure messages, then the totals.
pub fn summary(summary: &SuiteSummary, format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        return serde_json::to_string_pretty(summary).context("Failed to serialize suite summary");
    }

    let mut out = String::new();
    let _ = writeln!(out, "{}", style(format!("Suite: {}", summary.suite)).bold());
    for case in &summary.cases {
        let mark = match case.outcome {
            Outcome::Passed => style("PASS ").green(),
            Outcome::Failed => style("FAIL ").red(),
            Outcome::Errored => style("ERROR").yellow(),
        };
        let _ = writeln!(out, "  {mark} {:<20} {:>6} ms  {}", case.name, case.elapsed_ms, case.description);
        for line in case.message.iter().flat_map(|m| m.lines()) {
            let _ = writeln!(out, "        {line}");
        }
    }

    let totals = format!(
        "{}/{} passed ({} failed, {} errored)",
        summary.passed, summary.total, summary.failed, summary.errored
    );
    if summary.all_passed() {
        let _ = write!(out, "{}", style(totals).green());
    } else {
        let _ = write!(out, "{}\nFailing: {}", style(totals).red(), summary.failing.join(", "));
    }
    Ok(out)
}
