//! Validate a weight pack and print its manifest.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tnpu_pack::read_manifest;

use crate::output::{self, OutputFormat};

/// Inspect command arguments
#[derive(Args, Debug, Clone)]
pub struct InspectCommand {
    /// Pack file path
    #[arg(value_name = "PACK")]
    pub pack: PathBuf,

    /// Output format
    #[arg(long, value_enum, ignore_case = true, default_value = "text")]
    pub format: OutputFormat,
}

impl InspectCommand {
    pub fn execute(&self) -> Result<()> {
        println!("{}", self.render()?);
        Ok(())
    }

    /// Read, validate and render the manifest without printing it.
    pub fn render(&self) -> Result<String> {
        let data = std::fs::read(&self.pack)
            .with_context(|| format!("Failed to read pack: {}", self.pack.display()))?;
        let (header, manifest, _) = read_manifest(&data)
            .with_context(|| format!("Invalid pack: {}", self.pack.display()))?;
        output::manifest(&header, &manifest, self.format)
    }
}
