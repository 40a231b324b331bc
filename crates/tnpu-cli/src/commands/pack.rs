//! Quantize a directory of `.npy` tensors into a weight pack.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tnpu_pack::{NpyDirectorySource, PackedBlob, TensorSource, pack, write_pack_file};
use tracing::info;

/// Pack command arguments
#[derive(Args, Debug, Clone)]
pub struct PackCommand {
    /// Directory of little-endian float32 `<name>.npy` files
    #[arg(short, long, value_name = "DIR")]
    pub input: PathBuf,

    /// Output pack file
    #[arg(short, long, value_name = "PATH")]
    pub output: PathBuf,

    /// Only pack these tensors (comma separated)
    #[arg(long, value_delimiter = ',', value_name = "NAMES")]
    pub names: Vec<String>,
}

impl PackCommand {
    pub fn execute(&self) -> Result<PackedBlob> {
        let source = NpyDirectorySource::new(&self.input);
        let tensors = if self.names.is_empty() {
            source.load_all()
        } else {
            self.names
                .iter()
                .map(|name| Ok((name.clone(), source.load(name)?)))
                .collect::<tnpu_common::Result<BTreeMap<_, _>>>()
        }
        .with_context(|| format!("Failed to load tensors from {}", self.input.display()))?;

        anyhow::ensure!(!tensors.is_empty(), "no .npy tensors found in {}", self.input.display());

        let blob = pack(&tensors).context("Failed to pack tensors")?;
        write_pack_file(&self.output, &blob)
            .with_context(|| format!("Failed to write {}", self.output.display()))?;

        info!(
            tensors = blob.manifest().tensors.len(),
            payload_bytes = blob.payload_len(),
            total_bytes = blob.as_bytes().len(),
            output = %self.output.display(),
            "wrote weight pack"
        );
        Ok(blob)
    }
}
