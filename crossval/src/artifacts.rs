//! Per-case artifact directory: raw INT8 files and the JSON case config.
//!
//! Layout of `<artifact_root>/<case name>/`:
//!
//! - `A.bin`, `B.bin`: raw row-major INT8 inputs
//! - `test_config.json`: `{"M", "K", "N", "scale", "shift"}`
//! - `C_hw.bin`: raw row-major INT8 output written by the simulator

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tnpu_common::{FormatError, NpuError, Result, Tensor, checked_numel};

pub const INPUT_A_FILE: &str = "A.bin";
pub const INPUT_B_FILE: &str = "B.bin";
pub const CONFIG_FILE: &str = "test_config.json";
pub const OUTPUT_FILE: &str = "C_hw.bin";

/// Contents of `test_config.json` for a GEMM case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GemmCaseConfig {
    #[serde(rename = "M")]
    pub m: usize,
    #[serde(rename = "K")]
    pub k: usize,
    #[serde(rename = "N")]
    pub n: usize,
    pub scale: i32,
    pub shift: u32,
}

/// Clear and recreate a case directory so no stale output survives a re-run.
pub fn prepare_case_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        std::fs::remove_dir_all(dir).map_err(|e| NpuError::io(dir, e))?;
    }
    std::fs::create_dir_all(dir).map_err(|e| NpuError::io(dir, e))
}

fn int8_bytes(path: &Path, tensor: &Tensor) -> Result<Vec<u8>> {
    tensor.to_i8_bytes().ok_or_else(|| {
        NpuError::invalid_arg("write artifact", format!("{} needs an int8 tensor", path.display()))
    })
}

/// Write an INT8 tensor as raw row-major bytes.
pub fn write_raw_i8(path: &Path, tensor: &Tensor) -> Result<()> {
    let bytes = int8_bytes(path, tensor)?;
    std::fs::write(path, bytes).map_err(|e| NpuError::io(path, e))
}

/// Write an INT8 tensor as one two-digit hex byte per line (two's
/// complement), the format Verilog `$readmemh` loads.
pub fn write_hex_i8(path: &Path, tensor: &Tensor) -> Result<()> {
    let bytes = int8_bytes(path, tensor)?;
    let mut text = String::with_capacity(bytes.len() * 3);
    for b in bytes {
        // Writing to a String cannot fail.
        let _ = writeln!(text, "{b:02x}");
    }
    std::fs::write(path, text).map_err(|e| NpuError::io(path, e))
}

/// Read a raw INT8 file and reshape it, failing if the length does not match.
pub fn read_raw_i8(path: &Path, shape: &[usize]) -> Result<Tensor> {
    let bytes = std::fs::read(path).map_err(|e| NpuError::io(path, e))?;
    let expected = checked_numel(shape).ok_or_else(|| FormatError::Artifact {
        path: path.to_path_buf(),
        reason: format!("shape {shape:?} is too large"),
    })?;
    if bytes.len() != expected {
        return Err(FormatError::ArtifactLength { path: path.to_path_buf(), expected, found: bytes.len() }.into());
    }
    Tensor::from_i8_bytes(shape.to_vec(), &bytes)
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| FormatError::Artifact { path: path.to_path_buf(), reason: e.to_string() })?;
    std::fs::write(path, json).map_err(|e| NpuError::io(path, e))
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path).map_err(|e| NpuError::io(path, e))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| FormatError::Artifact { path: path.to_path_buf(), reason: e.to_string() }.into())
}

/// Paths of the standard files inside one case directory.
#[derive(Debug, Clone)]
pub struct CaseDir {
    root: PathBuf,
}

impl CaseDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn input_a(&self) -> PathBuf {
        self.root.join(INPUT_A_FILE)
    }

    pub fn input_b(&self) -> PathBuf {
        self.root.join(INPUT_B_FILE)
    }

    pub fn config(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn output(&self) -> PathBuf {
        self.root.join(OUTPUT_FILE)
    }
}
