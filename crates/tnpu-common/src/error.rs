//! Error taxonomy shared across the workspace.
//!
//! Kernel and format errors abort only the operation or artifact that
//! raised them. A comparison that finds differences is *not* an error; it
//! is reported through the comparator's result type.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::DType;

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, NpuError>;

/// Top-level error type.
#[derive(Debug, Error)]
pub enum NpuError {
    #[error("{op}: operand `{operand}` must be {expected}, got {found}")]
    InvalidDtype { op: &'static str, operand: &'static str, expected: DType, found: DType },

    #[error("{op}: shape mismatch: expected {expected}, found {found}")]
    ShapeMismatch { op: &'static str, expected: String, found: String },

    #[error("{op}: invalid argument: {reason}")]
    InvalidArgument { op: &'static str, reason: String },

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("missing artifact {}: {what}", path.display())]
    MissingArtifact { path: PathBuf, what: String },

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl NpuError {
    /// Shape mismatch with `Debug`-formatted shapes.
    pub fn shape(op: &'static str, expected: impl std::fmt::Debug, found: impl std::fmt::Debug) -> Self {
        Self::ShapeMismatch { op, expected: format!("{expected:?}"), found: format!("{found:?}") }
    }

    pub fn invalid_arg(op: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument { op, reason: reason.into() }
    }

    /// Wrap an I/O error with the path it happened on; `NotFound` becomes
    /// [`NpuError::MissingArtifact`].
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            return Self::MissingArtifact { path, what: source.to_string() };
        }
        Self::Io { path, source }
    }
}

/// Structural problems in a weight pack, a `.npy` source file, or a raw
/// simulator artifact.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FormatError {
    #[error("blob too short for {what}: need {needed} bytes, found {found}")]
    Truncated { what: &'static str, needed: usize, found: usize },

    #[error("bad magic: expected {expected:?}, found {found:?}")]
    BadMagic { expected: String, found: String },

    #[error("unsupported version: expected {expected}, found {found}")]
    UnsupportedVersion { expected: u32, found: u32 },

    #[error("manifest is not valid UTF-8 JSON: {reason}")]
    ManifestJson { reason: String },

    #[error("unknown manifest format {found:?}, expected {expected:?}")]
    ManifestFormat { expected: String, found: String },

    #[error("unsupported assumption {field}: expected {expected}, found {found}")]
    UnsupportedAssumption { field: &'static str, expected: String, found: String },

    #[error("tensor count mismatch: header says {header}, manifest lists {manifest}")]
    TensorCountMismatch { header: u32, manifest: usize },

    #[error("tensor `{name}` starts at offset {found} but previous tensor ends at {expected} (gap of {gap} bytes)")]
    OffsetGap { name: String, expected: u64, found: u64, gap: u64 },

    #[error("tensor `{name}` starts at offset {found} but previous tensor ends at {expected} (overlap of {overlap} bytes)")]
    OffsetOverlap { name: String, expected: u64, found: u64, overlap: u64 },

    #[error("payload length mismatch: manifest covers {manifest} bytes, payload has {payload}")]
    PayloadLength { manifest: u64, payload: u64 },

    #[error("tensor `{name}` shape {shape:?} holds {elements} elements but nbytes is {nbytes}")]
    ShapeLength { name: String, shape: Vec<usize>, elements: u64, nbytes: u64 },

    #[error("tensor `{name}` has unsupported dtype `{dtype}`")]
    UnsupportedDtype { name: String, dtype: String },

    #[error("tensor `{name}` has invalid scale {scale} (must be finite and > 0)")]
    InvalidScale { name: String, scale: f64 },

    #[error("{field} does not fit in a u32 header field ({value})")]
    FieldOverflow { field: &'static str, value: u64 },

    #[error("invalid .npy data: {reason}")]
    Npy { reason: String },

    #[error("artifact {} has {found} bytes, expected {expected}", path.display())]
    ArtifactLength { path: PathBuf, expected: usize, found: usize },

    #[error("invalid artifact {}: {reason}", path.display())]
    Artifact { path: PathBuf, reason: String },
}

/// Failures invoking the external hardware simulator.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("failed to launch simulator {}: {reason}", program.display())]
    Spawn { program: PathBuf, reason: String },

    #[error(
        "simulator exited with {status}\n--- stdout (tail) ---\n{stdout_tail}\n--- stderr (tail) ---\n{stderr_tail}"
    )]
    NonZeroExit { status: String, stdout_tail: String, stderr_tail: String },

    #[error(
        "simulator timed out after {timeout:?}\n--- stdout (tail) ---\n{stdout_tail}\n--- stderr (tail) ---\n{stderr_tail}"
    )]
    Timeout { timeout: Duration, stdout_tail: String, stderr_tail: String },
}
