//! Where floating-point weights come from before packing.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tnpu_common::{NpuError, Result, Tensor};
use tracing::debug;

use crate::npy::parse_npy;

/// A named collection of floating tensors.
pub trait TensorSource {
    /// Tensor names available from this source, sorted.
    fn names(&self) -> Result<Vec<String>>;

    /// Load one tensor by name.
    fn load(&self, name: &str) -> Result<Tensor>;

    /// Load every tensor the source offers.
    fn load_all(&self) -> Result<BTreeMap<String, Tensor>> {
        self.names()?
            .into_iter()
            .map(|name| {
                let tensor = self.load(&name)?;
                Ok((name, tensor))
            })
            .collect()
    }
}

/// A directory of `<name>.npy` files.
#[derive(Debug, Clone)]
pub struct NpyDirectorySource {
    root: PathBuf,
}

impl NpyDirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.npy"))
    }
}

impl TensorSource for NpyDirectorySource {
    fn names(&self) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(&self.root).map_err(|e| NpuError::io(&self.root, e))?;
        let mut names = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| NpuError::io(&self.root, e))?.path();
            if !path.extension().is_some_and(|ext| ext == "npy") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn load(&self, name: &str) -> Result<Tensor> {
        let path = self.path_for(name);
        let bytes = std::fs::read(&path).map_err(|e| NpuError::io(&path, e))?;
        let tensor = parse_npy(&bytes)?;
        debug!(tensor = name, shape = ?tensor.shape(), path = %path.display(), "loaded npy tensor");
        Ok(tensor)
    }
}

/// In-memory source, mostly for tests and for callers that already hold tensors.
impl TensorSource for BTreeMap<String, Tensor> {
    fn names(&self) -> Result<Vec<String>> {
        Ok(self.keys().cloned().collect())
    }

    fn load(&self, name: &str) -> Result<Tensor> {
        self.get(name).cloned().ok_or_else(|| NpuError::MissingArtifact {
            path: PathBuf::from(name),
            what: "tensor not present in source".to_string(),
        })
    }
}
