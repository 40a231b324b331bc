//! Harness configuration file format.
//!
//! Loads [`HarnessConfig`] from a TOML file (`tnpu.toml`) with environment
//! variable overrides via `TNPU_*` prefixed variables. Missing TOML fields
//! fall back to their defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Log output format for the CLI subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Compact => write!(f, "compact"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Logging section of [`HarnessConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `tnpu_crossval=debug`.
    /// Override: `TNPU_LOG_LEVEL`
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Pretty }
    }
}

/// Cross-verification harness configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Directory holding the simulator binaries, or the binary itself.
    /// Override: `TNPU_SIMULATOR`
    pub simulator: Option<PathBuf>,

    /// Binary name looked up inside `simulator` when it is a directory.
    pub simulator_binary: String,

    /// Root under which every test case gets its own directory.
    /// Override: `TNPU_ARTIFACT_ROOT`
    pub artifact_root: PathBuf,

    /// Per-invocation simulator timeout.
    /// Override: `TNPU_TIMEOUT_SECS`
    pub timeout_secs: u64,

    /// Maximum allowed elementwise absolute difference.
    /// Override: `TNPU_TOLERANCE`
    pub tolerance: u32,

    /// Suite seed; every case derives its own generator from it.
    /// Override: `TNPU_SEED`
    pub seed: u64,

    /// Number of cases executed concurrently (1 = sequential).
    /// Override: `TNPU_JOBS`
    pub jobs: usize,

    /// Factor applied to standard-normal samples before quantization.
    pub input_scale: f32,

    pub logging: LoggingConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            simulator: None,
            simulator_binary: "gemm_test".to_string(),
            artifact_root: PathBuf::from("build/verify"),
            timeout_secs: 60,
            tolerance: 0,
            seed: 42,
            jobs: 1,
            input_scale: 0.5,
            logging: LoggingConfig::default(),
        }
    }
}

/// Errors that can occur when loading or validating a [`HarnessConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invalid environment override {key}={value}: {reason}")]
    EnvOverride { key: String, value: String, reason: String },
}

impl HarnessConfig {
    /// Default configuration rendered as TOML.
    pub fn default_toml() -> Result<String, ConfigError> {
        Self::default().to_toml()
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load from a TOML file, then apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_toml(&contents)
    }

    /// Load from a TOML string, then apply environment overrides and validate.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut cfg: HarnessConfig = toml::from_str(toml_str)?;
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Resolve the simulator executable: `simulator` itself when it is a
    /// file, otherwise `simulator/simulator_binary`.
    pub fn simulator_executable(&self) -> Option<PathBuf> {
        let base = self.simulator.as_ref()?;
        if base.is_dir() { Some(base.join(&self.simulator_binary)) } else { Some(base.clone()) }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::Validation("timeout_secs must be > 0".into()));
        }
        if self.jobs == 0 {
            return Err(ConfigError::Validation("jobs must be > 0".into()));
        }
        if !self.input_scale.is_finite() || self.input_scale <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "input_scale must be finite and > 0, got {}",
                self.input_scale
            )));
        }
        if self.simulator_binary.is_empty() {
            return Err(ConfigError::Validation("simulator_binary must not be empty".into()));
        }
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::Validation("logging.level must not be empty".into()));
        }
        Ok(())
    }

    /// Apply `TNPU_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("TNPU_SIMULATOR") {
            self.simulator = Some(PathBuf::from(val));
        }
        if let Some(val) = lookup("TNPU_ARTIFACT_ROOT") {
            self.artifact_root = PathBuf::from(val);
        }
        if let Some(val) = lookup("TNPU_TIMEOUT_SECS") {
            self.timeout_secs = parse_override("TNPU_TIMEOUT_SECS", val)?;
        }
        if let Some(val) = lookup("TNPU_TOLERANCE") {
            self.tolerance = parse_override("TNPU_TOLERANCE", val)?;
        }
        if let Some(val) = lookup("TNPU_SEED") {
            self.seed = parse_override("TNPU_SEED", val)?;
        }
        if let Some(val) = lookup("TNPU_JOBS") {
            self.jobs = parse_override("TNPU_JOBS", val)?;
        }
        if let Some(val) = lookup("TNPU_LOG_LEVEL") {
            self.logging.level = val;
        }
        Ok(())
    }
}

fn parse_override<T>(key: &str, value: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| ConfigError::EnvOverride {
        key: key.to_string(),
        reason: e.to_string(),
        value,
    })
}
