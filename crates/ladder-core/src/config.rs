//! Ladder configuration
//!
//! Loaded from TOML with three sections:
//!
//! ```toml
//! [api]
//! base_url = "https://ladder.example.com/api"
//! token = "..."
//! timeout_secs = 15
//!
//! [runtime]
//! module_path = "/opt/ladder/python.wasm"
//! stdlib_dir = "/opt/ladder/lib"
//! wall_clock_ms = 5000
//!
//! [cache]
//! freshness_secs = 300
//! ```
//!
//! Every field has a default. `LADDER_API_URL`, `LADDER_API_TOKEN` and
//! `LADDER_PYTHON_WASM` override the file.

use ladder_client::ApiConfig;
use ladder_progress::{CacheOptions, DEFAULT_FRESHNESS};
use ladder_runtime::{ExecutionLimits, WasiPythonConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Overrides `api.base_url`
pub const ENV_API_URL: &str = "LADDER_API_URL";
/// Overrides `api.token`
pub const ENV_API_TOKEN: &str = "LADDER_API_TOKEN";
/// Overrides `runtime.module_path`
pub const ENV_PYTHON_WASM: &str = "LADDER_PYTHON_WASM";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read config {path}: {source}")]
    Read {
        /// File requested
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// File is not valid TOML for [`LadderConfig`]
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values parsed but are unusable
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LadderConfig {
    /// Progression server connection
    pub api: ApiConfig,
    /// Embedded interpreter and execution budgets
    pub runtime: RuntimeSettings,
    /// Progression cache tuning
    pub cache: CacheSettings,
}

impl LadderConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// `ConfigError::Read` or `ConfigError::Parse`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse TOML text
    ///
    /// # Errors
    /// `ConfigError::Parse` on malformed input.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// With API settings
    #[inline]
    #[must_use]
    pub fn with_api(mut self, api: ApiConfig) -> Self {
        self.api = api;
        self
    }

    /// With runtime settings
    #[inline]
    #[must_use]
    pub fn with_runtime(mut self, runtime: RuntimeSettings) -> Self {
        self.runtime = runtime;
        self
    }

    /// With cache settings
    #[inline]
    #[must_use]
    pub fn with_cache(mut self, cache: CacheSettings) -> Self {
        self.cache = cache;
        self
    }

    /// Apply `LADDER_*` overrides from the process environment
    #[must_use]
    pub fn apply_env(self) -> Self {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply `LADDER_*` overrides from `lookup`; empty values are ignored
    #[must_use]
    pub fn apply_env_with(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = get(ENV_API_URL) {
            self.api.base_url = url;
        }
        if let Some(token) = get(ENV_API_TOKEN) {
            self.api.token = Some(token);
        }
        if let Some(path) = get(ENV_PYTHON_WASM) {
            self.runtime.module_path = Some(PathBuf::from(path));
        }
        self
    }

    /// Reject values no session can work with
    ///
    /// # Errors
    /// `ConfigError::Invalid` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("api.base_url is empty".into()));
        }
        let budgets = [
            ("api.timeout_secs", self.api.timeout_secs),
            ("runtime.wall_clock_ms", self.runtime.wall_clock_ms),
            ("runtime.max_memory_bytes", self.runtime.max_memory_bytes as u64),
            ("runtime.max_output_bytes", self.runtime.max_output_bytes as u64),
            ("cache.freshness_secs", self.cache.freshness_secs),
        ];
        if let Some((field, _)) = budgets.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid(format!("{field} must be positive")));
        }
        Ok(())
    }
}

/// Embedded interpreter location and per-invocation budgets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Path to `python.wasm`
    pub module_path: Option<PathBuf>,
    /// Host standard library directory, mounted read-only
    pub stdlib_dir: Option<PathBuf>,
    /// Wall-clock budget per invocation
    pub wall_clock_ms: u64,
    /// Guest memory ceiling
    pub max_memory_bytes: usize,
    /// Captured stdout ceiling
    pub max_output_bytes: usize,
}

impl RuntimeSettings {
    /// With interpreter image
    #[inline]
    #[must_use]
    pub fn with_module_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.module_path = Some(path.into());
        self
    }

    /// With wall-clock budget in milliseconds
    #[inline]
    #[must_use]
    pub fn with_wall_clock_ms(mut self, ms: u64) -> Self {
        self.wall_clock_ms = ms;
        self
    }

    /// Execution limits for the sandbox
    #[must_use]
    pub fn limits(&self) -> ExecutionLimits {
        ExecutionLimits::new()
            .with_wall_clock(Duration::from_millis(self.wall_clock_ms))
            .with_max_memory(self.max_memory_bytes)
            .with_max_output(self.max_output_bytes)
    }

    /// Backend configuration; `None` until an image path is set
    #[must_use]
    pub fn python(&self) -> Option<WasiPythonConfig> {
        let config = WasiPythonConfig::new(self.module_path.clone()?);
        Some(match &self.stdlib_dir {
            Some(dir) => config.with_stdlib_dir(dir),
            None => config,
        })
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        let limits = ExecutionLimits::default();
        Self {
            module_path: None,
            stdlib_dir: None,
            wall_clock_ms: u64::try_from(limits.wall_clock.as_millis()).unwrap_or(u64::MAX),
            max_memory_bytes: limits.max_memory_bytes,
            max_output_bytes: limits.max_output_bytes,
        }
    }
}

/// Progression cache tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Freshness window for the challenge list
    pub freshness_secs: u64,
}

impl CacheSettings {
    /// Freshness window
    #[inline]
    #[must_use]
    pub fn freshness(&self) -> Duration {
        Duration::from_secs(self.freshness_secs)
    }

    /// Cache options
    #[must_use]
    pub fn options(&self) -> CacheOptions {
        CacheOptions::default().with_freshness(self.freshness())
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            freshness_secs: DEFAULT_FRESHNESS.as_secs(),
        }
    }
}
