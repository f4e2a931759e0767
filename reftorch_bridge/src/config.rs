use std::fs;
use std::path::Path;

use reftorch_native::{BackendKind, DEFAULT_MAX_ELEMENTS};
use serde::{Deserialize, Serialize};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::error::ConfigError;

/// Names the file `BridgeConfig::from_env` reads.
pub const CONFIG_ENV: &str = "REFTORCH_CONFIG";

/// Session configuration, usually read from a small TOML file:
///
/// ```toml
/// backend = "torch"
/// device = "cuda:0"
/// seed = 42
/// log_filter = "reftorch_bridge=debug"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    pub backend: String,
    pub device: String,
    pub seed: u64,
    /// Element cap for a single CPU tensor.
    pub max_elements: usize,
    pub log_filter: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            backend: "cpu".to_string(),
            device: "cpu".to_string(),
            seed: 0,
            max_elements: DEFAULT_MAX_ELEMENTS,
            log_filter: "info".to_string(),
        }
    }
}

impl BridgeConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        debug!(path = %path.display(), "loaded bridge config");
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let cfg: BridgeConfig = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reads the file named by `REFTORCH_CONFIG`, or returns defaults when
    /// the variable is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    pub fn backend_kind(&self) -> Result<BackendKind, ConfigError> {
        self.backend.parse().map_err(ConfigError::Invalid)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.backend_kind()?;
        if self.device.trim().is_empty() {
            return Err(ConfigError::Invalid("device must not be empty".to_string()));
        }
        if self.max_elements == 0 {
            return Err(ConfigError::Invalid(
                "max_elements must be greater than zero".to_string(),
            ));
        }
        EnvFilter::try_new(&self.log_filter).map_err(|err| {
            ConfigError::Invalid(format!("log_filter '{}': {}", self.log_filter, err))
        })?;
        Ok(())
    }
}
