//! Workflow configuration
//!
//! Loaded from an optional file (format by extension) and then from
//! `TRADE_APPROVAL__*` environment variables, e.g.
//! `TRADE_APPROVAL__STORAGE__BACKEND=sled`. Every key has a default.
use std::path::Path;

use serde::Deserialize;

pub const ENV_PREFIX: &str = "TRADE_APPROVAL";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] ::config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Sled,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub sled_path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub venue: String,
    /// Simulated round trip to the venue.
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub storage: StorageConfig,
    pub executor: ExecutorConfig,
    pub logging: LoggingConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            sled_path: "./data/trades.sled".to_string(),
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            venue: "SIMULATED".to_string(),
            latency_ms: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "trade_approval=info".to_string(),
        }
    }
}

impl WorkflowConfig {
    /// File first (if given and present), environment on top.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(false));
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.backend == StorageBackend::Sled && self.storage.sled_path.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "storage.sled_path must be set for the sled backend".to_string(),
            ));
        }
        if self.executor.venue.trim().is_empty() {
            return Err(ConfigError::Invalid("executor.venue must not be empty".to_string()));
        }
        Ok(())
    }
}
