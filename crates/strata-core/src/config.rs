//! Top-level configuration, loaded from TOML.
//!
//! Every section is optional; missing sections and fields take their
//! `Default` values.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::audit::retention::RetentionConfig;
use crate::state::retry::RetryPolicy;

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Emit newline-delimited JSON.
    pub json: bool,
    /// Default level when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json: false,
            level: "info".to_string(),
        }
    }
}

/// Bounded-memory limits for [`crate::memory::MemoryStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Pruning starts once the entry count exceeds this.
    pub max_entries: usize,
    /// Pruning stops at `floor(max_entries * prune_ratio)` entries.
    pub prune_ratio: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            prune_ratio: 0.8,
        }
    }
}

impl MemoryConfig {
    /// Entry count that a prune pass shrinks the store to.
    pub fn prune_target(&self) -> usize {
        (self.max_entries as f64 * self.prune_ratio).floor() as usize
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Capacity of the write-behind queue.
    pub queue_capacity: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrataConfig {
    pub logging: LoggingConfig,
    pub memory: MemoryConfig,
    pub retention: RetentionConfig,
    pub persistence: PersistenceConfig,
    pub retry: RetryPolicy,
}

impl StrataConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.memory.prune_ratio) {
            return Err(ConfigError::Invalid(format!(
                "memory.prune_ratio must be within [0, 1], got {}",
                self.memory.prune_ratio
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
