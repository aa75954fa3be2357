//! Engine configuration.
//!
//! Loaded from TOML. Every section and field has a default, so an empty file
//! is a valid configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::confirm::ConfirmationConfig;
use crate::gateway::ExecutionMode;
use crate::sizing::SizingConfig;
use crate::stops::StopConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config [{field}]: {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalPolicy {
    /// Signals below this confidence are dropped before any gateway call.
    pub min_confidence: f64,
    /// Number of signal ids remembered for de-duplication.
    pub dedup_capacity: usize,
}

impl Default for SignalPolicy {
    fn default() -> Self {
        Self {
            min_confidence: 0.0,
            dedup_capacity: 10_000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub mode: ExecutionMode,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub confirmation: ConfirmationConfig,
    pub sizing: SizingConfig,
    pub stops: StopConfig,
    pub signals: SignalPolicy,
    pub gateway: GatewayConfig,
}

impl EngineConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Parse and validate.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.confirmation
            .validate()
            .map_err(|r| ConfigError::invalid("confirmation", r))?;
        self.sizing
            .validate()
            .map_err(|r| ConfigError::invalid("sizing", r))?;
        self.stops
            .validate()
            .map_err(|r| ConfigError::invalid("stops", r))?;
        let min = self.signals.min_confidence;
        if !(0.0..=1.0).contains(&min) {
            return Err(ConfigError::invalid(
                "signals",
                format!("min_confidence must be in [0, 1], got {min}"),
            ));
        }
        if self.signals.dedup_capacity == 0 {
            return Err(ConfigError::invalid("signals", "dedup_capacity must be > 0"));
        }
        Ok(())
    }
}
