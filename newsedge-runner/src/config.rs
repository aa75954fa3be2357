//! Backtest configuration.
//!
//! ```toml
//! [engine.confirmation]
//! window_secs = 60
//!
//! [simulation]
//! horizon_ticks = 3600
//!
//! [perturbation]
//! seeds = 100
//! master_seed = 42
//! slippage_factor = [0.5, 2.0]
//! ```
//!
//! `[engine]` embeds the live engine configuration, so simulated runs use the
//! same confirmation and tier settings as the live path.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use newsedge_core::config::{ConfigError as EngineConfigError, EngineConfig};

use crate::monte_carlo::PerturbationConfig;
use crate::simulator::{SimulationConfig, Simulator};

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
    #[error(transparent)]
    Engine(#[from] EngineConfigError),
    #[error("invalid config [{field}]: {reason}")]
    Invalid { field: String, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub engine: EngineConfig,
    pub simulation: SimulationConfig,
    pub perturbation: PerturbationConfig,
}

impl BacktestConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: BacktestConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_sections(&self.engine, &self.simulation, &self.perturbation)
    }

    pub fn simulator(&self) -> Result<Simulator, ConfigError> {
        Simulator::new(
            self.engine.clone(),
            self.simulation.clone(),
            self.perturbation.clone(),
        )
    }
}

pub(crate) fn validate_sections(
    engine: &EngineConfig,
    simulation: &SimulationConfig,
    perturbation: &PerturbationConfig,
) -> Result<(), ConfigError> {
    engine.validate()?;
    simulation
        .validate()
        .map_err(|reason| ConfigError::Invalid {
            field: "simulation".into(),
            reason,
        })?;
    perturbation
        .validate()
        .map_err(|reason| ConfigError::Invalid {
            field: "perturbation".into(),
            reason,
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = BacktestConfig::from_toml("").unwrap();
        assert_eq!(cfg, BacktestConfig::default());
        assert_eq!(cfg.simulation.horizon_ticks, 3_600);
        assert_eq!(cfg.perturbation.master_seed, 42);
    }

    #[test]
    fn nested_engine_sections_parse() {
        let cfg = BacktestConfig::from_toml(
            r#"
            [engine.confirmation]
            window_secs = 30

            [engine.stops.tiers]
            lock_trail = 0.02

            [perturbation]
            seeds = 8
            slippage_factor = [0.8, 1.2]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.engine.confirmation.window_secs, 30);
        assert_eq!(cfg.engine.stops.tiers.lock_trail, 0.02);
        assert_eq!(cfg.perturbation.seeds, 8);
        assert_eq!(cfg.perturbation.slippage_factor, (0.8, 1.2));
        assert_eq!(cfg.perturbation.window_factor, (0.75, 1.25));
    }

    #[test]
    fn engine_errors_are_wrapped() {
        let err = BacktestConfig::from_toml("[engine.sizing]\nleverage = 0.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Engine(_)));

        let err = BacktestConfig::from_toml("[perturbation]\nwindow_factor = [0.0, 1.0]\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "perturbation"));
    }
}
