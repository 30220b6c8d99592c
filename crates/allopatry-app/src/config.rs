//! YAML-backed application configuration.

use allopatry_core::WorldConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level configuration file: world parameters plus experiment
/// schedule. Every field is optional in the file and falls back to
/// its default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub world: WorldConfig,
    pub experiment: ExperimentConfig,
}

/// Schedule for the barrier experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Ticks simulated before the barrier goes up.
    pub burn_in_steps: u64,
    /// Ticks between speciation checks after the barrier.
    pub check_interval: u64,
    /// Hard tick budget for the whole run.
    pub max_steps: u64,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            burn_in_steps: 1_000,
            check_interval: 50,
            max_steps: 200_000,
        }
    }
}

impl AppConfig {
    /// Load and parse a YAML configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.world.validate().context("world configuration")?;
        if self.experiment.check_interval == 0 {
            anyhow::bail!("experiment.check_interval must be non-zero");
        }
        if self.experiment.max_steps < self.experiment.burn_in_steps {
            anyhow::bail!("experiment.max_steps must cover the burn-in");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config: AppConfig = serde_yaml::from_str("{}").expect("parse");
        assert_eq!(config.world.width, 100);
        assert_eq!(config.experiment.check_interval, 50);
    }

    #[test]
    fn partial_overrides_keep_other_defaults() {
        let raw = "world:\n  width: 40\n  rng_seed: 17\nexperiment:\n  burn_in_steps: 200\n";
        let config: AppConfig = serde_yaml::from_str(raw).expect("parse");
        assert_eq!(config.world.width, 40);
        assert_eq!(config.world.height, 100);
        assert_eq!(config.world.rng_seed, Some(17));
        assert_eq!(config.experiment.burn_in_steps, 200);
        assert_eq!(config.experiment.max_steps, 200_000);
        config.validate().expect("valid");
    }

    #[test]
    fn interval_of_zero_is_rejected() {
        let raw = "experiment:\n  check_interval: 0\n";
        let config: AppConfig = serde_yaml::from_str(raw).expect("parse");
        assert!(config.validate().is_err());
    }
}
