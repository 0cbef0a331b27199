//! Run configuration loaded from TOML.
//!
//! Every section is optional; a missing file section falls back to defaults.
//! Components receive their section explicitly and never read the process
//! environment.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calibrator::CalibrationConfig;
use crate::decay::DecayConfig;
use crate::model::TrainingConfig;
use crate::monte_carlo::MonteCarloConfig;
use crate::source::SourceConfig;
use crate::updater::UpdateConfig;
use crate::validation::ValidationConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Where persisted artifacts live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub model: PathBuf,
    pub backup: PathBuf,
    pub thresholds: PathBuf,
    pub run_state: PathBuf,
    pub report_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            model: PathBuf::from("models/meta_label.json"),
            backup: PathBuf::from("models/meta_label.backup.json"),
            thresholds: PathBuf::from("models/thresholds.json"),
            run_state: PathBuf::from("state/run_state.json"),
            report_dir: PathBuf::from("reports"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeproofConfig {
    pub source: SourceConfig,
    pub paths: PathsConfig,
    pub validation: ValidationConfig,
    pub monte_carlo: MonteCarloConfig,
    pub decay: DecayConfig,
    pub update: UpdateConfig,
    pub training: TrainingConfig,
    pub calibration: CalibrationConfig,
}

impl EdgeproofConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let v = &self.validation;
        if v.splitter.n_splits == 0 {
            return invalid("validation.n_splits must be at least 1");
        }
        if !(0.0..0.5).contains(&v.splitter.purge_pct) || !(0.0..0.5).contains(&v.splitter.embargo_pct) {
            return invalid("validation.purge_pct and embargo_pct must be in [0, 0.5)");
        }
        if v.periods_per_year <= 0.0 {
            return invalid("validation.periods_per_year must be positive");
        }
        if v.n_trials == Some(0) {
            return invalid("validation.n_trials must be at least 1 when set");
        }
        if v.mc_max_drawdown <= 0.0 {
            return invalid("validation.mc_max_drawdown must be positive");
        }

        let mc = &self.monte_carlo;
        if !(mc.confidence > 0.0 && mc.confidence < 1.0) {
            return invalid("monte_carlo.confidence must be in (0, 1)");
        }

        if self.decay.windows.is_empty() || self.decay.windows.contains(&0) {
            return invalid("decay.windows must be non-empty and positive");
        }

        let u = &self.update;
        if u.min_batch_size == 0 {
            return invalid("update.min_batch_size must be at least 1");
        }
        if u.safety_sample_size == 0 {
            return invalid("update.safety_sample_size must be at least 1");
        }
        if !(0.0..=1.0).contains(&u.precision_floor) {
            return invalid("update.precision_floor must be in [0, 1]");
        }

        let t = &self.training;
        for (name, lr) in [("cold", t.cold.learning_rate), ("warm", t.warm.learning_rate)] {
            if !(lr > 0.0 && lr <= 1.0) {
                return Err(ConfigError::Invalid(format!(
                    "training.{name}.learning_rate must be in (0, 1], got {lr}"
                )));
            }
        }
        if t.tree.max_depth == 0 {
            return invalid("training.tree.max_depth must be at least 1");
        }
        if t.tree.lambda < 0.0 {
            return invalid("training.tree.lambda must be non-negative");
        }

        let c = &self.calibration;
        if c.grid().is_empty() {
            return invalid("calibration grid is empty");
        }
        if !(0.0..=1.0).contains(&c.recall_floor) {
            return invalid("calibration.recall_floor must be in [0, 1]");
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> Result<(), ConfigError> {
    Err(ConfigError::Invalid(msg.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monte_carlo::ResampleMode;

    #[test]
    fn empty_document_is_default() {
        let config = EdgeproofConfig::from_toml("").unwrap();
        assert_eq!(config, EdgeproofConfig::default());
        assert_eq!(config.update.cooldown_hours, 20);
        assert_eq!(config.update.safety_sample_size, 100);
    }

    #[test]
    fn partial_sections_override_defaults() {
        let config = EdgeproofConfig::from_toml(
            r#"
            [source]
            api_url = "http://localhost:8080"

            [validation]
            n_splits = 4
            min_sharpe = 0.8

            [monte_carlo]
            n_simulations = 250
            mode = "bootstrap"

            [update]
            safety_sample_size = 50

            [training.warm]
            rounds = 5
            learning_rate = 0.01
            "#,
        )
        .unwrap();
        assert_eq!(config.source.api_url.as_deref(), Some("http://localhost:8080"));
        assert_eq!(config.validation.splitter.n_splits, 4);
        assert_eq!(config.validation.splitter.purge_pct, 0.02);
        assert_eq!(config.validation.min_sharpe, 0.8);
        assert_eq!(config.monte_carlo.n_simulations, 250);
        assert_eq!(config.monte_carlo.mode, ResampleMode::Bootstrap);
        assert_eq!(config.update.safety_sample_size, 50);
        assert_eq!(config.update.min_batch_size, 3);
        assert_eq!(config.training.warm.rounds, 5);
        assert_eq!(config.training.cold.rounds, 100);
    }

    #[test]
    fn invalid_values_are_rejected() {
        for doc in [
            "[validation]\nn_splits = 0",
            "[monte_carlo]\nconfidence = 1.5",
            "[decay]\nwindows = []",
            "[update]\nprecision_floor = 2.0",
            "[training.cold]\nrounds = 10\nlearning_rate = 0.0",
        ] {
            assert!(
                matches!(EdgeproofConfig::from_toml(doc), Err(ConfigError::Invalid(_))),
                "accepted: {doc}"
            );
        }
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        assert!(matches!(
            EdgeproofConfig::from_toml("[validation\nn_splits = 3"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn from_file_reads_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edgeproof.toml");
        std::fs::write(&path, "[paths]\nreport_dir = \"out\"\n").unwrap();
        let config = EdgeproofConfig::from_file(&path).unwrap();
        assert_eq!(config.paths.report_dir, PathBuf::from("out"));
        assert_eq!(config.paths.model, PathBuf::from("models/meta_label.json"));
    }
}
