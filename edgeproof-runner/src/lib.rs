//! Edgeproof Runner: validation pipeline and guarded model updates.
//!
//! This crate builds on `edgeproof-core` to provide:
//! - Trade sources (SQLite, HTTP API, CSV) behind one trait
//! - Walk-forward validation with deflated Sharpe, Monte Carlo and decay checks
//! - A gradient-boosted meta-label classifier with cold and warm training
//! - Per-algorithm threshold calibration
//! - Incremental updates gated by a safety check with rollback

pub mod artifact;
pub mod calibrator;
pub mod config;
pub mod decay;
pub mod model;
pub mod monte_carlo;
pub mod run_state;
pub mod source;
pub mod summary;
pub mod updater;
pub mod validation;

pub use artifact::{checksum, ArtifactError, ModelArtifact, ModelStore, ARTIFACT_FORMAT_VERSION};
pub use calibrator::{calibrate, CalibrationConfig, ScoredTrade, ThresholdEntry, ThresholdTable};
pub use config::{ConfigError, EdgeproofConfig, PathsConfig};
pub use decay::{AlgoDecay, DecayConfig, DecayMonitor, DecayStatus};
pub use model::{BoostedEnsemble, ClassificationMetrics, ModelError, TrainingConfig, TrainingStrategy};
pub use monte_carlo::{
    MetricDistribution, MonteCarloConfig, MonteCarloOutcome, MonteCarloSimulator, MonteCarloSummary,
    ResampleMode,
};
pub use run_state::RunState;
pub use source::{open_source, SourceConfig, SourceError, SourceKind, TradeSource};
pub use summary::{render_update, render_validation};
pub use updater::{IncrementalUpdater, UpdateConfig, UpdateError, UpdateOptions, UpdateReport, UpdateStatus};
pub use validation::{run_validation, ValidationConfig, ValidationError, ValidationReport, Verdict};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn reports_are_send_sync() {
        assert_send::<ValidationReport>();
        assert_sync::<ValidationReport>();
        assert_send::<UpdateReport>();
        assert_sync::<UpdateReport>();
    }

    #[test]
    fn model_types_are_send_sync() {
        assert_send::<BoostedEnsemble>();
        assert_sync::<BoostedEnsemble>();
        assert_send::<ModelArtifact>();
        assert_sync::<ModelArtifact>();
    }

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<EdgeproofConfig>();
        assert_sync::<EdgeproofConfig>();
        assert_send::<MonteCarloSimulator>();
        assert_sync::<MonteCarloSimulator>();
    }
}
