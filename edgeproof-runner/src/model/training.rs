//! Training strategies: fit from scratch or continue an existing ensemble.

use serde::{Deserialize, Serialize};
use tracing::info;

use edgeproof_core::{FeatureVector, FEATURE_COUNT};

use super::ensemble::BoostedEnsemble;
use super::tree::TreeParams;
use super::ModelError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    pub rounds: usize,
    pub learning_rate: f64,
}

/// `[training]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub cold: BoostingParams,
    /// Warm updates add few rounds at a low learning rate.
    pub warm: BoostingParams,
    pub tree: TreeParams,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            cold: BoostingParams {
                rounds: 100,
                learning_rate: 0.1,
            },
            warm: BoostingParams {
                rounds: 10,
                learning_rate: 0.02,
            },
            tree: TreeParams::default(),
        }
    }
}

pub trait TrainingStrategy {
    fn name(&self) -> &'static str;

    fn train(&self, features: &[FeatureVector], labels: &[bool]) -> Result<BoostedEnsemble, ModelError>;
}

pub struct ColdStart {
    params: BoostingParams,
    tree: TreeParams,
}

impl ColdStart {
    pub fn new(params: BoostingParams, tree: TreeParams) -> Self {
        Self { params, tree }
    }
}

impl TrainingStrategy for ColdStart {
    fn name(&self) -> &'static str {
        "cold_start"
    }

    fn train(&self, features: &[FeatureVector], labels: &[bool]) -> Result<BoostedEnsemble, ModelError> {
        let rows = feature_rows(features);
        let mut ensemble = BoostedEnsemble::with_prior(FEATURE_COUNT, labels);
        ensemble.boost(&rows, labels, self.params.rounds, self.params.learning_rate, &self.tree)?;
        info!(
            samples = rows.len(),
            rounds = ensemble.round_count(),
            "cold-start training complete"
        );
        Ok(ensemble)
    }
}

pub struct WarmStart {
    base: BoostedEnsemble,
    params: BoostingParams,
    tree: TreeParams,
}

impl WarmStart {
    pub fn new(base: BoostedEnsemble, params: BoostingParams, tree: TreeParams) -> Self {
        Self { base, params, tree }
    }
}

impl TrainingStrategy for WarmStart {
    fn name(&self) -> &'static str {
        "warm_start"
    }

    fn train(&self, features: &[FeatureVector], labels: &[bool]) -> Result<BoostedEnsemble, ModelError> {
        let rows = feature_rows(features);
        let mut ensemble = self.base.clone();
        let prior_rounds = ensemble.round_count();
        ensemble.boost(&rows, labels, self.params.rounds, self.params.learning_rate, &self.tree)?;
        info!(
            samples = rows.len(),
            prior_rounds,
            rounds = ensemble.round_count(),
            "warm-start update complete"
        );
        Ok(ensemble)
    }
}

/// Warm start when an ensemble exists, cold start otherwise.
pub fn select_strategy(existing: Option<BoostedEnsemble>, config: &TrainingConfig) -> Box<dyn TrainingStrategy> {
    match existing {
        Some(base) => Box::new(WarmStart::new(base, config.warm.clone(), config.tree.clone())),
        None => Box::new(ColdStart::new(config.cold.clone(), config.tree.clone())),
    }
}

pub fn feature_rows(features: &[FeatureVector]) -> Vec<&[f64]> {
    features.iter().map(|f| f.as_slice()).collect()
}

/// Probability of a win for each vector.
pub fn score(ensemble: &BoostedEnsemble, features: &[FeatureVector]) -> Vec<f64> {
    ensemble.predict_batch(&feature_rows(features))
}
