//! Meta-labeling model: gradient-boosted trees over the causal feature vector.
//!
//! The model answers one question per trade: given what was known at entry,
//! how likely is this trade to close with a positive return?

pub mod ensemble;
pub mod evaluation;
pub mod training;
pub mod tree;

pub use ensemble::BoostedEnsemble;
pub use evaluation::ClassificationMetrics;
pub use training::{select_strategy, BoostingParams, ColdStart, TrainingConfig, TrainingStrategy, WarmStart};
pub use tree::{RegressionTree, TreeParams};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("training set is empty")]
    EmptyTrainingSet,

    #[error("feature rows ({features}) and labels ({labels}) differ in length")]
    LengthMismatch { features: usize, labels: usize },

    #[error("feature width {found} does not match model width {expected}")]
    WidthMismatch { expected: usize, found: usize },

    #[error("invalid training parameter: {0}")]
    InvalidParams(String),
}
