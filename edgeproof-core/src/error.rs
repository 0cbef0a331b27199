//! Errors raised while turning a trade into a feature vector.
//!
//! These are recoverable: the offending trade is skipped and processing
//! continues with the rest of the batch.

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureError {
    #[error("trade {symbol}: missing required field `{field}`")]
    MissingField { field: &'static str, symbol: String },

    #[error("trade {symbol}: exit {exit} is not after entry {entry}")]
    NonPositiveHolding {
        symbol: String,
        entry: DateTime<Utc>,
        exit: DateTime<Utc>,
    },

    #[error("trade {symbol}: field `{field}` is not finite")]
    NonFinite { field: &'static str, symbol: String },

    #[error("feature `{name}` evaluated to a non-finite value")]
    NonFiniteFeature { name: &'static str },
}
