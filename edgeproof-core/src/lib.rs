//! Edgeproof Core: domain types, causal features, purged splitting, metrics, statistics.
//!
//! This crate holds the pure building blocks of the validation framework:
//! - Trade and context domain types with explicit invariants
//! - Causal (no-lookahead) feature engineering with a versioned schema
//! - Purged, embargoed time-series splitter
//! - Return-series performance metrics
//! - Deflated Sharpe ratio and one-sided t-test
//! - Deterministic seed derivation for resampling

pub mod domain;
pub mod error;
pub mod features;
pub mod metrics;
pub mod rng;
pub mod splitter;
pub mod stats;

pub use domain::{AssetClass, ContextData, ContextStore, Direction, RegimeSnapshot, TradeRecord};
pub use error::FeatureError;
pub use features::{
    collect_valid, FeatureEngineer, FeatureVector, FEATURE_COUNT, FEATURE_NAMES,
    FEATURE_SCHEMA_VERSION,
};
pub use metrics::PerformanceSummary;
pub use rng::SeedHierarchy;
pub use splitter::{Fold, PurgedSplitter, SplitterConfig};
pub use stats::{deflated_sharpe, DeflatedSharpe, TTestResult};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: public types are Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<TradeRecord>();
        require_sync::<TradeRecord>();
        require_send::<ContextStore>();
        require_sync::<ContextStore>();
        require_send::<FeatureVector>();
        require_sync::<FeatureVector>();
        require_send::<Fold>();
        require_sync::<Fold>();
        require_send::<PurgedSplitter>();
        require_sync::<PurgedSplitter>();
        require_send::<PerformanceSummary>();
        require_sync::<PerformanceSummary>();
        require_send::<DeflatedSharpe>();
        require_sync::<DeflatedSharpe>();
        require_send::<SeedHierarchy>();
        require_sync::<SeedHierarchy>();
        require_send::<FeatureError>();
        require_sync::<FeatureError>();
    }
}
