//! Contextual snapshots: market regime state and per-algorithm signal counts.
//!
//! Both are keyed by calendar date. Lookups for a trade only ever see dates
//! strictly before the trade's entry date, so a snapshot written at the close
//! of the entry day cannot leak into that day's features.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Market regime state as produced by the external regime classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeSnapshot {
    pub date: NaiveDate,
    /// Volatility index level.
    pub vix: f64,
    /// Regime score in [-1, 1]: -1 risk-off, +1 risk-on.
    pub regime_score: f64,
    /// Index trend strength (e.g. distance of price from a long moving average).
    pub trend_strength: f64,
    /// Fraction of the universe above its moving average, in [0, 1].
    pub breadth: f64,
    /// Percentile of current realized volatility vs. its trailing year, in [0, 1].
    pub volatility_percentile: f64,
}

/// Number of signals one algorithm emitted on one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalCount {
    pub date: NaiveDate,
    pub algorithm: String,
    pub count: u32,
}

/// Wire form of the context, as delivered by a trade source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextData {
    #[serde(default)]
    pub regimes: Vec<RegimeSnapshot>,
    #[serde(default)]
    pub signal_counts: Vec<SignalCount>,
}

/// Indexed context used by feature engineering.
#[derive(Debug, Clone, Default)]
pub struct ContextStore {
    regimes: BTreeMap<NaiveDate, RegimeSnapshot>,
    signal_counts: BTreeMap<String, BTreeMap<NaiveDate, u32>>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_data(data: ContextData) -> Self {
        let mut store = Self::new();
        for regime in data.regimes {
            store.insert_regime(regime);
        }
        for sc in data.signal_counts {
            store.insert_signal_count(&sc.algorithm, sc.date, sc.count);
        }
        store
    }

    pub fn insert_regime(&mut self, snapshot: RegimeSnapshot) {
        self.regimes.insert(snapshot.date, snapshot);
    }

    /// Add `count` signals for `algorithm` on `date` (accumulates duplicates).
    pub fn insert_signal_count(&mut self, algorithm: &str, date: NaiveDate, count: u32) {
        *self
            .signal_counts
            .entry(algorithm.to_string())
            .or_default()
            .entry(date)
            .or_insert(0) += count;
    }

    pub fn is_empty(&self) -> bool {
        self.regimes.is_empty() && self.signal_counts.is_empty()
    }

    pub fn regime_count(&self) -> usize {
        self.regimes.len()
    }

    /// Most recent regime snapshot dated strictly before `at`'s date.
    pub fn regime_before(&self, at: DateTime<Utc>) -> Option<&RegimeSnapshot> {
        self.regimes
            .range(..at.date_naive())
            .next_back()
            .map(|(_, snapshot)| snapshot)
    }

    /// Signals emitted by `algorithm` over the `days` calendar days before `at`'s date.
    pub fn signals_before(&self, algorithm: &str, at: DateTime<Utc>, days: i64) -> u32 {
        let Some(by_date) = self.signal_counts.get(algorithm) else {
            return 0;
        };
        let end = at.date_naive();
        let start = end - Duration::days(days.max(0));
        by_date.range(start..end).map(|(_, c)| *c).sum()
    }

    pub fn to_data(&self) -> ContextData {
        let regimes = self.regimes.values().cloned().collect();
        let signal_counts = self
            .signal_counts
            .iter()
            .flat_map(|(algorithm, by_date)| {
                by_date.iter().map(move |(date, count)| SignalCount {
                    date: *date,
                    algorithm: algorithm.clone(),
                    count: *count,
                })
            })
            .collect();
        ContextData {
            regimes,
            signal_counts,
        }
    }
}
