//! Alpha decay: is an algorithm's recent edge weaker than its longer-run edge?
//!
//! For each algorithm the Sharpe of the most recent `w` trades is computed for
//! every configured window the history can fill. The trend is the Sharpe of
//! the widest computed window minus that of the narrowest; trends below -0.5
//! flag the algorithm for reduced weight.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use edgeproof_core::metrics::sharpe_ratio;
use edgeproof_core::TradeRecord;

pub const REDUCE_WEIGHT_TREND: f64 = -0.5;
pub const MONITOR_TREND: f64 = -0.2;
pub const DECAYING_TREND: f64 = -0.3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayConfig {
    pub windows: Vec<usize>,
    /// Algorithms with fewer trades are not assessed.
    pub min_trades: usize,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            windows: vec![10, 20, 30, 50, 100],
            min_trades: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecayStatus {
    Healthy,
    Monitor,
    ReduceWeight,
}

impl DecayStatus {
    pub fn from_trend(trend: f64) -> Self {
        if trend < REDUCE_WEIGHT_TREND {
            Self::ReduceWeight
        } else if trend < MONITOR_TREND {
            Self::Monitor
        } else {
            Self::Healthy
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgoDecay {
    pub algorithm: String,
    pub trade_count: usize,
    /// Window length to Sharpe of the most recent `window` trades.
    pub rolling_sharpe: BTreeMap<usize, f64>,
    pub trend: f64,
    pub is_decaying: bool,
    pub status: DecayStatus,
}

impl AlgoDecay {
    /// Classify from an already computed window-to-Sharpe map.
    pub fn from_rolling(algorithm: &str, trade_count: usize, rolling_sharpe: BTreeMap<usize, f64>) -> Self {
        let trend = match (rolling_sharpe.values().next(), rolling_sharpe.values().next_back()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        };
        Self {
            algorithm: algorithm.to_string(),
            trade_count,
            rolling_sharpe,
            trend,
            is_decaying: trend < DECAYING_TREND,
            status: DecayStatus::from_trend(trend),
        }
    }
}

pub struct DecayMonitor {
    config: DecayConfig,
    periods_per_year: f64,
}

impl DecayMonitor {
    pub fn new(config: DecayConfig, periods_per_year: f64) -> Self {
        Self {
            config,
            periods_per_year,
        }
    }

    /// Assess one algorithm's chronological fractional returns.
    pub fn assess(&self, algorithm: &str, returns: &[f64]) -> Option<AlgoDecay> {
        if returns.len() < self.config.min_trades {
            debug!(algorithm, trades = returns.len(), "decay skipped: too few trades");
            return None;
        }
        let rolling: BTreeMap<usize, f64> = self
            .config
            .windows
            .iter()
            .filter(|&&w| w > 0 && returns.len() >= w)
            .map(|&w| (w, sharpe_ratio(&returns[returns.len() - w..], 0.0, self.periods_per_year)))
            .collect();
        let decay = AlgoDecay::from_rolling(algorithm, returns.len(), rolling);
        if decay.status == DecayStatus::ReduceWeight {
            warn!(algorithm, trend = decay.trend, "alpha decay: reduce weight");
        }
        Some(decay)
    }

    /// Assess every algorithm present in `trades` (assumed chronological).
    pub fn assess_all(&self, trades: &[TradeRecord]) -> Vec<AlgoDecay> {
        let mut by_algo: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for t in trades {
            by_algo.entry(t.algorithm.as_str()).or_default().push(t.fractional_return());
        }
        by_algo
            .into_iter()
            .filter_map(|(algorithm, returns)| self.assess(algorithm, &returns))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_trend_reduces_weight() {
        let rolling = BTreeMap::from([(10, 0.8), (20, 0.5), (30, 0.3), (50, 0.1), (100, -0.1)]);
        let d = AlgoDecay::from_rolling("insider", 120, rolling);
        assert!((d.trend + 0.9).abs() < 1e-12);
        assert!(d.is_decaying);
        assert_eq!(d.status, DecayStatus::ReduceWeight);
    }

    #[test]
    fn classification_bands() {
        assert_eq!(DecayStatus::from_trend(-0.9), DecayStatus::ReduceWeight);
        assert_eq!(DecayStatus::from_trend(-0.5), DecayStatus::Monitor);
        assert_eq!(DecayStatus::from_trend(-0.3), DecayStatus::Monitor);
        assert_eq!(DecayStatus::from_trend(-0.2), DecayStatus::Healthy);
        assert_eq!(DecayStatus::from_trend(0.4), DecayStatus::Healthy);
    }

    #[test]
    fn too_few_trades_excluded() {
        let monitor = DecayMonitor::new(DecayConfig::default(), 252.0);
        assert!(monitor.assess("a", &[0.01; 19]).is_none());
        assert!(monitor.assess("a", &[0.01; 20]).is_some());
    }

    #[test]
    fn only_fillable_windows_are_computed() {
        let monitor = DecayMonitor::new(DecayConfig::default(), 252.0);
        let returns: Vec<f64> = (0..35).map(|i| if i % 2 == 0 { 0.01 } else { -0.005 }).collect();
        let d = monitor.assess("a", &returns).unwrap();
        assert_eq!(d.rolling_sharpe.keys().copied().collect::<Vec<_>>(), vec![10, 20, 30]);
    }
}
