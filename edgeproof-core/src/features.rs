//! Causal feature engineering for the meta-label classifier.
//!
//! Each closed trade becomes a fixed-length [`FeatureVector`] built from the
//! trade itself, the context snapshots dated before its entry, and a rolling
//! per-algorithm history. The history only ever contains trades that appear
//! earlier in the input sequence *and* had already closed when the current
//! trade was entered, so the vector for trade `i` is a function of trades
//! `0..i` alone.
//!
//! The schema is versioned: adding, removing or reordering a feature must bump
//! [`FEATURE_SCHEMA_VERSION`] so that stale model artifacts are rejected.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};

use chrono::{DateTime, Datelike, Timelike, Utc};
use tracing::{debug, warn};

use crate::domain::{ContextStore, TradeRecord};
use crate::error::FeatureError;

pub const FEATURE_SCHEMA_VERSION: u32 = 1;
pub const FEATURE_COUNT: usize = 35;

/// Feature names, in vector order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    // identity
    "algo_id",
    "asset_class",
    "direction",
    "log_position_size",
    "log_algo_trade_count",
    // regime
    "vix",
    "regime_score",
    "trend_strength",
    "breadth",
    "volatility_percentile",
    "regime_available",
    // rolling performance
    "win_rate_10",
    "win_rate_20",
    "win_rate_50",
    "mean_return_10",
    "mean_return_20",
    "sharpe_20",
    "return_std_20",
    "streak",
    "days_since_last_close",
    "symbol_win_rate",
    // market context
    "day_of_week",
    "month",
    "entry_hour",
    "signals_1d",
    "signals_5d",
    "global_win_rate_20",
    // quality
    "signal_strength",
    "signal_strength_z",
    "size_vs_algo_mean",
    "concurrent_open_trades",
    // interaction
    "strength_x_win_rate",
    "direction_x_regime",
    "vix_x_strength",
    "sharpe_x_regime",
];

const HISTORY_CAP: usize = 100;
const DAYS_SINCE_CAP: f64 = 365.0;

/// A versioned, fixed-length numeric feature vector.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub schema_version: u32,
    pub values: [f64; FEATURE_COUNT],
}

impl FeatureVector {
    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.values[i])
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }
}

/// Fallbacks for context the feature builder cannot find.
#[derive(Debug, Clone)]
pub struct FeatureConfig {
    /// Default VIX level used when no regime snapshot precedes the trade.
    pub default_vix: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self { default_vix: 20.0 }
    }
}

// ─── Rolling history ─────────────────────────────────────────────────

#[derive(Debug, Default)]
struct AlgoHistory {
    returns: VecDeque<f64>,
    wins: VecDeque<bool>,
    strengths: VecDeque<f64>,
    sizes: VecDeque<f64>,
    streak: i64,
    last_close: Option<DateTime<Utc>>,
    count: usize,
    by_symbol: HashMap<String, (usize, usize)>,
}

impl AlgoHistory {
    fn record(&mut self, trade: &TradeRecord) {
        push_capped(&mut self.returns, trade.fractional_return());
        push_capped(&mut self.wins, trade.is_win());
        push_capped(&mut self.strengths, trade.signal_strength);
        push_capped(&mut self.sizes, trade.position_size);

        self.streak = match (trade.is_win(), self.streak) {
            (true, s) if s > 0 => s + 1,
            (true, _) => 1,
            (false, s) if s < 0 => s - 1,
            (false, _) => -1,
        };
        self.last_close = Some(match self.last_close {
            Some(prev) if prev > trade.exit_time => prev,
            _ => trade.exit_time,
        });
        self.count += 1;

        let entry = self.by_symbol.entry(trade.symbol.clone()).or_insert((0, 0));
        if trade.is_win() {
            entry.0 += 1;
        }
        entry.1 += 1;
    }

    fn win_rate(&self, window: usize) -> f64 {
        let n = self.wins.len().min(window);
        if n == 0 {
            return 0.5;
        }
        let wins = self.wins.iter().rev().take(n).filter(|w| **w).count();
        wins as f64 / n as f64
    }

    fn recent_returns(&self, window: usize) -> Vec<f64> {
        let n = self.returns.len().min(window);
        self.returns.iter().skip(self.returns.len() - n).copied().collect()
    }

    fn symbol_win_rate(&self, symbol: &str) -> f64 {
        match self.by_symbol.get(symbol) {
            Some((wins, total)) if *total > 0 => *wins as f64 / *total as f64,
            _ => 0.5,
        }
    }
}

fn push_capped<T>(buf: &mut VecDeque<T>, value: T) {
    if buf.len() == HISTORY_CAP {
        buf.pop_front();
    }
    buf.push_back(value);
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// Stable per-algorithm code in [0, 1), derived from the algorithm name.
fn algorithm_code(algorithm: &str) -> f64 {
    let hash = blake3::hash(algorithm.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    (u64::from_le_bytes(bytes) >> 11) as f64 / (1u64 << 53) as f64
}

// ─── Feature engineer ────────────────────────────────────────────────

/// Builds feature vectors for an ordered trade sequence.
pub struct FeatureEngineer<'a> {
    context: &'a ContextStore,
    config: FeatureConfig,
}

impl<'a> FeatureEngineer<'a> {
    pub fn new(context: &'a ContextStore) -> Self {
        Self::with_config(context, FeatureConfig::default())
    }

    pub fn with_config(context: &'a ContextStore, config: FeatureConfig) -> Self {
        Self { context, config }
    }

    /// Build one result per trade, in input order.
    ///
    /// A trade that fails validation yields an error in its slot and is never
    /// added to the rolling history.
    pub fn build_all(&self, trades: &[TradeRecord]) -> Vec<Result<FeatureVector, FeatureError>> {
        let mut histories: HashMap<&str, AlgoHistory> = HashMap::new();
        let mut global_wins: VecDeque<bool> = VecDeque::new();
        // Earlier trades not yet closed, ordered by (exit_time, index).
        let mut pending: BinaryHeap<Reverse<(DateTime<Utc>, usize)>> = BinaryHeap::new();

        let mut out = Vec::with_capacity(trades.len());
        for (i, trade) in trades.iter().enumerate() {
            if let Err(e) = trade.validate() {
                out.push(Err(e));
                continue;
            }

            while let Some(Reverse((exit, idx))) = pending.peek().copied() {
                if exit > trade.entry_time {
                    break;
                }
                pending.pop();
                let closed = &trades[idx];
                histories
                    .entry(closed.algorithm.as_str())
                    .or_default()
                    .record(closed);
                if global_wins.len() == 20 {
                    global_wins.pop_front();
                }
                global_wins.push_back(closed.is_win());
            }

            let concurrent = pending
                .iter()
                .filter(|Reverse((_, idx))| trades[*idx].algorithm == trade.algorithm)
                .count();

            let empty = AlgoHistory::default();
            let history = histories.get(trade.algorithm.as_str()).unwrap_or(&empty);
            out.push(self.compose(trade, history, &global_wins, concurrent));

            pending.push(Reverse((trade.exit_time, i)));
        }
        out
    }

    fn compose(
        &self,
        trade: &TradeRecord,
        history: &AlgoHistory,
        global_wins: &VecDeque<bool>,
        concurrent: usize,
    ) -> Result<FeatureVector, FeatureError> {
        let regime = self.context.regime_before(trade.entry_time);
        let (vix, regime_score, trend, breadth, vol_pct, available) = match regime {
            Some(r) => (
                r.vix,
                r.regime_score,
                r.trend_strength,
                r.breadth,
                r.volatility_percentile,
                1.0,
            ),
            None => (self.config.default_vix, 0.0, 0.0, 0.5, 0.5, 0.0),
        };

        let recent_10 = history.recent_returns(10);
        let recent_20 = history.recent_returns(20);
        let std_20 = sample_std(&recent_20);
        let sharpe_20 = if std_20 > 1e-12 {
            mean(&recent_20) / std_20
        } else {
            0.0
        };
        let win_rate_20 = history.win_rate(20);

        let days_since = history
            .last_close
            .map(|t| ((trade.entry_time - t).num_seconds() as f64 / 86_400.0).clamp(0.0, DAYS_SINCE_CAP))
            .unwrap_or(DAYS_SINCE_CAP);

        let global_win_rate = if global_wins.is_empty() {
            0.5
        } else {
            global_wins.iter().filter(|w| **w).count() as f64 / global_wins.len() as f64
        };

        let strengths: Vec<f64> = history.strengths.iter().copied().collect();
        let strength_std = sample_std(&strengths);
        let strength_z = if strength_std > 1e-12 {
            (trade.signal_strength - mean(&strengths)) / strength_std
        } else {
            0.0
        };

        let sizes: Vec<f64> = history.sizes.iter().copied().collect();
        let mean_size = mean(&sizes);
        let size_ratio = if mean_size.abs() > 1e-12 {
            trade.position_size / mean_size
        } else {
            1.0
        };

        let entry = trade.entry_time;
        let direction = trade.direction.sign();

        let values: [f64; FEATURE_COUNT] = [
            algorithm_code(&trade.algorithm),
            trade.asset_class.code(),
            direction,
            trade.position_size.max(0.0).ln_1p(),
            (history.count as f64).ln_1p(),
            vix,
            regime_score,
            trend,
            breadth,
            vol_pct,
            available,
            history.win_rate(10),
            win_rate_20,
            history.win_rate(50),
            mean(&recent_10),
            mean(&recent_20),
            sharpe_20,
            std_20,
            history.streak as f64,
            days_since,
            history.symbol_win_rate(&trade.symbol),
            entry.weekday().num_days_from_monday() as f64,
            entry.month() as f64,
            entry.hour() as f64 + entry.minute() as f64 / 60.0,
            self.context.signals_before(&trade.algorithm, entry, 1) as f64,
            self.context.signals_before(&trade.algorithm, entry, 5) as f64,
            global_win_rate,
            trade.signal_strength,
            strength_z,
            size_ratio,
            concurrent as f64,
            trade.signal_strength * win_rate_20,
            direction * regime_score,
            vix * trade.signal_strength / 100.0,
            sharpe_20 * regime_score,
        ];

        if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
            return Err(FeatureError::NonFiniteFeature {
                name: FEATURE_NAMES[pos],
            });
        }

        Ok(FeatureVector {
            schema_version: FEATURE_SCHEMA_VERSION,
            values,
        })
    }
}

/// Split per-trade results into `(index, vector)` pairs, logging and
/// counting the trades that had to be skipped.
pub fn collect_valid(
    trades: &[TradeRecord],
    results: Vec<Result<FeatureVector, FeatureError>>,
) -> (Vec<(usize, FeatureVector)>, usize) {
    let mut valid = Vec::with_capacity(results.len());
    let mut skipped = 0;
    for (i, result) in results.into_iter().enumerate() {
        match result {
            Ok(v) => valid.push((i, v)),
            Err(e) => {
                skipped += 1;
                warn!(
                    index = i,
                    algorithm = trades.get(i).map(|t| t.algorithm.as_str()).unwrap_or(""),
                    error = %e,
                    "skipping trade: feature construction failed"
                );
            }
        }
    }
    debug!(valid = valid.len(), skipped, "feature construction complete");
    (valid, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trade::fixtures::trade;
    use crate::domain::RegimeSnapshot;
    use chrono::Duration;

    fn series(n: usize) -> Vec<TradeRecord> {
        (0..n)
            .map(|i| {
                let r = if i % 3 == 0 { -1.0 } else { 1.5 };
                trade(if i % 2 == 0 { "insider" } else { "momentum" }, i, r)
            })
            .collect()
    }

    #[test]
    fn names_match_count() {
        assert_eq!(FEATURE_NAMES.len(), FEATURE_COUNT);
        let mut names = FEATURE_NAMES.to_vec();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), FEATURE_COUNT, "feature names must be unique");
    }

    #[test]
    fn one_vector_per_trade() {
        let ctx = ContextStore::new();
        let trades = series(30);
        let out = FeatureEngineer::new(&ctx).build_all(&trades);
        assert_eq!(out.len(), 30);
        assert!(out.iter().all(|r| r.is_ok()));
    }

    #[test]
    fn first_trade_uses_neutral_defaults() {
        let ctx = ContextStore::new();
        let trades = series(1);
        let v = FeatureEngineer::new(&ctx).build_all(&trades)[0].clone().unwrap();
        assert_eq!(v.get("win_rate_20"), Some(0.5));
        assert_eq!(v.get("log_algo_trade_count"), Some(0.0));
        assert_eq!(v.get("regime_available"), Some(0.0));
        assert_eq!(v.get("days_since_last_close"), Some(DAYS_SINCE_CAP));
    }

    #[test]
    fn open_trades_are_not_yet_history() {
        // Trades exit two days after entry: trade 1 (entered day 1) cannot see
        // trade 0 (exits day 2) in its history.
        let ctx = ContextStore::new();
        let trades = vec![trade("a", 0, 5.0), trade("a", 1, 5.0), trade("a", 2, 5.0)];
        let out = FeatureEngineer::new(&ctx).build_all(&trades);
        let v1 = out[1].as_ref().unwrap();
        assert_eq!(v1.get("log_algo_trade_count"), Some(0.0));
        assert_eq!(v1.get("concurrent_open_trades"), Some(1.0));

        let v2 = out[2].as_ref().unwrap();
        assert!((v2.get("log_algo_trade_count").unwrap() - 1f64.ln_1p()).abs() < 1e-12);
        assert_eq!(v2.get("win_rate_10"), Some(1.0));
    }

    #[test]
    fn invalid_trade_yields_error_and_is_excluded() {
        let ctx = ContextStore::new();
        let mut trades = series(10);
        trades[3].exit_time = trades[3].entry_time - Duration::hours(1);
        let out = FeatureEngineer::new(&ctx).build_all(&trades);
        assert!(out[3].is_err());
        let (valid, skipped) = collect_valid(&trades, out);
        assert_eq!(skipped, 1);
        assert_eq!(valid.len(), 9);
        assert!(valid.iter().all(|(i, _)| *i != 3));
    }

    #[test]
    fn regime_features_read_prior_snapshot() {
        let mut ctx = ContextStore::new();
        let t = trade("a", 5, 1.0);
        ctx.insert_regime(RegimeSnapshot {
            date: t.entry_time.date_naive() - Duration::days(1),
            vix: 31.0,
            regime_score: -0.8,
            trend_strength: -0.05,
            breadth: 0.2,
            volatility_percentile: 0.9,
        });
        let v = FeatureEngineer::new(&ctx).build_all(&[t])[0].clone().unwrap();
        assert_eq!(v.get("vix"), Some(31.0));
        assert_eq!(v.get("regime_available"), Some(1.0));
        assert_eq!(v.get("regime_score"), Some(-0.8));
    }

    #[test]
    fn prefix_features_unchanged_by_later_trades() {
        let ctx = ContextStore::new();
        let trades = series(40);
        let full = FeatureEngineer::new(&ctx).build_all(&trades);
        let prefix = FeatureEngineer::new(&ctx).build_all(&trades[..25]);
        for i in 0..25 {
            assert_eq!(full[i], prefix[i], "trade {i} changed");
        }
    }

    #[test]
    fn algorithm_code_is_stable_and_bounded() {
        let a = algorithm_code("insider");
        assert_eq!(a, algorithm_code("insider"));
        assert!((0.0..1.0).contains(&a));
        assert_ne!(a, algorithm_code("momentum"));
    }

    #[test]
    fn streak_counts_consecutive_outcomes() {
        let mut h = AlgoHistory::default();
        for r in [1.0, 2.0, -1.0, -1.0, -3.0] {
            h.record(&trade("a", 0, r));
        }
        assert_eq!(h.streak, -3);
    }
}
