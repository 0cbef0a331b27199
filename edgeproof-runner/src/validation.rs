//! Full validation pass over a trade population.
//!
//! Produces one [`ValidationReport`]:
//! - overall and per-algorithm performance
//! - purged walk-forward folds, each training a cold-start meta-label model
//!   on the train range and filtering the test range with it
//! - one-sided t-test on the fold-level filtered Sharpe ratios
//! - deflated Sharpe of the best algorithm
//! - Monte Carlo trade-order robustness
//! - alpha decay per algorithm
//! - checklist and verdict
//!
//! Statistical shortfalls are data in the report, not errors.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use edgeproof_core::metrics::{kurtosis, mean, sharpe_ratio, skewness, win_rate};
use edgeproof_core::stats::one_sided_t_test;
use edgeproof_core::{
    collect_valid, ContextStore, DeflatedSharpe, FeatureEngineer, FeatureVector, Fold, PerformanceSummary,
    PurgedSplitter, SplitterConfig, TTestResult, TradeRecord,
};

use crate::config::EdgeproofConfig;
use crate::decay::{AlgoDecay, DecayMonitor, DecayStatus};
use crate::model::training::score;
use crate::model::{ClassificationMetrics, ColdStart, TrainingConfig, TrainingStrategy};
use crate::monte_carlo::{MonteCarloOutcome, MonteCarloSimulator};

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("write report to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

// ─── Configuration ───────────────────────────────────────────────────

/// `[validation]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    #[serde(flatten)]
    pub splitter: SplitterConfig,
    pub periods_per_year: f64,
    pub risk_free_rate: f64,
    /// Below this many trades the verdict is `InsufficientData`.
    pub min_trades: usize,
    /// Algorithms need this many trades to compete for the deflated Sharpe.
    pub min_trades_per_algorithm: usize,
    /// Number of trials for deflation; defaults to the competing algorithm count.
    pub n_trials: Option<usize>,
    pub min_sharpe: f64,
    pub dsr_threshold: f64,
    pub mc_positive_fraction: f64,
    /// Upper confidence bound allowed on simulated max drawdown.
    pub mc_max_drawdown: f64,
    pub min_folds: usize,
    /// Meta-label cutoff applied to fold test trades.
    pub decision_threshold: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            splitter: SplitterConfig::default(),
            periods_per_year: 252.0,
            risk_free_rate: 0.0,
            min_trades: 100,
            min_trades_per_algorithm: 20,
            n_trials: None,
            min_sharpe: 1.0,
            dsr_threshold: 0.5,
            mc_positive_fraction: 0.95,
            mc_max_drawdown: 0.5,
            min_folds: 3,
            decision_threshold: 0.5,
        }
    }
}

// ─── Result types ────────────────────────────────────────────────────

/// Compact metrics for a slice of trades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceMetrics {
    pub trade_count: usize,
    pub sharpe: f64,
    pub win_rate: f64,
    pub mean_return: f64,
}

impl SliceMetrics {
    fn compute(returns: &[f64], config: &ValidationConfig) -> Self {
        Self {
            trade_count: returns.len(),
            sharpe: sharpe_ratio(returns, config.risk_free_rate, config.periods_per_year),
            win_rate: win_rate(returns),
            mean_return: mean(returns),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldReport {
    pub fold: Fold,
    /// All test trades.
    pub baseline: SliceMetrics,
    /// Test trades the fold's model scored at or above the cutoff.
    pub filtered: SliceMetrics,
    /// `None` when the fold had no usable train or test vectors.
    pub classification: Option<ClassificationMetrics>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Sound,
    NotSound,
    InsufficientData,
}

impl Verdict {
    pub fn is_sound(self) -> bool {
        self == Verdict::Sound
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checklist {
    pub items: Vec<ChecklistItem>,
}

impl Checklist {
    pub fn passed_count(&self) -> usize {
        self.items.iter().filter(|i| i.passed).count()
    }

    pub fn item(&self, name: &str) -> Option<&ChecklistItem> {
        self.items.iter().find(|i| i.name == name)
    }

    fn passed(&self, name: &str) -> bool {
        self.item(name).is_some_and(|i| i.passed)
    }

    fn push(&mut self, name: &str, passed: bool, detail: String) {
        self.items.push(ChecklistItem {
            name: name.to_string(),
            passed,
            detail,
        });
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub generated_at: DateTime<Utc>,
    /// Trades that passed record validation; every metric uses only these.
    pub trade_count: usize,
    /// Trades dropped for breaking record invariants.
    pub invalid_trades: usize,
    /// Valid trades without a usable feature vector.
    pub feature_skipped: usize,
    pub overall: PerformanceSummary,
    pub per_algorithm: BTreeMap<String, PerformanceSummary>,
    pub folds: Vec<FoldReport>,
    pub fold_t_test: Option<TTestResult>,
    pub best_algorithm: Option<String>,
    pub deflated_sharpe: Option<DeflatedSharpe>,
    pub monte_carlo: MonteCarloOutcome,
    pub decay: Vec<AlgoDecay>,
    pub checklist: Checklist,
    pub verdict: Verdict,
}

impl ValidationReport {
    /// Write as pretty JSON into `dir`, returning the file path.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, ValidationError> {
        std::fs::create_dir_all(dir).map_err(|source| ValidationError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = dir.join(format!("validation_{}.json", self.generated_at.format("%Y%m%d_%H%M%S")));
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).map_err(|source| ValidationError::Io {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), "validation report written");
        Ok(path)
    }
}

// ─── Pipeline ────────────────────────────────────────────────────────

pub fn run_validation(
    trades: &[TradeRecord],
    context: &ContextStore,
    config: &EdgeproofConfig,
    now: DateTime<Utc>,
) -> ValidationReport {
    let vcfg = &config.validation;
    let mut invalid_trades = 0;
    let mut trades: Vec<TradeRecord> = trades
        .iter()
        .filter(|t| match t.validate() {
            Ok(()) => true,
            Err(e) => {
                invalid_trades += 1;
                warn!(algorithm = %t.algorithm, symbol = %t.symbol, error = %e, "skipping invalid trade");
                false
            }
        })
        .cloned()
        .collect();
    trades.sort_by_key(|t| t.entry_time);
    let returns: Vec<f64> = trades.iter().map(|t| t.fractional_return()).collect();
    info!(trades = trades.len(), invalid = invalid_trades, "validation started");

    let overall = PerformanceSummary::compute(&returns, vcfg.risk_free_rate, vcfg.periods_per_year);

    let mut by_algo: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for t in &trades {
        by_algo.entry(t.algorithm.clone()).or_default().push(t.fractional_return());
    }
    let per_algorithm = by_algo
        .iter()
        .map(|(algo, r)| {
            (
                algo.clone(),
                PerformanceSummary::compute(r, vcfg.risk_free_rate, vcfg.periods_per_year),
            )
        })
        .collect();

    // Features are built once over the whole series; each is causal.
    let engineer = FeatureEngineer::new(context);
    let (valid, feature_skipped) = collect_valid(&trades, engineer.build_all(&trades));
    let mut vectors: Vec<Option<FeatureVector>> = vec![None; trades.len()];
    for (i, v) in valid {
        vectors[i] = Some(v);
    }

    let splitter = PurgedSplitter::new(vcfg.splitter.clone());
    let folds: Vec<FoldReport> = splitter
        .split(trades.len())
        .into_par_iter()
        .map(|fold| evaluate_fold(fold, &trades, &returns, &vectors, vcfg, &config.training))
        .collect();
    info!(folds = folds.len(), "walk-forward folds evaluated");

    let filtered_sharpes: Vec<f64> = folds
        .iter()
        .filter(|f| f.classification.is_some())
        .map(|f| f.filtered.sharpe)
        .collect();
    let fold_t_test = one_sided_t_test(&filtered_sharpes);

    let (best_algorithm, deflated_sharpe) = best_deflated(&by_algo, vcfg);

    let monte_carlo = MonteCarloSimulator::new(config.monte_carlo.clone()).run(&returns, vcfg.periods_per_year);
    let decay = DecayMonitor::new(config.decay.clone(), vcfg.periods_per_year).assess_all(&trades);

    let checklist = build_checklist(
        trades.len(),
        &overall,
        &folds,
        deflated_sharpe.as_ref(),
        &monte_carlo,
        &decay,
        vcfg,
    );
    let verdict = if !checklist.passed("sufficient_sample") {
        Verdict::InsufficientData
    } else if checklist.passed("deflated_sharpe") && checklist.passed("monte_carlo") {
        Verdict::Sound
    } else {
        Verdict::NotSound
    };
    info!(
        ?verdict,
        passed = checklist.passed_count(),
        total = checklist.items.len(),
        "validation complete"
    );

    ValidationReport {
        generated_at: now,
        trade_count: trades.len(),
        invalid_trades,
        feature_skipped,
        overall,
        per_algorithm,
        folds,
        fold_t_test,
        best_algorithm,
        deflated_sharpe,
        monte_carlo,
        decay,
        checklist,
        verdict,
    }
}

fn evaluate_fold(
    fold: Fold,
    trades: &[TradeRecord],
    returns: &[f64],
    vectors: &[Option<FeatureVector>],
    vcfg: &ValidationConfig,
    training: &TrainingConfig,
) -> FoldReport {
    let baseline = SliceMetrics::compute(&returns[fold.test.clone()], vcfg);

    let pick = |range: std::ops::Range<usize>| -> (Vec<usize>, Vec<FeatureVector>) {
        range
            .filter_map(|i| vectors[i].clone().map(|v| (i, v)))
            .unzip()
    };
    let (train_idx, train_x) = pick(fold.train.clone());
    let (test_idx, test_x) = pick(fold.test.clone());

    let empty = SliceMetrics::compute(&[], vcfg);
    if train_x.is_empty() || test_x.is_empty() {
        debug!(fold = fold.fold_index, "fold has no usable vectors");
        return FoldReport {
            fold,
            baseline,
            filtered: empty,
            classification: None,
        };
    }

    let train_y: Vec<bool> = train_idx.iter().map(|&i| trades[i].is_win()).collect();
    let test_y: Vec<bool> = test_idx.iter().map(|&i| trades[i].is_win()).collect();
    let strategy = ColdStart::new(training.cold.clone(), training.tree.clone());
    let model = match strategy.train(&train_x, &train_y) {
        Ok(m) => m,
        Err(e) => {
            debug!(fold = fold.fold_index, error = %e, "fold model training failed");
            return FoldReport {
                fold,
                baseline,
                filtered: empty,
                classification: None,
            };
        }
    };

    let probs = score(&model, &test_x);
    let kept: Vec<f64> = test_idx
        .iter()
        .zip(&probs)
        .filter(|(_, &p)| p >= vcfg.decision_threshold)
        .map(|(&i, _)| returns[i])
        .collect();
    let classification = ClassificationMetrics::compute(&probs, &test_y, vcfg.decision_threshold);
    debug!(
        fold = fold.fold_index,
        kept = kept.len(),
        test = test_idx.len(),
        auc = classification.auc,
        "fold evaluated"
    );

    FoldReport {
        fold,
        baseline,
        filtered: SliceMetrics::compute(&kept, vcfg),
        classification: Some(classification),
    }
}

/// Deflated Sharpe of the highest per-trade Sharpe among qualifying algorithms.
fn best_deflated(
    by_algo: &BTreeMap<String, Vec<f64>>,
    vcfg: &ValidationConfig,
) -> (Option<String>, Option<DeflatedSharpe>) {
    let candidates: Vec<(&String, &Vec<f64>, f64)> = by_algo
        .iter()
        .filter(|(_, r)| r.len() >= vcfg.min_trades_per_algorithm)
        .map(|(a, r)| (a, r, sharpe_ratio(r, 0.0, 1.0)))
        .collect();

    let Some((algo, returns, sr)) = candidates
        .iter()
        .copied()
        .reduce(|best, c| if c.2 > best.2 { c } else { best })
    else {
        return (None, None);
    };

    let n_trials = vcfg.n_trials.unwrap_or(candidates.len());
    let dsr = DeflatedSharpe::compute(sr, n_trials, returns.len(), skewness(returns), kurtosis(returns));
    info!(
        algorithm = %algo,
        sharpe = sr,
        n_trials,
        probability = dsr.probability,
        "deflated sharpe computed"
    );
    (Some(algo.clone()), Some(dsr))
}

fn build_checklist(
    trade_count: usize,
    overall: &PerformanceSummary,
    folds: &[FoldReport],
    dsr: Option<&DeflatedSharpe>,
    monte_carlo: &MonteCarloOutcome,
    decay: &[AlgoDecay],
    vcfg: &ValidationConfig,
) -> Checklist {
    let mut c = Checklist { items: Vec::new() };

    c.push(
        "sufficient_sample",
        trade_count >= vcfg.min_trades,
        format!("{trade_count} trades (minimum {})", vcfg.min_trades),
    );

    let scored: Vec<&FoldReport> = folds.iter().filter(|f| f.classification.is_some()).collect();
    let edge_folds = scored
        .iter()
        .filter(|f| f.filtered.trade_count > 0 && f.filtered.win_rate > f.baseline.win_rate)
        .count();
    c.push(
        "purged_cv_edge",
        !scored.is_empty() && edge_folds * 2 > scored.len(),
        format!("filter beat baseline win rate in {edge_folds}/{} folds", scored.len()),
    );

    match dsr {
        Some(d) => c.push(
            "deflated_sharpe",
            d.probability > vcfg.dsr_threshold,
            format!("probability {:.3} over {} trials", d.probability, d.n_trials),
        ),
        None => c.push(
            "deflated_sharpe",
            false,
            format!("no algorithm with {} trades", vcfg.min_trades_per_algorithm),
        ),
    }

    // Permutation leaves Sharpe fixed, so the positive fraction is 0 or 1 in
    // that mode; the drawdown bound is what varies across orderings.
    match monte_carlo {
        MonteCarloOutcome::Completed(s) => c.push(
            "monte_carlo",
            s.positive_sharpe_fraction >= vcfg.mc_positive_fraction
                && s.max_drawdown.upper <= vcfg.mc_max_drawdown,
            format!(
                "{:.1}% of {} simulations with positive Sharpe, drawdown upper bound {:.1}% (limit {:.1}%)",
                s.positive_sharpe_fraction * 100.0,
                s.n_simulations,
                s.max_drawdown.upper * 100.0,
                vcfg.mc_max_drawdown * 100.0
            ),
        ),
        MonteCarloOutcome::Insufficient { sample_size } => {
            c.push("monte_carlo", false, format!("insufficient sample ({sample_size})"))
        }
    }

    c.push(
        "min_sharpe",
        overall.sharpe >= vcfg.min_sharpe,
        format!("Sharpe {:.2} (minimum {:.2})", overall.sharpe, vcfg.min_sharpe),
    );

    let reducing: Vec<&str> = decay
        .iter()
        .filter(|d| d.status == DecayStatus::ReduceWeight)
        .map(|d| d.algorithm.as_str())
        .collect();
    c.push(
        "no_decay",
        reducing.is_empty(),
        if reducing.is_empty() {
            format!("{} algorithms assessed", decay.len())
        } else {
            format!("reduce weight: {}", reducing.join(", "))
        },
    );

    c.push(
        "fold_count",
        folds.len() >= vcfg.min_folds,
        format!("{} folds (minimum {})", folds.len(), vcfg.min_folds),
    );

    c
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monte_carlo::MonteCarloConfig;
    use chrono::{Duration, TimeZone};
    use edgeproof_core::{AssetClass, Direction};

    fn trades(n: usize, edge: f64) -> Vec<TradeRecord> {
        let base = Utc.with_ymd_and_hms(2023, 1, 2, 14, 30, 0).unwrap();
        (0..n)
            .map(|i| {
                let entry = base + Duration::hours(20 * i as i64);
                let noise = ((i * 37 % 11) as f64 - 5.0) * 0.6;
                TradeRecord {
                    algorithm: ["alpha", "beta"][i % 2].to_string(),
                    symbol: format!("S{}", i % 4),
                    asset_class: AssetClass::Equity,
                    direction: if i % 4 == 0 { Direction::Short } else { Direction::Long },
                    entry_time: entry,
                    exit_time: entry + Duration::hours(10),
                    return_pct: edge + noise,
                    position_size: 1000.0,
                    signal_strength: ((i * 13) % 10) as f64 / 10.0,
                }
            })
            .collect()
    }

    fn fast_config() -> EdgeproofConfig {
        let mut config = EdgeproofConfig::default();
        config.monte_carlo = MonteCarloConfig {
            n_simulations: 100,
            ..Default::default()
        };
        config.training.cold.rounds = 10;
        config
    }

    #[test]
    fn small_population_is_insufficient() {
        let report = run_validation(&trades(30, 1.0), &ContextStore::new(), &fast_config(), Utc::now());
        assert_eq!(report.verdict, Verdict::InsufficientData);
        assert!(!report.checklist.passed("sufficient_sample"));
    }

    #[test]
    fn strong_edge_is_sound() {
        let report = run_validation(&trades(240, 4.0), &ContextStore::new(), &fast_config(), Utc::now());
        assert_eq!(report.trade_count, 240);
        assert_eq!(report.folds.len(), 5);
        assert!(report.deflated_sharpe.as_ref().unwrap().probability > 0.5);
        assert_eq!(report.monte_carlo.summary().unwrap().positive_sharpe_fraction, 1.0);
        assert_eq!(report.verdict, Verdict::Sound);
    }

    #[test]
    fn losing_population_is_not_sound() {
        let report = run_validation(&trades(240, -2.0), &ContextStore::new(), &fast_config(), Utc::now());
        assert_eq!(report.verdict, Verdict::NotSound);
        assert!(!report.checklist.passed("min_sharpe"));
    }

    #[test]
    fn invalid_trades_are_dropped_before_any_metric() {
        let mut population = trades(240, 4.0);
        population[100].return_pct = f64::NAN;
        population[150].exit_time = population[150].entry_time;

        let report = run_validation(&population, &ContextStore::new(), &fast_config(), Utc::now());
        assert_eq!(report.invalid_trades, 2);
        assert_eq!(report.trade_count, 238);
        assert_eq!(report.feature_skipped, 0);
        assert!(report.overall.sharpe.is_finite());
        assert!(report.per_algorithm.values().all(|s| s.sharpe.is_finite()));
        assert!(report.deflated_sharpe.as_ref().unwrap().probability.is_finite());
        assert_eq!(report.verdict, Verdict::Sound);
    }

    #[test]
    fn deep_simulated_drawdown_fails_monte_carlo_check() {
        let mut config = fast_config();
        config.validation.mc_max_drawdown = 0.01;
        let report = run_validation(&trades(240, 1.0), &ContextStore::new(), &config, Utc::now());
        let mc = report.monte_carlo.summary().unwrap();
        assert_eq!(mc.positive_sharpe_fraction, 1.0);
        assert!(mc.max_drawdown.upper > 0.01);
        assert!(!report.checklist.passed("monte_carlo"));
        assert_ne!(report.verdict, Verdict::Sound);
    }

    #[test]
    fn report_is_written_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let report = run_validation(&trades(120, 1.0), &ContextStore::new(), &fast_config(), now);
        let path = report.write_to(dir.path()).unwrap();
        assert!(path.ends_with("validation_20240601_120000.json"));
        let back: ValidationReport = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(back.verdict, report.verdict);
        assert_eq!(back.folds.len(), report.folds.len());
    }
}
