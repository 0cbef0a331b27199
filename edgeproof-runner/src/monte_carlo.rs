//! Monte Carlo robustness: trade-order resampling of a return series.
//!
//! Each simulation reorders (or, in bootstrap mode, resamples) the realized
//! per-trade returns and recomputes Sharpe, max drawdown and terminal PnL.
//! Under pure permutation Sharpe and terminal PnL are order-invariant, so the
//! informative output is the drawdown distribution: how bad the path could
//! have been with the same trades in a different order.
//!
//! Simulation `k` draws from its own RNG derived from `(seed, k)`, so results
//! do not depend on how many simulations run.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use edgeproof_core::metrics::{max_drawdown, mean, percentile_sorted, sharpe_ratio, std_dev, total_return};
use edgeproof_core::SeedHierarchy;

/// Fewer returns than this are reported as insufficient.
pub const MIN_MC_SAMPLES: usize = 20;

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResampleMode {
    /// Shuffle order, magnitudes fixed.
    #[default]
    Permutation,
    /// Draw with replacement.
    Bootstrap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonteCarloConfig {
    pub n_simulations: usize,
    /// Two-sided confidence level for the reported bounds.
    pub confidence: f64,
    pub seed: u64,
    pub mode: ResampleMode,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            n_simulations: 1000,
            confidence: 0.95,
            seed: 42,
            mode: ResampleMode::Permutation,
        }
    }
}

// ─── Result types ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDistribution {
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub lower: f64,
    pub upper: f64,
}

impl MetricDistribution {
    fn from_samples(mut samples: Vec<f64>, confidence: f64) -> Self {
        samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let tail = (1.0 - confidence) / 2.0 * 100.0;
        Self {
            mean: mean(&samples),
            median: percentile_sorted(&samples, 50.0),
            std: std_dev(&samples),
            lower: percentile_sorted(&samples, tail),
            upper: percentile_sorted(&samples, 100.0 - tail),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MonteCarloOutcome {
    Insufficient {
        sample_size: usize,
    },
    Completed(MonteCarloSummary),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloSummary {
    pub sample_size: usize,
    pub n_simulations: usize,
    pub confidence: f64,
    pub mode: ResampleMode,
    pub seed: u64,
    pub sharpe: MetricDistribution,
    pub max_drawdown: MetricDistribution,
    pub terminal_pnl: MetricDistribution,
    /// Fraction of simulations with Sharpe > 0.
    pub positive_sharpe_fraction: f64,
    /// Fraction of simulations with terminal PnL > 0.
    pub positive_pnl_fraction: f64,
}

impl MonteCarloOutcome {
    pub fn summary(&self) -> Option<&MonteCarloSummary> {
        match self {
            Self::Completed(s) => Some(s),
            Self::Insufficient { .. } => None,
        }
    }
}

// ─── Simulation ──────────────────────────────────────────────────────

pub struct MonteCarloSimulator {
    config: MonteCarloConfig,
    seeds: SeedHierarchy,
}

impl MonteCarloSimulator {
    pub fn new(config: MonteCarloConfig) -> Self {
        let seeds = SeedHierarchy::new(config.seed);
        Self { config, seeds }
    }

    pub fn config(&self) -> &MonteCarloConfig {
        &self.config
    }

    /// Simulate `returns` (fractional, chronological).
    pub fn run(&self, returns: &[f64], periods_per_year: f64) -> MonteCarloOutcome {
        if returns.len() < MIN_MC_SAMPLES || self.config.n_simulations == 0 {
            debug!(sample_size = returns.len(), "monte carlo skipped: insufficient returns");
            return MonteCarloOutcome::Insufficient {
                sample_size: returns.len(),
            };
        }

        let n_sims = self.config.n_simulations;
        let mut sharpes = Vec::with_capacity(n_sims);
        let mut drawdowns = Vec::with_capacity(n_sims);
        let mut pnls = Vec::with_capacity(n_sims);
        let mut path = returns.to_vec();

        for k in 0..n_sims {
            let mut rng = self.seeds.rng_for("monte_carlo", k as u64);
            match self.config.mode {
                ResampleMode::Permutation => {
                    path.copy_from_slice(returns);
                    path.shuffle(&mut rng);
                }
                ResampleMode::Bootstrap => {
                    for slot in path.iter_mut() {
                        *slot = returns[rng.gen_range(0..returns.len())];
                    }
                }
            }
            sharpes.push(sharpe_ratio(&path, 0.0, periods_per_year));
            drawdowns.push(max_drawdown(&path));
            pnls.push(total_return(&path));
        }

        let positive_sharpe_fraction = sharpes.iter().filter(|&&s| s > 0.0).count() as f64 / n_sims as f64;
        let positive_pnl_fraction = pnls.iter().filter(|&&p| p > 0.0).count() as f64 / n_sims as f64;
        let confidence = self.config.confidence;

        let summary = MonteCarloSummary {
            sample_size: returns.len(),
            n_simulations: n_sims,
            confidence,
            mode: self.config.mode,
            seed: self.config.seed,
            sharpe: MetricDistribution::from_samples(sharpes, confidence),
            max_drawdown: MetricDistribution::from_samples(drawdowns, confidence),
            terminal_pnl: MetricDistribution::from_samples(pnls, confidence),
            positive_sharpe_fraction,
            positive_pnl_fraction,
        };
        info!(
            simulations = n_sims,
            mode = ?summary.mode,
            positive_sharpe = summary.positive_sharpe_fraction,
            drawdown_upper = summary.max_drawdown.upper,
            "monte carlo complete"
        );
        MonteCarloOutcome::Completed(summary)
    }
}
