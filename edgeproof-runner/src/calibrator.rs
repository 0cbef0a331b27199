//! Per-algorithm probability cutoffs for acting on meta-label scores.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::artifact::{ensure_parent, ArtifactError};
use crate::model::evaluation::f1_score;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Most recent scored trades considered per algorithm.
    pub window: usize,
    pub min_samples: usize,
    pub recall_floor: f64,
    pub grid_start: f64,
    pub grid_end: f64,
    pub grid_step: f64,
    /// Fallback cutoff for algorithms winning less than half the time.
    pub strict_cutoff: f64,
    pub base_cutoff: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            window: 500,
            min_samples: 5,
            recall_floor: 0.30,
            grid_start: 0.45,
            grid_end: 0.85,
            grid_step: 0.05,
            strict_cutoff: 0.70,
            base_cutoff: 0.60,
        }
    }
}

impl CalibrationConfig {
    pub fn grid(&self) -> Vec<f64> {
        if self.grid_step <= 0.0 || self.grid_end < self.grid_start {
            return Vec::new();
        }
        let steps = ((self.grid_end - self.grid_start) / self.grid_step + 1e-9).floor() as usize;
        (0..=steps)
            .map(|k| ((self.grid_start + k as f64 * self.grid_step) * 1e6).round() / 1e6)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdEntry {
    pub threshold: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Unfiltered win rate over the window.
    pub win_rate: f64,
    pub sample_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdTable {
    pub entries: BTreeMap<String, ThresholdEntry>,
}

impl ThresholdTable {
    pub fn get(&self, algorithm: &str) -> Option<&ThresholdEntry> {
        self.entries.get(algorithm)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn save(&self, path: &Path) -> Result<(), ArtifactError> {
        let json = serde_json::to_vec_pretty(self)?;
        ensure_parent(path)?;
        std::fs::write(path, json).map_err(|source| ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), algorithms = self.len(), "threshold table written");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let bytes = std::fs::read(path).map_err(|source| ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| ArtifactError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// One scored, closed trade.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredTrade {
    pub algorithm: String,
    pub probability: f64,
    pub win: bool,
}

fn evaluate_at(samples: &[&ScoredTrade], threshold: f64, win_rate: f64) -> ThresholdEntry {
    let passing: Vec<_> = samples.iter().filter(|s| s.probability >= threshold).collect();
    let recall = passing.len() as f64 / samples.len() as f64;
    let precision = if passing.is_empty() {
        0.0
    } else {
        passing.iter().filter(|s| s.win).count() as f64 / passing.len() as f64
    };
    ThresholdEntry {
        threshold,
        precision,
        recall,
        f1: f1_score(precision, recall),
        win_rate,
        sample_count: samples.len(),
    }
}

/// Calibrate cutoffs per algorithm. `scored` must be in chronological order.
pub fn calibrate(scored: &[ScoredTrade], config: &CalibrationConfig) -> ThresholdTable {
    let mut by_algo: BTreeMap<&str, Vec<&ScoredTrade>> = BTreeMap::new();
    for s in scored {
        by_algo.entry(s.algorithm.as_str()).or_default().push(s);
    }

    let grid = config.grid();
    let mut table = ThresholdTable::default();
    for (algorithm, all) in by_algo {
        let recent = &all[all.len().saturating_sub(config.window)..];
        if recent.len() < config.min_samples {
            debug!(algorithm, samples = recent.len(), "too few scored trades to calibrate");
            continue;
        }
        let win_rate = recent.iter().filter(|s| s.win).count() as f64 / recent.len() as f64;
        let fallback = if win_rate < 0.5 {
            config.strict_cutoff
        } else {
            config.base_cutoff
        };

        let best = grid
            .iter()
            .map(|&t| evaluate_at(recent, t, win_rate))
            .filter(|e| e.recall >= config.recall_floor)
            .fold(None::<ThresholdEntry>, |best, e| match best {
                Some(b) if b.f1 >= e.f1 => Some(b),
                _ => Some(e),
            });

        let entry = best.unwrap_or_else(|| evaluate_at(recent, fallback, win_rate));
        debug!(algorithm, threshold = entry.threshold, f1 = entry.f1, "calibrated");
        table.entries.insert(algorithm.to_string(), entry);
    }
    table
}
