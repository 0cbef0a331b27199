//! Purged time-series splitter: leakage-safe train/test folds.
//!
//! Splits `n` chronologically ordered observations into `n_splits` test
//! blocks. Each fold trains on everything before its test block, minus a
//! purge window at the train/test boundary (trade holding periods overlap),
//! and starts testing only after an additional embargo gap.
//!
//! Layout of fold `i`:
//!
//! ```text
//! [0 ........ train_end) purge [test_start) embargo [test_start_actual ... test_end)
//! ```
//!
//! Folds that end up too small (train <= 10 or test <= 5 observations) are
//! skipped silently.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Minimum train length (exclusive) for a fold to be emitted.
pub const MIN_TRAIN_LEN: usize = 10;
/// Minimum test length (exclusive) for a fold to be emitted.
pub const MIN_TEST_LEN: usize = 5;

/// Splitter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitterConfig {
    /// Number of test blocks (default 5).
    pub n_splits: usize,
    /// Fraction of observations purged before each test block (default 0.02).
    pub purge_pct: f64,
    /// Fraction of observations embargoed at the start of each test block (default 0.01).
    pub embargo_pct: f64,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            n_splits: 5,
            purge_pct: 0.02,
            embargo_pct: 0.01,
        }
    }
}

/// One train/test fold. Both ranges are half-open index ranges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    pub fold_index: usize,
    pub train: Range<usize>,
    pub test: Range<usize>,
    pub purge_size: usize,
    pub embargo_size: usize,
}

impl Fold {
    pub fn train_indices(&self) -> Vec<usize> {
        self.train.clone().collect()
    }

    pub fn test_indices(&self) -> Vec<usize> {
        self.test.clone().collect()
    }

    pub fn train_len(&self) -> usize {
        self.train.len()
    }

    pub fn test_len(&self) -> usize {
        self.test.len()
    }

    /// Index positions between the last train and first test observation.
    pub fn gap(&self) -> usize {
        self.test.start.saturating_sub(self.train.end)
    }
}

/// Purged, embargoed walk-forward splitter.
#[derive(Debug, Clone)]
pub struct PurgedSplitter {
    config: SplitterConfig,
}

impl PurgedSplitter {
    pub fn new(config: SplitterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SplitterConfig {
        &self.config
    }

    /// `max(1, floor(n * purge_pct))`.
    pub fn purge_size(&self, n: usize) -> usize {
        ((n as f64 * self.config.purge_pct).floor() as usize).max(1)
    }

    /// `max(1, floor(n * embargo_pct))`.
    pub fn embargo_size(&self, n: usize) -> usize {
        ((n as f64 * self.config.embargo_pct).floor() as usize).max(1)
    }

    /// Produce up to `n_splits` folds over `n` observations.
    ///
    /// Deterministic: the same `n` and configuration always yield the same
    /// fold boundaries.
    pub fn split(&self, n: usize) -> Vec<Fold> {
        let n_splits = self.config.n_splits;
        if n_splits == 0 || n == 0 {
            return Vec::new();
        }

        let test_size = n / (n_splits + 1);
        let purge_size = self.purge_size(n);
        let embargo_size = self.embargo_size(n);

        let mut folds = Vec::with_capacity(n_splits);
        for i in 0..n_splits {
            let test_start = (i + 1) * test_size;
            let test_end = (test_start + test_size).min(n);
            let train_end = test_start.saturating_sub(purge_size);
            let test_start_actual = (test_start + embargo_size).min(test_end);

            let fold = Fold {
                fold_index: i,
                train: 0..train_end,
                test: test_start_actual..test_end,
                purge_size,
                embargo_size,
            };

            if fold.train_len() > MIN_TRAIN_LEN && fold.test_len() > MIN_TEST_LEN {
                folds.push(fold);
            } else {
                debug!(
                    fold = i,
                    train_len = fold.train_len(),
                    test_len = fold.test_len(),
                    "skipping undersized fold"
                );
            }
        }
        folds
    }
}

impl Default for PurgedSplitter {
    fn default() -> Self {
        Self::new(SplitterConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter(n_splits: usize, purge_pct: f64, embargo_pct: f64) -> PurgedSplitter {
        PurgedSplitter::new(SplitterConfig {
            n_splits,
            purge_pct,
            embargo_pct,
        })
    }

    #[test]
    fn reference_layout_n200() {
        let s = splitter(5, 0.02, 0.01);
        assert_eq!(s.purge_size(200), 4);
        assert_eq!(s.embargo_size(200), 2);

        let folds = s.split(200);
        assert_eq!(folds.len(), 5);

        assert_eq!(folds[0].train, 0..29);
        assert_eq!(folds[0].test, 35..66);

        assert_eq!(folds[4].fold_index, 4);
        assert_eq!(folds[4].train, 0..161);
        assert_eq!(folds[4].test, 167..198);
    }

    #[test]
    fn sizes_floor_at_one() {
        let s = splitter(5, 0.0, 0.0);
        assert_eq!(s.purge_size(50), 1);
        assert_eq!(s.embargo_size(50), 1);
    }

    #[test]
    fn small_folds_are_skipped_not_errors() {
        // n = 60, 5 splits → test_size 10, purge 1, embargo 1.
        // Fold 0: train [0, 9) has 9 obs → skipped.
        let folds = splitter(5, 0.02, 0.01).split(60);
        assert!(folds.iter().all(|f| f.fold_index != 0));
        assert!(folds.iter().all(|f| f.train_len() > MIN_TRAIN_LEN));
        assert!(folds.iter().all(|f| f.test_len() > MIN_TEST_LEN));
    }

    #[test]
    fn tiny_input_yields_no_folds() {
        assert!(splitter(5, 0.02, 0.01).split(12).is_empty());
        assert!(splitter(5, 0.02, 0.01).split(0).is_empty());
        assert!(splitter(0, 0.02, 0.01).split(500).is_empty());
    }

    #[test]
    fn gap_covers_purge_and_embargo() {
        let folds = splitter(4, 0.05, 0.03).split(400);
        assert!(!folds.is_empty());
        for f in &folds {
            assert!(f.gap() >= f.purge_size + f.embargo_size);
            assert!(f.train.end < f.test.start);
        }
    }

    #[test]
    fn indices_match_ranges() {
        let folds = splitter(5, 0.02, 0.01).split(200);
        let f = &folds[1];
        let train = f.train_indices();
        let test = f.test_indices();
        assert_eq!(train.len(), f.train_len());
        assert_eq!(*test.first().unwrap(), f.test.start);
        assert_eq!(*test.last().unwrap(), f.test.end - 1);
    }

    #[test]
    fn last_fold_clamped_to_n() {
        let folds = splitter(3, 0.01, 0.01).split(103);
        for f in &folds {
            assert!(f.test.end <= 103);
        }
    }
}
