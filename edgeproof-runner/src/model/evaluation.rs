//! Binary classification metrics for meta-label predictions.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub sample_count: usize,
    pub predicted_positive: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Area under the ROC curve; 0.5 when only one class is present.
    pub auc: f64,
    pub accuracy: f64,
}

impl ClassificationMetrics {
    /// Score probabilities against labels at `threshold`.
    ///
    /// Precision is 0 when nothing is predicted positive.
    pub fn compute(probs: &[f64], labels: &[bool], threshold: f64) -> Self {
        let n = probs.len().min(labels.len());
        let (mut tp, mut fp, mut fn_, mut tn) = (0usize, 0usize, 0usize, 0usize);
        for (&p, &y) in probs.iter().zip(labels).take(n) {
            match (p >= threshold, y) {
                (true, true) => tp += 1,
                (true, false) => fp += 1,
                (false, true) => fn_ += 1,
                (false, false) => tn += 1,
            }
        }
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        Self {
            sample_count: n,
            predicted_positive: tp + fp,
            precision,
            recall,
            f1: f1_score(precision, recall),
            auc: roc_auc(&probs[..n], &labels[..n]),
            accuracy: ratio(tp + tn, n),
        }
    }

    pub fn empty() -> Self {
        Self {
            sample_count: 0,
            predicted_positive: 0,
            precision: 0.0,
            recall: 0.0,
            f1: 0.0,
            auc: 0.5,
            accuracy: 0.0,
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

pub fn f1_score(precision: f64, recall: f64) -> f64 {
    if precision + recall <= 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

/// ROC AUC via the rank-sum statistic, with average ranks for ties.
pub fn roc_auc(probs: &[f64], labels: &[bool]) -> f64 {
    let n_pos = labels.iter().filter(|&&y| y).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return 0.5;
    }

    let mut order: Vec<usize> = (0..probs.len()).collect();
    order.sort_by(|&a, &b| {
        probs[a]
            .partial_cmp(&probs[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut rank_sum_pos = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && probs[order[j + 1]] == probs[order[i]] {
            j += 1;
        }
        // 1-based ranks i+1..=j+1 share their mean.
        let avg_rank = (i + j + 2) as f64 / 2.0;
        for &k in &order[i..=j] {
            if labels[k] {
                rank_sum_pos += avg_rank;
            }
        }
        i = j + 1;
    }

    let u = rank_sum_pos - (n_pos * (n_pos + 1)) as f64 / 2.0;
    u / (n_pos * n_neg) as f64
}
