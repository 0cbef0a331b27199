//! Additive ensemble of regression trees on the log-odds scale.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tree::{RegressionTree, TreeParams};
use super::ModelError;

/// One boosting round: a tree and the shrinkage it was added with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostedTree {
    pub learning_rate: f64,
    pub tree: RegressionTree,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostedEnsemble {
    /// Initial log-odds before any tree contributes.
    pub base_score: f64,
    pub n_features: usize,
    pub trees: Vec<BoostedTree>,
}

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl BoostedEnsemble {
    /// Empty ensemble whose prior matches the label balance.
    pub fn with_prior(n_features: usize, labels: &[bool]) -> Self {
        let p = if labels.is_empty() {
            0.5
        } else {
            labels.iter().filter(|&&y| y).count() as f64 / labels.len() as f64
        };
        let p = p.clamp(0.01, 0.99);
        Self {
            base_score: (p / (1.0 - p)).ln(),
            n_features,
            trees: Vec::new(),
        }
    }

    pub fn round_count(&self) -> usize {
        self.trees.len()
    }

    pub fn margin(&self, x: &[f64]) -> f64 {
        self.base_score
            + self
                .trees
                .iter()
                .map(|t| t.learning_rate * t.tree.predict(x))
                .sum::<f64>()
    }

    /// Probability that the trade closes as a win.
    pub fn predict_proba(&self, x: &[f64]) -> f64 {
        sigmoid(self.margin(x))
    }

    pub fn predict_batch(&self, rows: &[&[f64]]) -> Vec<f64> {
        rows.iter().map(|x| self.predict_proba(x)).collect()
    }

    /// Append `rounds` trees fit to the logistic-loss gradients of the
    /// current ensemble.
    pub fn boost(
        &mut self,
        rows: &[&[f64]],
        labels: &[bool],
        rounds: usize,
        learning_rate: f64,
        params: &TreeParams,
    ) -> Result<(), ModelError> {
        if rows.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        if rows.len() != labels.len() {
            return Err(ModelError::LengthMismatch {
                features: rows.len(),
                labels: labels.len(),
            });
        }
        if let Some(bad) = rows.iter().find(|r| r.len() != self.n_features) {
            return Err(ModelError::WidthMismatch {
                expected: self.n_features,
                found: bad.len(),
            });
        }
        if !(learning_rate > 0.0 && learning_rate <= 1.0) {
            return Err(ModelError::InvalidParams(format!(
                "learning_rate must be in (0, 1], got {learning_rate}"
            )));
        }

        let targets: Vec<f64> = labels.iter().map(|&y| if y { 1.0 } else { 0.0 }).collect();
        let mut margins: Vec<f64> = rows.iter().map(|x| self.margin(x)).collect();
        let mut grad = vec![0.0; rows.len()];
        let mut hess = vec![0.0; rows.len()];

        for round in 0..rounds {
            for i in 0..rows.len() {
                let p = sigmoid(margins[i]);
                grad[i] = p - targets[i];
                hess[i] = (p * (1.0 - p)).max(1e-12);
            }
            let tree = RegressionTree::fit(rows, &grad, &hess, params)?;
            for (m, x) in margins.iter_mut().zip(rows) {
                *m += learning_rate * tree.predict(x);
            }
            if tree.node_count() == 1 {
                debug!(round, "boosting round found no useful split");
            }
            self.trees.push(BoostedTree {
                learning_rate,
                tree,
            });
        }
        Ok(())
    }

    /// Mean logistic loss over `rows`.
    pub fn log_loss(&self, rows: &[&[f64]], labels: &[bool]) -> f64 {
        if rows.is_empty() {
            return 0.0;
        }
        let eps = 1e-15;
        let total: f64 = rows
            .iter()
            .zip(labels)
            .map(|(x, &y)| {
                let p = self.predict_proba(x).clamp(eps, 1.0 - eps);
                if y {
                    -p.ln()
                } else {
                    -(1.0 - p).ln()
                }
            })
            .sum();
        total / rows.len() as f64
    }
}
