//! Second-order regression tree used as the weak learner of the ensemble.
//!
//! Trees are fit to per-sample gradients and hessians of the logistic loss.
//! Leaf weight is `-G / (H + lambda)`, split gain is the usual
//! `GL²/(HL+λ) + GR²/(HR+λ) - G²/(H+λ)` (halved). Split search runs over
//! features in parallel; ties are broken by the lower feature index so the
//! fitted tree does not depend on thread scheduling.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::ModelError;

/// Tree growth limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeParams {
    pub max_depth: usize,
    /// Minimum hessian sum on each side of a split.
    pub min_child_weight: f64,
    /// Minimum samples on each side of a split.
    pub min_samples_leaf: usize,
    /// L2 regularization on leaf weights.
    pub lambda: f64,
    /// Minimum gain for a split to be kept.
    pub min_gain: f64,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 3,
            min_child_weight: 1.0,
            min_samples_leaf: 3,
            lambda: 1.0,
            min_gain: 1e-6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl SplitCandidate {
    fn better(self, other: Self) -> Self {
        if self.gain > other.gain || (self.gain == other.gain && self.feature < other.feature) {
            self
        } else {
            other
        }
    }
}

impl RegressionTree {
    /// Fit a tree to gradients/hessians over the rows of `features`.
    pub fn fit(
        features: &[&[f64]],
        grad: &[f64],
        hess: &[f64],
        params: &TreeParams,
    ) -> Result<Self, ModelError> {
        if features.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        if features.len() != grad.len() || grad.len() != hess.len() {
            return Err(ModelError::LengthMismatch {
                features: features.len(),
                labels: grad.len(),
            });
        }
        let mut tree = Self { nodes: Vec::new() };
        let rows: Vec<usize> = (0..features.len()).collect();
        tree.grow(features, grad, hess, params, rows, 0);
        Ok(tree)
    }

    pub fn predict(&self, x: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes.get(idx) {
                Some(Node::Leaf { value }) => return *value,
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let v = x.get(*feature).copied().unwrap_or(0.0);
                    idx = if v <= *threshold { *left } else { *right };
                }
                None => return 0.0,
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match nodes.get(idx) {
                Some(Node::Split { left, right, .. }) => 1 + walk(nodes, *left).max(walk(nodes, *right)),
                _ => 0,
            }
        }
        walk(&self.nodes, 0)
    }

    /// Highest feature index referenced by any split.
    pub fn max_feature_index(&self) -> Option<usize> {
        self.nodes
            .iter()
            .filter_map(|n| match n {
                Node::Split { feature, .. } => Some(*feature),
                Node::Leaf { .. } => None,
            })
            .max()
    }

    fn grow(
        &mut self,
        features: &[&[f64]],
        grad: &[f64],
        hess: &[f64],
        params: &TreeParams,
        rows: Vec<usize>,
        depth: usize,
    ) -> usize {
        let g: f64 = rows.iter().map(|&r| grad[r]).sum();
        let h: f64 = rows.iter().map(|&r| hess[r]).sum();
        let leaf_value = -g / (h + params.lambda);

        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf { value: leaf_value });

        if depth >= params.max_depth || rows.len() < 2 * params.min_samples_leaf.max(1) {
            return idx;
        }

        let Some(best) = best_split(features, grad, hess, params, &rows, g, h) else {
            return idx;
        };
        if best.gain <= params.min_gain {
            return idx;
        }

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&r| features[r].get(best.feature).copied().unwrap_or(0.0) <= best.threshold);

        let left = self.grow(features, grad, hess, params, left_rows, depth + 1);
        let right = self.grow(features, grad, hess, params, right_rows, depth + 1);
        self.nodes[idx] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        idx
    }
}

fn score(g: f64, h: f64, lambda: f64) -> f64 {
    g * g / (h + lambda)
}

fn best_split(
    features: &[&[f64]],
    grad: &[f64],
    hess: &[f64],
    params: &TreeParams,
    rows: &[usize],
    g_total: f64,
    h_total: f64,
) -> Option<SplitCandidate> {
    let n_features = features[rows[0]].len();
    let parent = score(g_total, h_total, params.lambda);
    let min_leaf = params.min_samples_leaf.max(1);

    (0..n_features)
        .into_par_iter()
        .filter_map(|feature| {
            let mut column: Vec<(f64, f64, f64)> = rows
                .iter()
                .map(|&r| (features[r][feature], grad[r], hess[r]))
                .collect();
            column.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

            let mut best: Option<SplitCandidate> = None;
            let (mut gl, mut hl) = (0.0, 0.0);
            for k in 0..column.len() - 1 {
                gl += column[k].1;
                hl += column[k].2;
                let left_count = k + 1;
                let right_count = column.len() - left_count;
                if left_count < min_leaf || right_count < min_leaf {
                    continue;
                }
                if column[k].0 == column[k + 1].0 {
                    continue;
                }
                let hr = h_total - hl;
                if hl < params.min_child_weight || hr < params.min_child_weight {
                    continue;
                }
                let gr = g_total - gl;
                let gain = 0.5
                    * (score(gl, hl, params.lambda) + score(gr, hr, params.lambda) - parent);
                if !gain.is_finite() {
                    continue;
                }
                let candidate = SplitCandidate {
                    feature,
                    threshold: 0.5 * (column[k].0 + column[k + 1].0),
                    gain,
                };
                best = Some(match best {
                    Some(b) => b.better(candidate),
                    None => candidate,
                });
            }
            best
        })
        .reduce_with(SplitCandidate::better)
}
