//! Anomaly Scorer — isolation forest over a cohort's feature matrix.
//!
//! The detector is unsupervised: anomalous records are isolated by fewer
//! random splits than records inside the dense part of the distribution.
//! Each invocation fits a fresh forest, so cohorts with different feature
//! distributions never share a fitted model.

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::models::FEATURE_COUNT;

/// Number of trees in the ensemble
pub const DEFAULT_TREE_COUNT: usize = 100;

/// Upper bound on the per-tree subsample size
pub const MAX_SUBSAMPLE: usize = 256;

/// Anomaly scores above this mark a record as an outlier. 0.5 is the
/// score's natural decision boundary (a record whose average path length
/// matches the expected path length of the sample scores exactly 0.5), so
/// the contamination rate is determined by the data rather than fixed.
const ANOMALY_SCORE_THRESHOLD: f64 = 0.5;

const EULER_MASCHERONI: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("non-finite value in feature matrix at row {row}, column {col}")]
    NonFinite { row: usize, col: usize },
}

/// Pluggable anomaly detection over a merged cohort matrix.
/// Returns one flag per row, in row order: `true` marks an outlier.
pub trait AnomalyScorer: Send + Sync {
    fn score_cohort(&self, matrix: &[[f64; FEATURE_COUNT]]) -> Result<Vec<bool>, ScoringError>;
}

/// Isolation forest with a self-determined contamination threshold.
pub struct IsolationForest {
    tree_count: usize,
    max_subsample: usize,
    seed: Option<u64>,
}

impl IsolationForest {
    pub fn new() -> Self {
        Self {
            tree_count: DEFAULT_TREE_COUNT,
            max_subsample: MAX_SUBSAMPLE,
            seed: None,
        }
    }

    /// Deterministic forest for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::new()
        }
    }
}

impl Default for IsolationForest {
    fn default() -> Self {
        Self::new()
    }
}

impl AnomalyScorer for IsolationForest {
    fn score_cohort(&self, matrix: &[[f64; FEATURE_COUNT]]) -> Result<Vec<bool>, ScoringError> {
        for (row, record) in matrix.iter().enumerate() {
            for (col, value) in record.iter().enumerate() {
                if !value.is_finite() {
                    return Err(ScoringError::NonFinite { row, col });
                }
            }
        }
        if matrix.is_empty() {
            return Ok(Vec::new());
        }

        let n = matrix.len();
        let subsample = n.min(self.max_subsample);
        let height_limit = ((subsample as f64).log2().ceil() as usize).max(1);
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let trees: Vec<Tree> = (0..self.tree_count)
            .map(|_| {
                let rows: Vec<usize> = if subsample < n {
                    sample(&mut rng, n, subsample).into_vec()
                } else {
                    (0..n).collect()
                };
                grow_tree(&mut rng, matrix, &rows, 0, height_limit)
            })
            .collect();

        let norm = average_path_length(subsample);
        let norm = if norm > 0.0 { norm } else { 1.0 };

        Ok(matrix
            .iter()
            .map(|point| {
                let mean_path: f64 = trees
                    .iter()
                    .map(|tree| path_length(tree, point, 0.0))
                    .sum::<f64>()
                    / self.tree_count as f64;
                let score = 2f64.powf(-mean_path / norm);
                score > ANOMALY_SCORE_THRESHOLD
            })
            .collect())
    }
}

enum Tree {
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Tree>,
        right: Box<Tree>,
    },
    Leaf {
        size: usize,
    },
}

fn grow_tree(
    rng: &mut StdRng,
    matrix: &[[f64; FEATURE_COUNT]],
    rows: &[usize],
    depth: usize,
    limit: usize,
) -> Tree {
    if depth >= limit || rows.len() <= 1 {
        return Tree::Leaf { size: rows.len() };
    }

    // Only features with spread over this node's rows are splittable.
    let mut candidates: Vec<(usize, f64, f64)> = Vec::new();
    for feature in 0..FEATURE_COUNT {
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for &row in rows {
            let value = matrix[row][feature];
            lo = lo.min(value);
            hi = hi.max(value);
        }
        if lo < hi {
            candidates.push((feature, lo, hi));
        }
    }
    if candidates.is_empty() {
        return Tree::Leaf { size: rows.len() };
    }

    let (feature, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
    let threshold = rng.gen_range(lo..hi);
    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
        rows.iter().copied().partition(|&row| matrix[row][feature] < threshold);

    Tree::Split {
        feature,
        threshold,
        left: Box::new(grow_tree(rng, matrix, &left_rows, depth + 1, limit)),
        right: Box::new(grow_tree(rng, matrix, &right_rows, depth + 1, limit)),
    }
}

fn path_length(tree: &Tree, point: &[f64; FEATURE_COUNT], depth: f64) -> f64 {
    match tree {
        Tree::Leaf { size } => depth + average_path_length(*size),
        Tree::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            if point[*feature] < *threshold {
                path_length(left, point, depth + 1.0)
            } else {
                path_length(right, point, depth + 1.0)
            }
        }
    }
}

/// Expected path length of an unsuccessful BST search over `n` points,
/// the standard normalizer for isolation forest scores.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_MASCHERONI) - 2.0 * (n - 1.0) / n
        }
    }
}
