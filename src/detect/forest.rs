//! Isolation forest outlier model.
//!
//! Unsupervised ensemble in the classic Liu/Ting/Zhou shape: random
//! axis-aligned splits isolate anomalous rows in fewer steps than normal
//! ones. Fit once per baseline rebuild, never refit at prediction time.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use tracing::info;

use crate::detect::DetectError;

/// Minimum feature rows required for a meaningful split-based ensemble.
pub const MIN_FIT_ROWS: usize = 10;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Tunables for the forest. The contamination default is high because the
/// historical batches this model trains on are themselves anomaly-heavy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub trees: usize,
    pub sample_size: usize,
    pub contamination: f64,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            trees: 100,
            sample_size: 256,
            contamination: 0.49,
            seed: 42,
        }
    }
}

enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        value: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// The fitted ensemble. Verdicts follow the usual convention:
/// `-1` anomaly, `1` normal.
pub struct IsolationForest {
    params: ForestParams,
    trees: Vec<Node>,
    sample_size: usize,
    threshold: f64,
    trained: bool,
}

impl IsolationForest {
    pub fn new(params: ForestParams) -> Self {
        Self {
            params,
            trees: Vec::new(),
            sample_size: 0,
            threshold: 0.0,
            trained: false,
        }
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }

    /// Fit the ensemble on a feature matrix. Non-finite values are zeroed.
    ///
    /// With fewer than [`MIN_FIT_ROWS`] rows this is a no-op and the model
    /// stays untrained; callers degrade to score-only detection.
    pub fn fit(&mut self, rows: &[Vec<f64>]) {
        if rows.len() < MIN_FIT_ROWS {
            info!(
                rows = rows.len(),
                min = MIN_FIT_ROWS,
                "too few feature rows to fit outlier model, staying untrained"
            );
            self.trees.clear();
            self.trained = false;
            return;
        }

        let data = sanitize(rows);
        let sample_size = self.params.sample_size.min(data.len());
        let height_limit = (sample_size as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(self.params.seed);

        let mut trees = Vec::with_capacity(self.params.trees);
        for _ in 0..self.params.trees {
            let sample = subsample(&data, sample_size, &mut rng);
            trees.push(build_tree(&sample, 0, height_limit, &mut rng));
        }

        self.trees = trees;
        self.sample_size = sample_size;
        self.trained = true;

        // Calibrate the verdict threshold on the training scores: the top
        // `contamination` fraction is labelled anomalous.
        let mut scores: Vec<f64> = data.iter().map(|row| self.raw_score(row)).collect();
        scores.sort_by(|a, b| a.partial_cmp(b).unwrap());
        self.threshold = quantile(&scores, 1.0 - self.params.contamination);
    }

    /// Anomaly score per row, in (0, 1]; higher is more anomalous.
    pub fn score_samples(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, DetectError> {
        if !self.trained {
            return Err(DetectError::ModelNotTrained);
        }
        Ok(sanitize(rows).iter().map(|row| self.raw_score(row)).collect())
    }

    /// Binary verdict per row using only the previously-fit ensemble.
    pub fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<i32>, DetectError> {
        let scores = self.score_samples(rows)?;
        Ok(scores
            .into_iter()
            .map(|s| if s > self.threshold { -1 } else { 1 })
            .collect())
    }

    fn raw_score(&self, row: &[f64]) -> f64 {
        let mean_path = self
            .trees
            .iter()
            .map(|tree| path_length(tree, row, 0))
            .sum::<f64>()
            / self.trees.len() as f64;
        let norm = avg_path_length(self.sample_size);
        2f64.powf(-mean_path / norm)
    }
}

fn sanitize(rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
    rows.iter()
        .map(|row| {
            row.iter()
                .map(|v| if v.is_finite() { *v } else { 0.0 })
                .collect()
        })
        .collect()
}

fn subsample(data: &[Vec<f64>], amount: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    if amount >= data.len() {
        return data.to_vec();
    }
    rand::seq::index::sample(rng, data.len(), amount)
        .iter()
        .map(|i| data[i].clone())
        .collect()
}

fn build_tree(sample: &[Vec<f64>], depth: usize, limit: usize, rng: &mut StdRng) -> Node {
    if depth >= limit || sample.len() <= 1 {
        return Node::Leaf { size: sample.len() };
    }

    // Only features that still have spread can split the sample.
    let dims = sample[0].len();
    let mut candidates = Vec::new();
    for f in 0..dims {
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for row in sample {
            lo = lo.min(row[f]);
            hi = hi.max(row[f]);
        }
        if hi > lo {
            candidates.push((f, lo, hi));
        }
    }
    if candidates.is_empty() {
        return Node::Leaf { size: sample.len() };
    }

    let (feature, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
    let value = rng.gen_range(lo..hi);

    let (left, right): (Vec<Vec<f64>>, Vec<Vec<f64>>) =
        sample.iter().cloned().partition(|row| row[feature] < value);

    Node::Split {
        feature,
        value,
        left: Box::new(build_tree(&left, depth + 1, limit, rng)),
        right: Box::new(build_tree(&right, depth + 1, limit, rng)),
    }
}

fn path_length(node: &Node, row: &[f64], depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + avg_path_length(*size),
        Node::Split {
            feature,
            value,
            left,
            right,
        } => {
            if row[*feature] < *value {
                path_length(left, row, depth + 1)
            } else {
                path_length(right, row, depth + 1)
            }
        }
    }
}

/// Expected path length of an unsuccessful BST search over n points,
/// the standard normalisation term for isolation forests.
fn avg_path_length(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let n = n as f64;
    2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
}

/// Linearly interpolated quantile of a sorted slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic cluster around (10, 2, 0.2, 0, 0) with mild spread.
    fn cluster(n: usize) -> Vec<Vec<f64>> {
        (0..n)
            .map(|i| {
                let j = (i % 7) as f64;
                vec![10.0 + j, 2.0 + (i % 3) as f64, 0.2, j - 3.0, 0.01 * j]
            })
            .collect()
    }

    #[test]
    fn test_under_minimum_rows_stays_untrained() {
        let mut forest = IsolationForest::new(ForestParams::default());
        forest.fit(&cluster(9));
        assert!(!forest.is_trained());
        assert!(matches!(
            forest.predict(&cluster(3)),
            Err(DetectError::ModelNotTrained)
        ));
    }

    #[test]
    fn test_deterministic_for_fixed_seed() {
        let data = cluster(120);
        let probes = vec![vec![11.0, 2.0, 0.2, -1.0, 0.0], vec![500.0, 480.0, 0.96, 450.0, 0.7]];

        let mut a = IsolationForest::new(ForestParams::default());
        let mut b = IsolationForest::new(ForestParams::default());
        a.fit(&data);
        b.fit(&data);

        assert_eq!(a.score_samples(&probes).unwrap(), b.score_samples(&probes).unwrap());
        assert_eq!(a.predict(&probes).unwrap(), b.predict(&probes).unwrap());
    }

    #[test]
    fn test_far_outlier_flagged() {
        let mut forest = IsolationForest::new(ForestParams::default());
        forest.fit(&cluster(200));

        let outlier = vec![vec![500.0, 480.0, 0.96, 450.0, 0.7]];
        assert_eq!(forest.predict(&outlier).unwrap(), vec![-1]);

        let scores = forest.score_samples(&outlier).unwrap();
        let cluster_scores = forest.score_samples(&cluster(200)).unwrap();
        let max_cluster = cluster_scores.iter().cloned().fold(f64::MIN, f64::max);
        assert!(scores[0] >= max_cluster);
    }

    #[test]
    fn test_constant_training_data_predicts_normal() {
        // No feature has spread: every tree is a single leaf and every row
        // scores exactly at the threshold, so nothing is flagged.
        let data = vec![vec![10.0, 10.0, 1.0, 0.0, 0.0]; 50];
        let mut forest = IsolationForest::new(ForestParams::default());
        forest.fit(&data);
        assert!(forest.is_trained());

        let probes = vec![vec![40.0, 40.0, 1.0, 0.0, 0.0], vec![10.0, 10.0, 1.0, 0.0, 0.0]];
        assert_eq!(forest.predict(&probes).unwrap(), vec![1, 1]);
    }

    #[test]
    fn test_nan_features_are_zeroed() {
        let mut data = cluster(50);
        data[0][3] = f64::NAN;
        let mut forest = IsolationForest::new(ForestParams::default());
        forest.fit(&data);
        assert!(forest.is_trained());

        let probe = vec![vec![10.0, 2.0, f64::NAN, 0.0, 0.0]];
        // Must not panic or poison the scores.
        let scores = forest.score_samples(&probe).unwrap();
        assert!(scores[0].is_finite());
    }
}
