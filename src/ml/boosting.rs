//! Least-squares gradient boosting over regression trees.

use ndarray::{Array2, ArrayView1};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tree::{DecisionTree, Targets, TrainingView, TreeParams};
use super::MlError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub seed: u64,
}

/// Additive model: the target mean plus `learning_rate` times the sum of
/// trees fitted to successive residuals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostingRegressor {
    init: f64,
    learning_rate: f64,
    trees: Vec<DecisionTree>,
    n_features: usize,
}

impl GradientBoostingRegressor {
    /// # Errors
    /// Returns an error for empty input or a target length mismatch.
    pub fn fit(params: &BoostingParams, x: &Array2<f64>, y: &[f64]) -> Result<Self, MlError> {
        let n = x.nrows();
        if n == 0 {
            return Err(MlError::EmptyTrainingSet);
        }
        if y.len() != n {
            return Err(MlError::LabelCount {
                rows: n,
                labels: y.len(),
            });
        }

        let init = y.iter().sum::<f64>() / n as f64;
        let mut predictions = vec![init; n];
        let weights = vec![1.0; n];
        let samples: Vec<usize> = (0..n).collect();
        let tree_params = TreeParams::regressor(params.max_depth);
        let mut rng = ChaCha8Rng::seed_from_u64(params.seed);

        let mut trees = Vec::with_capacity(params.n_estimators);
        for _ in 0..params.n_estimators {
            let residuals: Vec<f64> = y.iter().zip(&predictions).map(|(t, p)| t - p).collect();
            let view = TrainingView {
                x: x.view(),
                targets: Targets::Values(&residuals),
                weights: &weights,
            };
            let tree = DecisionTree::fit(&tree_params, &view, &samples, &mut rng)?;
            for (i, row) in x.rows().into_iter().enumerate() {
                predictions[i] += params.learning_rate * tree.predict_row(row)[0];
            }
            trees.push(tree);
        }

        debug!(stages = trees.len(), rows = n, init, "Gradient boosting fitted");

        Ok(Self {
            init,
            learning_rate: params.learning_rate,
            trees,
            n_features: x.ncols(),
        })
    }

    /// # Errors
    /// Returns [`MlError::FeatureCount`] on a length mismatch.
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> Result<f64, MlError> {
        if row.len() != self.n_features {
            return Err(MlError::FeatureCount {
                expected: self.n_features,
                got: row.len(),
            });
        }
        Ok(self.init
            + self.learning_rate
                * self
                    .trees
                    .iter()
                    .map(|tree| tree.predict_row(row)[0])
                    .sum::<f64>())
    }

    /// # Errors
    /// Returns [`MlError::FeatureCount`] on a column mismatch.
    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<f64>, MlError> {
        x.rows().into_iter().map(|row| self.predict_row(row)).collect()
    }

    /// Mean of the per-stage normalized importances, renormalized.
    #[must_use]
    pub fn feature_importances(&self) -> Vec<f64> {
        let mut total = vec![0.0; self.n_features];
        for tree in &self.trees {
            for (acc, v) in total.iter_mut().zip(tree.feature_importances()) {
                *acc += v;
            }
        }
        let sum: f64 = total.iter().sum();
        if sum > 0.0 {
            total.iter_mut().for_each(|v| *v /= sum);
        }
        total
    }

    #[must_use]
    pub fn n_stages(&self) -> usize {
        self.trees.len()
    }
}
