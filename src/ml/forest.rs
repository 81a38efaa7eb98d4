//! Bagged random forest classifier.

use ndarray::{Array2, ArrayView1};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tree::{DecisionTree, Targets, TrainingView, TreeParams};
use super::MlError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassWeight {
    Uniform,
    /// `n_samples / (n_present_classes * class_count)`
    Balanced,
}

impl ClassWeight {
    /// Per-row sample weights for `labels`.
    #[must_use]
    pub fn sample_weights(self, labels: &[usize], n_classes: usize) -> Vec<f64> {
        match self {
            Self::Uniform => vec![1.0; labels.len()],
            Self::Balanced => {
                let mut counts = vec![0usize; n_classes];
                for &label in labels {
                    counts[label] += 1;
                }
                let present = counts.iter().filter(|&&c| c > 0).count().max(1) as f64;
                let n = labels.len() as f64;
                labels
                    .iter()
                    .map(|&label| n / (present * counts[label] as f64))
                    .collect()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub class_weight: ClassWeight,
    pub bootstrap: bool,
    pub seed: u64,
}

impl ForestParams {
    #[must_use]
    pub fn new(n_estimators: usize, max_depth: usize, seed: u64) -> Self {
        Self {
            n_estimators,
            max_depth,
            class_weight: ClassWeight::Balanced,
            bootstrap: true,
            seed,
        }
    }
}

/// Ensemble of Gini trees, each grown on a bootstrap draw with random
/// feature subsets. Probabilities are the mean of the tree leaf
/// distributions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestClassifier {
    trees: Vec<DecisionTree>,
    n_classes: usize,
    n_features: usize,
}

impl RandomForestClassifier {
    /// Fit on `x` with class labels `0..n_classes`.
    ///
    /// Tree `t` draws from `ChaCha8Rng::seed_from_u64(seed + t)`, so a fit is
    /// reproducible for a given seed.
    ///
    /// # Errors
    /// Returns an error for empty input, mismatched label count or a label
    /// outside `0..n_classes`.
    pub fn fit(
        params: &ForestParams,
        x: &Array2<f64>,
        y: &[usize],
        n_classes: usize,
    ) -> Result<Self, MlError> {
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
        if let Some(&label) = y.iter().find(|&&l| l >= n_classes) {
            return Err(MlError::LabelOutOfRange { label, n_classes });
        }

        let weights = params.class_weight.sample_weights(y, n_classes);
        let view = TrainingView {
            x: x.view(),
            targets: Targets::Classes {
                labels: y,
                n_classes,
            },
            weights: &weights,
        };
        let tree_params = TreeParams::classifier(params.max_depth);

        let mut trees = Vec::with_capacity(params.n_estimators.max(1));
        for t in 0..params.n_estimators.max(1) {
            let mut rng = ChaCha8Rng::seed_from_u64(params.seed.wrapping_add(t as u64));
            let samples: Vec<usize> = if params.bootstrap {
                (0..n).map(|_| rng.gen_range(0..n)).collect()
            } else {
                (0..n).collect()
            };
            trees.push(DecisionTree::fit(&tree_params, &view, &samples, &mut rng)?);
        }

        debug!(
            trees = trees.len(),
            rows = n,
            features = x.ncols(),
            "Random forest fitted"
        );

        Ok(Self {
            trees,
            n_classes,
            n_features: x.ncols(),
        })
    }

    /// Class probabilities for one feature vector.
    ///
    /// # Errors
    /// Returns [`MlError::FeatureCount`] on a length mismatch.
    pub fn predict_proba_row(&self, row: ArrayView1<'_, f64>) -> Result<Vec<f64>, MlError> {
        if row.len() != self.n_features {
            return Err(MlError::FeatureCount {
                expected: self.n_features,
                got: row.len(),
            });
        }
        let mut proba = vec![0.0; self.n_classes];
        for tree in &self.trees {
            for (acc, p) in proba.iter_mut().zip(tree.predict_row(row)) {
                *acc += p;
            }
        }
        let n_trees = self.trees.len() as f64;
        proba.iter_mut().for_each(|p| *p /= n_trees);
        Ok(proba)
    }

    /// Class probabilities, one row per sample.
    ///
    /// # Errors
    /// Returns [`MlError::FeatureCount`] on a column mismatch.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>, MlError> {
        let mut out = Array2::zeros((x.nrows(), self.n_classes));
        for (i, row) in x.rows().into_iter().enumerate() {
            let proba = self.predict_proba_row(row)?;
            for (j, p) in proba.into_iter().enumerate() {
                out[[i, j]] = p;
            }
        }
        Ok(out)
    }

    /// Most probable class per row; ties go to the lower class index.
    ///
    /// # Errors
    /// Returns [`MlError::FeatureCount`] on a column mismatch.
    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>, MlError> {
        x.rows()
            .into_iter()
            .map(|row| self.predict_proba_row(row).map(|p| argmax(&p)))
            .collect()
    }

    /// Mean of the per-tree normalized impurity importances.
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
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

/// Index of the largest value; the first one wins on ties.
#[must_use]
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}
