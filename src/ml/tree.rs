//! CART decision trees over dense `f64` features.
//!
//! Trees are stored as a flat arena of nodes. Classification leaves hold the
//! weighted class distribution; regression leaves hold the weighted mean.

use ndarray::{ArrayView1, ArrayView2};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::MlError;

/// Minimum impurity decrease for a split to be kept.
const MIN_GAIN: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Criterion {
    Gini,
    SquaredError,
}

/// Number of candidate features examined at each split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaxFeatures {
    All,
    Sqrt,
}

impl MaxFeatures {
    fn resolve(self, n_features: usize) -> usize {
        match self {
            Self::All => n_features,
            Self::Sqrt => ((n_features as f64).sqrt().floor() as usize).max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub criterion: Criterion,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
}

impl TreeParams {
    /// Gini tree considering `sqrt(n_features)` candidates per split.
    #[must_use]
    pub fn classifier(max_depth: usize) -> Self {
        Self {
            criterion: Criterion::Gini,
            max_depth,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
        }
    }

    /// Squared-error tree considering every feature per split.
    #[must_use]
    pub fn regressor(max_depth: usize) -> Self {
        Self {
            criterion: Criterion::SquaredError,
            max_depth,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
        }
    }
}

/// Training targets for a tree.
#[derive(Debug, Clone, Copy)]
pub enum Targets<'a> {
    Classes { labels: &'a [usize], n_classes: usize },
    Values(&'a [f64]),
}

impl Targets<'_> {
    fn len(&self) -> usize {
        match self {
            Self::Classes { labels, .. } => labels.len(),
            Self::Values(values) => values.len(),
        }
    }
}

/// Borrowed training data: features, targets and per-row sample weights.
#[derive(Debug, Clone, Copy)]
pub struct TrainingView<'a> {
    pub x: ArrayView2<'a, f64>,
    pub targets: Targets<'a>,
    pub weights: &'a [f64],
}

impl TrainingView<'_> {
    fn validate(&self) -> Result<(), MlError> {
        let rows = self.x.nrows();
        if rows == 0 {
            return Err(MlError::EmptyTrainingSet);
        }
        if self.targets.len() != rows || self.weights.len() != rows {
            return Err(MlError::LabelCount {
                rows,
                labels: self.targets.len().min(self.weights.len()),
            });
        }
        if let Targets::Classes { labels, n_classes } = self.targets {
            if let Some(&label) = labels.iter().find(|&&l| l >= n_classes) {
                return Err(MlError::LabelOutOfRange { label, n_classes });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Running weighted statistics of the targets on one side of a split.
#[derive(Debug, Clone)]
enum Accumulator {
    Classes { counts: Vec<f64>, total: f64 },
    Values { sum: f64, sum_sq: f64, total: f64 },
}

impl Accumulator {
    fn empty(targets: &Targets<'_>) -> Self {
        match targets {
            Targets::Classes { n_classes, .. } => Self::Classes {
                counts: vec![0.0; *n_classes],
                total: 0.0,
            },
            Targets::Values(_) => Self::Values {
                sum: 0.0,
                sum_sq: 0.0,
                total: 0.0,
            },
        }
    }

    fn update(&mut self, targets: &Targets<'_>, row: usize, weight: f64) {
        match (self, targets) {
            (Self::Classes { counts, total }, Targets::Classes { labels, .. }) => {
                counts[labels[row]] += weight;
                *total += weight;
            }
            (Self::Values { sum, sum_sq, total }, Targets::Values(values)) => {
                let y = values[row];
                *sum += weight * y;
                *sum_sq += weight * y * y;
                *total += weight;
            }
            _ => {}
        }
    }

    fn total(&self) -> f64 {
        match self {
            Self::Classes { total, .. } | Self::Values { total, .. } => *total,
        }
    }

    fn impurity(&self) -> f64 {
        match self {
            Self::Classes { counts, total } => {
                if *total <= 0.0 {
                    return 0.0;
                }
                1.0 - counts.iter().map(|c| (c / total).powi(2)).sum::<f64>()
            }
            Self::Values { sum, sum_sq, total } => {
                if *total <= 0.0 {
                    return 0.0;
                }
                let mean = sum / total;
                (sum_sq / total - mean * mean).max(0.0)
            }
        }
    }

    fn leaf_value(&self) -> Vec<f64> {
        match self {
            Self::Classes { counts, total } => {
                if *total <= 0.0 {
                    let n = counts.len().max(1) as f64;
                    return vec![1.0 / n; counts.len()];
                }
                counts.iter().map(|c| c / total).collect()
            }
            Self::Values { sum, total, .. } => {
                vec![if *total > 0.0 { sum / total } else { 0.0 }]
            }
        }
    }
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// A fitted decision tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
    n_features: usize,
    /// Total weighted impurity decrease per feature
    gains: Vec<f64>,
}

impl DecisionTree {
    /// Grow a tree on the rows listed in `samples` (repeats allowed, as in a
    /// bootstrap draw).
    ///
    /// # Errors
    /// Returns an error when the view is inconsistent or `samples` is empty.
    pub fn fit<R: Rng + ?Sized>(
        params: &TreeParams,
        data: &TrainingView<'_>,
        samples: &[usize],
        rng: &mut R,
    ) -> Result<Self, MlError> {
        data.validate()?;
        if samples.is_empty() {
            return Err(MlError::EmptyTrainingSet);
        }
        let mut tree = Self {
            nodes: Vec::new(),
            n_features: data.x.ncols(),
            gains: vec![0.0; data.x.ncols()],
        };
        let mut indices = samples.to_vec();
        tree.grow(params, data, &mut indices, 0, rng);
        Ok(tree)
    }

    fn grow<R: Rng + ?Sized>(
        &mut self,
        params: &TreeParams,
        data: &TrainingView<'_>,
        indices: &mut Vec<usize>,
        depth: usize,
        rng: &mut R,
    ) -> usize {
        let mut node_stats = Accumulator::empty(&data.targets);
        for &i in indices.iter() {
            node_stats.update(&data.targets, i, data.weights[i]);
        }

        let id = self.nodes.len();
        self.nodes.push(Node::Leaf {
            value: node_stats.leaf_value(),
        });

        if depth >= params.max_depth
            || indices.len() < params.min_samples_split
            || node_stats.impurity() <= MIN_GAIN
        {
            return id;
        }

        let Some(best) = self.best_split(params, data, indices, &node_stats, rng) else {
            return id;
        };

        let (mut left, mut right): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| data.x[[i, best.feature]] <= best.threshold);
        indices.clear();
        indices.shrink_to_fit();

        self.gains[best.feature] += best.gain;
        let left_id = self.grow(params, data, &mut left, depth + 1, rng);
        let right_id = self.grow(params, data, &mut right, depth + 1, rng);
        self.nodes[id] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: left_id,
            right: right_id,
        };
        id
    }

    fn best_split<R: Rng + ?Sized>(
        &self,
        params: &TreeParams,
        data: &TrainingView<'_>,
        indices: &[usize],
        node_stats: &Accumulator,
        rng: &mut R,
    ) -> Option<BestSplit> {
        let n_candidates = params.max_features.resolve(self.n_features);
        let candidates: Vec<usize> = if n_candidates >= self.n_features {
            (0..self.n_features).collect()
        } else {
            rand::seq::index::sample(rng, self.n_features, n_candidates).into_vec()
        };

        let parent_cost = node_stats.total() * node_stats.impurity();
        let mut best: Option<BestSplit> = None;
        let mut order = indices.to_vec();

        for feature in candidates {
            order.sort_by(|&a, &b| data.x[[a, feature]].total_cmp(&data.x[[b, feature]]));

            let mut left = Accumulator::empty(&data.targets);
            let mut right = node_stats.clone();

            for k in 0..order.len() - 1 {
                let row = order[k];
                left.update(&data.targets, row, data.weights[row]);
                right.update(&data.targets, row, -data.weights[row]);

                let lo = data.x[[row, feature]];
                let hi = data.x[[order[k + 1], feature]];
                if lo >= hi {
                    continue;
                }
                if k + 1 < params.min_samples_leaf || order.len() - k - 1 < params.min_samples_leaf
                {
                    continue;
                }

                let cost = left.total() * left.impurity() + right.total() * right.impurity();
                let gain = parent_cost - cost;
                if gain > MIN_GAIN && best.as_ref().map_or(true, |b| gain > b.gain) {
                    let mut threshold = (lo + hi) / 2.0;
                    if threshold >= hi {
                        threshold = lo;
                    }
                    best = Some(BestSplit {
                        feature,
                        threshold,
                        gain,
                    });
                }
            }
        }
        best
    }

    /// Leaf value reached by `row`: a class distribution or a one-element
    /// regression output.
    #[must_use]
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> &[f64] {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                Node::Leaf { value } => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    /// Impurity-decrease importances normalized to sum to 1 (all zero for a
    /// single-leaf tree).
    #[must_use]
    pub fn feature_importances(&self) -> Vec<f64> {
        let total: f64 = self.gains.iter().sum();
        if total <= 0.0 {
            return vec![0.0; self.n_features];
        }
        self.gains.iter().map(|g| g / total).collect()
    }

    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], id: usize) -> usize {
            match &nodes[id] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }
}
