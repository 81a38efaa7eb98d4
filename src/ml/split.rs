//! Train/evaluation splits.

use std::collections::BTreeMap;

use ndarray::{Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::MlError;

/// Row indices of a train/test partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
    /// Whether class proportions were preserved
    pub stratified: bool,
}

/// Shuffled split with `ceil(n * test_size)` test rows, at least one row on
/// each side.
///
/// # Errors
/// Returns [`MlError::TooFewRows`] when `n < 2`.
pub fn train_test_split(n: usize, test_size: f64, seed: u64) -> Result<Split, MlError> {
    if n < 2 {
        return Err(MlError::TooFewRows { rows: n, required: 2 });
    }
    let n_test = ((n as f64 * test_size).ceil() as usize).clamp(1, n - 1);
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));
    let train = indices.split_off(n_test);
    Ok(Split {
        train,
        test: indices,
        stratified: false,
    })
}

/// Per-class shuffled split preserving class proportions.
///
/// Falls back to [`train_test_split`] when some class has fewer than two
/// members, reported through [`Split::stratified`].
///
/// # Errors
/// Returns [`MlError::TooFewRows`] when fewer than two labels are given.
pub fn stratified_split(labels: &[usize], test_size: f64, seed: u64) -> Result<Split, MlError> {
    if labels.len() < 2 {
        return Err(MlError::TooFewRows {
            rows: labels.len(),
            required: 2,
        });
    }

    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, &label) in labels.iter().enumerate() {
        by_class.entry(label).or_default().push(i);
    }
    if by_class.len() < 2 || by_class.values().any(|rows| rows.len() < 2) {
        return train_test_split(labels.len(), test_size, seed);
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();
    for mut rows in by_class.into_values() {
        rows.shuffle(&mut rng);
        let n_test = ((rows.len() as f64 * test_size).round() as usize).clamp(1, rows.len() - 1);
        let class_train = rows.split_off(n_test);
        test.extend(rows);
        train.extend(class_train);
    }
    train.sort_unstable();
    test.sort_unstable();
    Ok(Split {
        train,
        test,
        stratified: true,
    })
}

/// Rows of `x` at `indices`, in that order.
#[must_use]
pub fn take_rows(x: &Array2<f64>, indices: &[usize]) -> Array2<f64> {
    x.select(Axis(0), indices)
}

/// Elements of `values` at `indices`, in that order.
#[must_use]
pub fn take<T: Clone>(values: &[T], indices: &[usize]) -> Vec<T> {
    indices.iter().map(|&i| values[i].clone()).collect()
}
