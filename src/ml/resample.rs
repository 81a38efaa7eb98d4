//! SMOTE minority oversampling.

use std::collections::BTreeMap;

use ndarray::{Array2, ArrayView1};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use super::MlError;

/// Synthetic Minority Over-sampling: every class below the majority count is
/// topped up with points interpolated between a class member and one of its
/// `k_neighbors` nearest same-class neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Smote {
    pub k_neighbors: usize,
    pub seed: u64,
}

/// Oversampled training data: the original rows first, synthetic rows after.
#[derive(Debug, Clone, PartialEq)]
pub struct Resampled {
    pub x: Array2<f64>,
    pub y: Vec<usize>,
    pub synthesized: usize,
}

impl Smote {
    #[must_use]
    pub fn new(k_neighbors: usize, seed: u64) -> Self {
        Self { k_neighbors, seed }
    }

    /// Balance all classes to the majority count.
    ///
    /// # Errors
    /// - [`MlError::SingleClass`] when fewer than two classes are present
    /// - [`MlError::TooFewSamples`] when a class to oversample has at most
    ///   `k_neighbors` members
    pub fn fit_resample(&self, x: &Array2<f64>, y: &[usize]) -> Result<Resampled, MlError> {
        if x.nrows() == 0 {
            return Err(MlError::EmptyTrainingSet);
        }
        if y.len() != x.nrows() {
            return Err(MlError::LabelCount {
                rows: x.nrows(),
                labels: y.len(),
            });
        }

        let mut members: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (i, &label) in y.iter().enumerate() {
            members.entry(label).or_default().push(i);
        }
        if members.len() < 2 {
            return Err(MlError::SingleClass(y[0]));
        }

        let majority = members.values().map(Vec::len).max().unwrap_or(0);
        let required = self.k_neighbors + 1;
        for (&class, rows) in &members {
            if rows.len() < majority && rows.len() < required {
                return Err(MlError::TooFewSamples {
                    class,
                    count: rows.len(),
                    required,
                });
            }
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut synthetic: Vec<f64> = Vec::new();
        let mut labels = y.to_vec();

        for (&class, rows) in &members {
            let deficit = majority - rows.len();
            if deficit == 0 {
                continue;
            }
            let neighbours: Vec<Vec<usize>> = rows
                .iter()
                .map(|&i| nearest(x, rows, i, self.k_neighbors))
                .collect();

            for _ in 0..deficit {
                let pick = rng.gen_range(0..rows.len());
                let neighbour = neighbours[pick][rng.gen_range(0..neighbours[pick].len())];
                let gap: f64 = rng.gen();
                let base = x.row(rows[pick]);
                let toward = x.row(neighbour);
                synthetic.extend(base.iter().zip(toward.iter()).map(|(a, b)| a + gap * (b - a)));
                labels.push(class);
            }
            debug!(class, added = deficit, "SMOTE oversampled class");
        }

        let synthesized = labels.len() - y.len();
        let mut data: Vec<f64> = x.iter().copied().collect();
        data.extend(synthetic);
        let x = Array2::from_shape_vec((labels.len(), x.ncols()), data)?;
        Ok(Resampled {
            x,
            y: labels,
            synthesized,
        })
    }
}

/// The `k` rows of `candidates` closest to `row` (excluding itself).
fn nearest(x: &Array2<f64>, candidates: &[usize], row: usize, k: usize) -> Vec<usize> {
    let origin = x.row(row);
    let mut distances: Vec<(f64, usize)> = candidates
        .iter()
        .filter(|&&c| c != row)
        .map(|&c| (squared_distance(origin, x.row(c)), c))
        .collect();
    distances.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    distances.into_iter().take(k).map(|(_, c)| c).collect()
}

fn squared_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(p, q)| (p - q).powi(2)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn imbalanced(minority: usize) -> (Array2<f64>, Vec<usize>) {
        let majority = 20;
        let mut data = Vec::new();
        let mut y = Vec::new();
        for i in 0..majority {
            data.extend([i as f64, 0.0]);
            y.push(0);
        }
        for i in 0..minority {
            data.extend([100.0 + i as f64, 50.0]);
            y.push(1);
        }
        (
            Array2::from_shape_vec((majority + minority, 2), data).expect("shape"),
            y,
        )
    }

    #[test]
    fn test_balances_to_majority() {
        let (x, y) = imbalanced(6);
        let out = Smote::new(5, 42).fit_resample(&x, &y).expect("resample");
        assert_eq!(out.synthesized, 14);
        assert_eq!(out.y.iter().filter(|&&l| l == 1).count(), 20);
        assert_eq!(out.x.nrows(), 40);
        // originals first, untouched
        assert_eq!(out.x.row(0), x.row(0));

        // synthetic points stay inside the minority hull
        for row in out.x.rows().into_iter().skip(26) {
            assert!(row[0] >= 100.0 && row[0] <= 105.0);
            assert_eq!(row[1], 50.0);
        }
    }

    #[test]
    fn test_too_few_minority_samples() {
        let (x, y) = imbalanced(5);
        assert_eq!(
            Smote::new(5, 42).fit_resample(&x, &y),
            Err(MlError::TooFewSamples {
                class: 1,
                count: 5,
                required: 6
            })
        );
    }

    #[test]
    fn test_single_class_rejected() {
        let (x, y) = imbalanced(0);
        assert_eq!(
            Smote::new(5, 1).fit_resample(&x, &y),
            Err(MlError::SingleClass(0))
        );
    }

    #[test]
    fn test_deterministic_for_seed() {
        let (x, y) = imbalanced(8);
        let a = Smote::new(3, 9).fit_resample(&x, &y).expect("resample");
        let b = Smote::new(3, 9).fit_resample(&x, &y).expect("resample");
        assert_eq!(a, b);
    }
}
