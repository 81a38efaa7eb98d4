//! Per-column standardization.

use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use super::MlError;

/// Zero-mean, unit-variance scaling fitted per column.
///
/// Uses the population standard deviation; constant columns keep a scale of
/// 1.0 so they map to zero instead of NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    /// Fit on the rows of `x`.
    ///
    /// # Errors
    /// Returns [`MlError::EmptyTrainingSet`] when `x` has no rows.
    pub fn fit(x: &Array2<f64>) -> Result<Self, MlError> {
        if x.nrows() == 0 {
            return Err(MlError::EmptyTrainingSet);
        }
        let n = x.nrows() as f64;
        let mut mean = Vec::with_capacity(x.ncols());
        let mut scale = Vec::with_capacity(x.ncols());
        for column in x.axis_iter(Axis(1)) {
            let m = column.sum() / n;
            let var = column.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n;
            let std = var.sqrt();
            mean.push(m);
            scale.push(if std > f64::EPSILON { std } else { 1.0 });
        }
        Ok(Self { mean, scale })
    }

    #[must_use]
    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    #[must_use]
    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    #[must_use]
    pub fn scale(&self) -> &[f64] {
        &self.scale
    }

    /// Scale every row of `x`.
    ///
    /// # Errors
    /// Returns [`MlError::FeatureCount`] on a column mismatch.
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>, MlError> {
        self.check_width(x.ncols())?;
        let mut out = x.clone();
        for (j, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
            let (m, s) = (self.mean[j], self.scale[j]);
            column.mapv_inplace(|v| (v - m) / s);
        }
        Ok(out)
    }

    /// Scale a single feature vector.
    ///
    /// # Errors
    /// Returns [`MlError::FeatureCount`] on a length mismatch.
    pub fn transform_row(&self, row: ArrayView1<'_, f64>) -> Result<Vec<f64>, MlError> {
        self.check_width(row.len())?;
        Ok(row
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(v, (m, s))| (v - m) / s)
            .collect())
    }

    fn check_width(&self, got: usize) -> Result<(), MlError> {
        if got == self.n_features() {
            Ok(())
        } else {
            Err(MlError::FeatureCount {
                expected: self.n_features(),
                got,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array1};

    #[test]
    fn test_fit_transform_standardizes() {
        let x = array![[1.0, 10.0], [3.0, 10.0], [5.0, 10.0]];
        let scaler = StandardScaler::fit(&x).expect("fit");
        assert_abs_diff_eq!(scaler.mean()[0], 3.0);
        assert_abs_diff_eq!(scaler.scale()[0], (8.0f64 / 3.0).sqrt(), epsilon = 1e-12);
        // constant column
        assert_abs_diff_eq!(scaler.scale()[1], 1.0);

        let z = scaler.transform(&x).expect("transform");
        assert_abs_diff_eq!(z.column(0).sum(), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(z[[1, 1]], 0.0);
    }

    #[test]
    fn test_transform_row_matches_matrix() {
        let x = array![[2.0, 4.0], [6.0, 0.0]];
        let scaler = StandardScaler::fit(&x).expect("fit");
        let z = scaler.transform(&x).expect("transform");
        let row = scaler.transform_row(x.row(1)).expect("row");
        assert_eq!(row, z.row(1).to_vec());
    }

    #[test]
    fn test_width_mismatch() {
        let scaler = StandardScaler::fit(&array![[1.0, 2.0]]).expect("fit");
        let row = Array1::from(vec![1.0]);
        assert_eq!(
            scaler.transform_row(row.view()),
            Err(MlError::FeatureCount { expected: 2, got: 1 })
        );
    }
}
