//! Feature encoder: raw rows to a fixed-order numeric matrix.
//!
//! The same [`EncoderState`] is used to encode training rows and inference
//! payloads, so coercion, imputation and category codes cannot drift between
//! the two modes.

use std::collections::{BTreeMap, BTreeSet};

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{MlError, StandardScaler};
use crate::domain::record::{FieldSource, UNKNOWN_CATEGORY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureKind {
    Numeric,
    Categorical,
}

/// One declared model input column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    pub kind: FeatureKind,
}

impl FeatureSpec {
    #[must_use]
    pub fn numeric(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: FeatureKind::Numeric,
        }
    }

    #[must_use]
    pub fn categorical(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: FeatureKind::Categorical,
        }
    }
}

/// Bijective mapping between the distinct training values of a column and
/// the integer codes `0..n`, assigned in sorted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryEncoder {
    classes: Vec<String>,
}

impl CategoryEncoder {
    #[must_use]
    pub fn fit<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let distinct: BTreeSet<String> = values.into_iter().map(Into::into).collect();
        Self {
            classes: distinct.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn encode(&self, value: &str) -> Option<usize> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(value))
            .ok()
    }

    #[must_use]
    pub fn decode(&self, code: usize) -> Option<&str> {
        self.classes.get(code).map(String::as_str)
    }

    #[must_use]
    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

/// Frozen preprocessing state learned from a training frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderState {
    features: Vec<FeatureSpec>,
    categories: BTreeMap<String, CategoryEncoder>,
    medians: BTreeMap<String, f64>,
    #[serde(default)]
    scaler: Option<StandardScaler>,
}

impl EncoderState {
    /// Encode a row and apply the scaler, if this state carries one.
    ///
    /// # Errors
    /// Returns [`MlError::UnknownCategory`] for a category not seen in
    /// training.
    pub fn transform<R: FieldSource + ?Sized>(&self, row: &R) -> Result<Vec<f64>, MlError> {
        let encoded = self.encode(row)?;
        match &self.scaler {
            Some(scaler) => scaler.transform_row(Array1::from(encoded).view()),
            None => Ok(encoded),
        }
    }

    /// Encode a row without scaling.
    ///
    /// # Errors
    /// Returns [`MlError::UnknownCategory`] for a category not seen in
    /// training.
    pub fn encode<R: FieldSource + ?Sized>(&self, row: &R) -> Result<Vec<f64>, MlError> {
        self.features
            .iter()
            .map(|feature| match feature.kind {
                FeatureKind::Numeric => Ok(self.numeric_value(row, &feature.name)),
                FeatureKind::Categorical => {
                    let value = row
                        .category(&feature.name)
                        .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string());
                    self.categories
                        .get(&feature.name)
                        .and_then(|enc| enc.encode(&value))
                        .map(|code| code as f64)
                        .ok_or(MlError::UnknownCategory {
                            column: feature.name.clone(),
                            value,
                        })
                }
            })
            .collect()
    }

    /// Numeric value of `field`, imputed with the training median when
    /// missing.
    #[must_use]
    pub fn numeric_value<R: FieldSource + ?Sized>(&self, row: &R, field: &str) -> f64 {
        row.numeric(field)
            .or_else(|| self.median(field))
            .unwrap_or(0.0)
    }

    /// Attach a scaler fitted on the encoded training split.
    #[must_use]
    pub fn with_scaler(mut self, scaler: StandardScaler) -> Self {
        self.scaler = Some(scaler);
        self
    }

    #[must_use]
    pub fn scaler(&self) -> Option<&StandardScaler> {
        self.scaler.as_ref()
    }

    #[must_use]
    pub fn features(&self) -> &[FeatureSpec] {
        &self.features
    }

    #[must_use]
    pub fn feature_names(&self) -> Vec<String> {
        self.features.iter().map(|f| f.name.clone()).collect()
    }

    #[must_use]
    pub fn n_features(&self) -> usize {
        self.features.len()
    }

    #[must_use]
    pub fn median(&self, field: &str) -> Option<f64> {
        self.medians.get(field).copied()
    }

    #[must_use]
    pub fn category_encoder(&self, field: &str) -> Option<&CategoryEncoder> {
        self.categories.get(field)
    }
}

/// Training-time entry point of the encoder.
pub struct FeatureEncoder;

impl FeatureEncoder {
    /// Learn medians and category codes from `rows`, then encode them.
    ///
    /// Missing categorical values are learned as [`UNKNOWN_CATEGORY`]. A
    /// numeric column with no observed value gets a median of 0.0.
    ///
    /// # Errors
    /// Returns [`MlError::EmptyTrainingSet`] when `rows` is empty.
    pub fn fit_transform<R: FieldSource>(
        rows: &[R],
        features: &[FeatureSpec],
    ) -> Result<(Array2<f64>, EncoderState), MlError> {
        if rows.is_empty() {
            return Err(MlError::EmptyTrainingSet);
        }

        let mut categories = BTreeMap::new();
        let mut medians = BTreeMap::new();

        for feature in features {
            match feature.kind {
                FeatureKind::Numeric => {
                    let observed: Vec<f64> =
                        rows.iter().filter_map(|r| r.numeric(&feature.name)).collect();
                    let value = median(observed).unwrap_or_else(|| {
                        warn!(column = %feature.name, "No observed values, imputing 0.0");
                        0.0
                    });
                    medians.insert(feature.name.clone(), value);
                }
                FeatureKind::Categorical => {
                    let encoder = CategoryEncoder::fit(rows.iter().map(|r| {
                        r.category(&feature.name)
                            .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string())
                    }));
                    debug!(
                        column = %feature.name,
                        classes = encoder.classes().len(),
                        "Fitted category encoder"
                    );
                    categories.insert(feature.name.clone(), encoder);
                }
            }
        }

        let state = EncoderState {
            features: features.to_vec(),
            categories,
            medians,
            scaler: None,
        };

        let mut data = Vec::with_capacity(rows.len() * features.len());
        for row in rows {
            data.extend(state.encode(row)?);
        }
        let x = Array2::from_shape_vec((rows.len(), features.len()), data)?;
        Ok((x, state))
    }
}

/// Median with the mean-of-middle-pair rule for even counts.
fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}
