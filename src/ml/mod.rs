//! Feature preparation, label construction and the estimators behind the
//! three prediction tasks.
//!
//! Everything here is pure computation over `ndarray` matrices: no I/O and no
//! global state. Randomness is always drawn from a caller-seeded
//! [`rand_chacha::ChaCha8Rng`].

pub mod boosting;
pub mod encoder;
pub mod forest;
pub mod labels;
pub mod metrics;
pub mod resample;
pub mod scaler;
pub mod split;
pub mod tree;

pub use boosting::{BoostingParams, GradientBoostingRegressor};
pub use encoder::{CategoryEncoder, EncoderState, FeatureEncoder, FeatureKind, FeatureSpec};
pub use forest::{ClassWeight, ForestParams, RandomForestClassifier};
pub use metrics::FeatureImportance;
pub use resample::{Resampled, Smote};
pub use scaler::StandardScaler;
pub use split::Split;

use thiserror::Error;

/// Estimator and preprocessing failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MlError {
    #[error("Training set is empty")]
    EmptyTrainingSet,

    #[error("Expected {expected} features, got {got}")]
    FeatureCount { expected: usize, got: usize },

    #[error("Label count {labels} does not match row count {rows}")]
    LabelCount { rows: usize, labels: usize },

    #[error("Unknown category {value:?} for column {column}")]
    UnknownCategory { column: String, value: String },

    #[error("Class {class} has {count} samples, need at least {required}")]
    TooFewSamples {
        class: usize,
        count: usize,
        required: usize,
    },

    #[error("Only one class present (class {0})")]
    SingleClass(usize),

    #[error("Label {label} out of range for {n_classes} classes")]
    LabelOutOfRange { label: usize, n_classes: usize },

    #[error("{rows} rows available, need at least {required}")]
    TooFewRows { rows: usize, required: usize },

    #[error("Shape error: {0}")]
    Shape(String),
}

impl From<ndarray::ShapeError> for MlError {
    fn from(e: ndarray::ShapeError) -> Self {
        Self::Shape(e.to_string())
    }
}
