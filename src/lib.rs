//! # Carecast
//!
//! Feature preparation, training and prediction pipeline for patient visit
//! records.
//!
//! This crate provides:
//! - Deterministic feature encoding shared between training and inference
//! - Label construction for three tasks (30-day readmission, composite risk
//!   score, disease progression)
//! - Random forest / gradient boosting trainers with evaluation reports
//! - A versioned model registry and a prediction service over loaded bundles
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - `domain`: Core business types (records, predictions, model bundles)
//! - `ml`: Encoders, label construction and estimators
//! - `ports`: Trait definitions for record stores and model registries
//! - `adapters`: Concrete implementations (SQLite, filesystem registry, log sanitizing)
//! - `application`: Use cases (intake, training, prediction)

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod logging;
pub mod ml;
pub mod ports;

pub use domain::{
    BatchPrediction, BatchRequest, ModelBundle, PatientRecord, Prediction, RawRecord, Task,
    VisitRecord,
};

/// Result type for Carecast operations
pub type Result<T> = std::result::Result<T, CarecastError>;

/// Main error type for Carecast
#[derive(Debug, thiserror::Error)]
pub enum CarecastError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Unknown category {value:?} for `{column}`: value was never seen during training")]
    UnknownCategory { column: String, value: String },

    #[error("Model not ready: {model} model is not loaded (train a bundle with `train_models` and load it before predicting)")]
    ModelNotReady { model: Task },

    #[error("Insufficient training data for {task}: {reason}")]
    TrainingDataInsufficient { task: String, reason: String },

    #[error("Model registry operation failed: {0}")]
    Persistence(#[from] adapters::RegistryError),

    #[error("Storage operation failed: {0}")]
    Storage(#[from] adapters::StorageError),

    #[error("Model computation failed: {0}")]
    Model(ml::MlError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<ml::MlError> for CarecastError {
    fn from(err: ml::MlError) -> Self {
        match err {
            ml::MlError::UnknownCategory { column, value } => {
                Self::UnknownCategory { column, value }
            }
            other => Self::Model(other),
        }
    }
}
