//! Application layer: Use cases and services.
//!
//! This module orchestrates domain logic, estimators and ports to implement
//! record intake, offline training and prediction.

mod intake;
mod prediction;
pub mod synthetic;
pub mod trainer;
mod training;

#[cfg(test)]
mod fixtures;

pub use intake::{DocumentKind, IntakeService, IntakeSummary, Rejection};
pub use prediction::PredictionService;
pub use trainer::{ImbalanceCorrection, TaskMetrics, TaskReport, Trainer};
pub use training::{smoke_test_request, TaskStatus, TrainingReport, TrainingService};
