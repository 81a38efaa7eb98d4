//! Domain layer: records, prediction results and the model bundle.
//!
//! Types here are serializable and validate their own intake documents.

pub mod bundle;
pub mod frame;
mod patient;
pub mod prediction;
pub mod record;
pub mod visit;

pub use bundle::{BundleVersion, ModelBundle, ProgressionModel, ReadmissionModel, RiskScoreModel};
pub use frame::{merge_visits, MergedRow, ProgressionRow};
pub use patient::{PatientRecord, AGE_RANGE, REQUIRED_PATIENT_FIELDS};
pub use prediction::{
    BatchPrediction, BatchRequest, Outcome, Prediction, Progression, ProgressionPrediction,
    ProgressionProbabilities, ReadmissionPrediction, ReadmissionRisk, RiskLevel,
    RiskScorePrediction, Task,
};
pub use record::{FieldSource, RawRecord};
pub use visit::{ReadmissionFlag, VisitRecord};
