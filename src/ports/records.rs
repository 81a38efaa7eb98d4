//! Record ports: where patient and visit documents come from and go to.
//!
//! The pipeline only reads records for training; intake writes them. The
//! two sides are separate traits so a read-only source can feed training.

use crate::domain::{PatientRecord, VisitRecord};

/// Read access to stored patients and visits.
pub trait RecordSource: Send + Sync {
    /// Error type for read operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load every stored patient.
    ///
    /// # Errors
    /// Returns error if the backend cannot be read.
    fn load_patients(&self) -> Result<Vec<PatientRecord>, Self::Error>;

    /// Load every stored visit.
    ///
    /// # Errors
    /// Returns error if the backend cannot be read.
    fn load_visits(&self) -> Result<Vec<VisitRecord>, Self::Error>;

    /// # Errors
    /// Returns error if the backend cannot be read.
    fn count_patients(&self) -> Result<usize, Self::Error>;

    /// # Errors
    /// Returns error if the backend cannot be read.
    fn count_visits(&self) -> Result<usize, Self::Error>;
}

/// Write access for record intake.
pub trait RecordSink: Send + Sync {
    /// Error type for write operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Store a patient. An existing patient keeps its stored attributes and
    /// only has `updated_at` refreshed.
    ///
    /// # Returns
    /// `true` if the patient was newly inserted.
    ///
    /// # Errors
    /// Returns error if the backend cannot be written.
    fn save_patient(&self, patient: &PatientRecord) -> Result<bool, Self::Error>;

    /// Store a visit. Visits are append-only: an existing `visit_id` is left
    /// untouched.
    ///
    /// # Returns
    /// `true` if the visit was newly inserted.
    ///
    /// # Errors
    /// Returns error if the backend cannot be written.
    fn save_visit(&self, visit: &VisitRecord) -> Result<bool, Self::Error>;
}
