//! Intake service: validates patient/visit documents and stores them.

use std::sync::Arc;

use serde::Serialize;

use crate::domain::{PatientRecord, RawRecord, VisitRecord};
use crate::ports::RecordSink;
use crate::CarecastError;

/// Which kind of document a rejection refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Patient,
    Visit,
}

/// A document that failed validation, by position in its input list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub kind: DocumentKind,
    pub index: usize,
    pub errors: Vec<String>,
}

/// Outcome of a bulk intake.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntakeSummary {
    pub patients_inserted: usize,
    pub patients_refreshed: usize,
    pub visits_inserted: usize,
    pub visits_duplicate: usize,
    pub rejected: Vec<Rejection>,
}

/// Service for record intake.
pub struct IntakeService<S>
where
    S: RecordSink,
{
    sink: Arc<S>,
}

impl<S> IntakeService<S>
where
    S: RecordSink,
    S::Error: Into<crate::adapters::StorageError>,
{
    pub fn new(sink: Arc<S>) -> Self {
        Self { sink }
    }

    /// Validate and store one patient document.
    ///
    /// # Returns
    /// The stored record and whether it was newly inserted.
    ///
    /// # Errors
    /// Returns [`CarecastError::Validation`] listing every problem, or a
    /// storage error.
    pub fn ingest_patient(&self, doc: &RawRecord) -> Result<(PatientRecord, bool), CarecastError> {
        let patient = PatientRecord::from_document(doc)
            .map_err(|errors| CarecastError::Validation(errors.join("; ")))?;
        let inserted = self
            .sink
            .save_patient(&patient)
            .map_err(|e| CarecastError::Storage(e.into()))?;
        Ok((patient, inserted))
    }

    /// Validate and store one visit document.
    ///
    /// # Errors
    /// Returns [`CarecastError::Validation`] listing every problem, or a
    /// storage error.
    pub fn ingest_visit(&self, doc: &RawRecord) -> Result<(VisitRecord, bool), CarecastError> {
        let visit = VisitRecord::from_document(doc)
            .map_err(|errors| CarecastError::Validation(errors.join("; ")))?;
        let inserted = self
            .sink
            .save_visit(&visit)
            .map_err(|e| CarecastError::Storage(e.into()))?;
        Ok((visit, inserted))
    }

    /// Ingest lists of documents. Invalid documents are collected in the
    /// summary and do not stop the rest; a storage failure does.
    ///
    /// # Errors
    /// Returns a storage error.
    pub fn ingest_all(
        &self,
        patients: &[RawRecord],
        visits: &[RawRecord],
    ) -> Result<IntakeSummary, CarecastError> {
        let mut summary = IntakeSummary::default();

        for (index, doc) in patients.iter().enumerate() {
            match PatientRecord::from_document(doc) {
                Ok(patient) => {
                    let inserted = self
                        .sink
                        .save_patient(&patient)
                        .map_err(|e| CarecastError::Storage(e.into()))?;
                    if inserted {
                        summary.patients_inserted += 1;
                    } else {
                        summary.patients_refreshed += 1;
                    }
                }
                Err(errors) => summary.rejected.push(Rejection {
                    kind: DocumentKind::Patient,
                    index,
                    errors,
                }),
            }
        }

        for (index, doc) in visits.iter().enumerate() {
            match VisitRecord::from_document(doc) {
                Ok(visit) => {
                    let inserted = self
                        .sink
                        .save_visit(&visit)
                        .map_err(|e| CarecastError::Storage(e.into()))?;
                    if inserted {
                        summary.visits_inserted += 1;
                    } else {
                        summary.visits_duplicate += 1;
                    }
                }
                Err(errors) => summary.rejected.push(Rejection {
                    kind: DocumentKind::Visit,
                    index,
                    errors,
                }),
            }
        }

        tracing::info!(
            patients = summary.patients_inserted,
            refreshed = summary.patients_refreshed,
            visits = summary.visits_inserted,
            rejected = summary.rejected.len(),
            "Intake complete"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::SqliteRecordStore;
    use crate::ports::RecordSource;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> RawRecord {
        RawRecord::from_value(value).expect("object")
    }

    #[test]
    fn test_ingest_patient_validation_error() {
        let store = Arc::new(SqliteRecordStore::in_memory().expect("db"));
        let service = IntakeService::new(Arc::clone(&store));

        let err = service
            .ingest_patient(&doc(json!({"patient_id": "P1", "age": 200, "gender": "F", "location": "X"})))
            .expect_err("Should reject");
        assert!(matches!(err, CarecastError::Validation(ref m) if m.contains("between 0 and 150")));
        assert_eq!(store.count_patients().expect("count"), 0);
    }

    #[test]
    fn test_ingest_all_collects_rejections() {
        let store = Arc::new(SqliteRecordStore::in_memory().expect("db"));
        let service = IntakeService::new(Arc::clone(&store));

        let patients = vec![
            doc(json!({"patient_id": "P1", "age": 70, "gender": "Male", "location": "Boston"})),
            doc(json!({"patient_id": "P2", "gender": "Female", "location": "Austin"})),
            doc(json!({"patient_id": "P1", "age": 70, "gender": "Male", "location": "Boston"})),
        ];
        let visits = vec![
            doc(json!({"visit_id": "V1", "patient_id": "P1", "severity_score": "6"})),
            doc(json!({"visit_id": "V1", "patient_id": "P1"})),
            doc(json!({"patient_id": "P1"})),
        ];

        let summary = service.ingest_all(&patients, &visits).expect("ingest");
        assert_eq!(summary.patients_inserted, 1);
        assert_eq!(summary.patients_refreshed, 1);
        assert_eq!(summary.visits_inserted, 1);
        assert_eq!(summary.visits_duplicate, 1);
        assert_eq!(summary.rejected.len(), 2);
        assert_eq!(summary.rejected[0].kind, DocumentKind::Patient);
        assert_eq!(summary.rejected[0].index, 1);
        assert_eq!(summary.rejected[1].kind, DocumentKind::Visit);

        let visits = store.load_visits().expect("load");
        assert_eq!(visits[0].severity_score, Some(6.0));
    }
}
