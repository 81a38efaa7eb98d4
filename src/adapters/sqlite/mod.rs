//! SQLite adapter: record store for patients and visits.
//!
//! Each record is stored as its JSON document next to a few indexed
//! columns. Records are returned in insertion order.
//!
//! # Mutex Behavior
//!
//! The connection is protected by a `Mutex`. A poisoned mutex (from a panic
//! in another thread) is reported as [`StorageError::LockPoisoned`] instead of
//! touching a connection left in an unknown state.
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::domain::{PatientRecord, VisitRecord};
use crate::ports::{RecordSink, RecordSource};

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Record store lock poisoned")]
    LockPoisoned,
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// SQLite record store.
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    /// Returns error if database cannot be opened or initialized.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory SQLite database (for testing).
    ///
    /// # Errors
    /// Returns error if database cannot be created.
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.lock()?;

        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS patients (
                patient_id TEXT PRIMARY KEY,
                document TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS visits (
                visit_id TEXT PRIMARY KEY,
                patient_id TEXT NOT NULL,
                visit_date TEXT,
                document TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_visits_patient
                ON visits(patient_id, visit_date);
            ",
        )?;

        Ok(())
    }

    fn count(&self, table: &str) -> Result<usize, StorageError> {
        let conn = self.lock()?;
        let count: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

impl RecordSource for SqliteRecordStore {
    type Error = StorageError;

    fn load_patients(&self) -> Result<Vec<PatientRecord>, Self::Error> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT document, updated_at FROM patients ORDER BY rowid")?;

        let rows = stmt
            .query_map([], |row| {
                let document: String = row.get(0)?;
                let updated_at: String = row.get(1)?;
                Ok((document, updated_at))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(document, updated_at)| {
                let mut patient: PatientRecord = serde_json::from_str(&document)?;
                if let Ok(ts) = DateTime::parse_from_rfc3339(&updated_at) {
                    patient.updated_at = ts.with_timezone(&Utc);
                }
                Ok(patient)
            })
            .collect()
    }

    fn load_visits(&self) -> Result<Vec<VisitRecord>, Self::Error> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT document FROM visits ORDER BY rowid")?;

        let documents = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        documents
            .iter()
            .map(|doc| serde_json::from_str(doc).map_err(StorageError::from))
            .collect()
    }

    fn count_patients(&self) -> Result<usize, Self::Error> {
        self.count("patients")
    }

    fn count_visits(&self) -> Result<usize, Self::Error> {
        self.count("visits")
    }
}

impl RecordSink for SqliteRecordStore {
    type Error = StorageError;

    fn save_patient(&self, patient: &PatientRecord) -> Result<bool, Self::Error> {
        let document = serde_json::to_string(patient)?;
        let conn = self.lock()?;

        let exists = conn
            .query_row(
                "SELECT 1 FROM patients WHERE patient_id = ?1",
                params![patient.patient_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        if exists {
            conn.execute(
                "UPDATE patients SET updated_at = ?2 WHERE patient_id = ?1",
                params![patient.patient_id, patient.updated_at.to_rfc3339()],
            )?;
            tracing::debug!("Refreshed existing patient record");
            return Ok(false);
        }

        conn.execute(
            r"
            INSERT INTO patients (patient_id, document, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ",
            params![
                patient.patient_id,
                document,
                patient.created_at.to_rfc3339(),
                patient.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(true)
    }

    fn save_visit(&self, visit: &VisitRecord) -> Result<bool, Self::Error> {
        let document = serde_json::to_string(visit)?;
        let conn = self.lock()?;

        let inserted = conn.execute(
            r"
            INSERT INTO visits (visit_id, patient_id, visit_date, document)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(visit_id) DO NOTHING
            ",
            params![
                visit.visit_id,
                visit.patient_id,
                visit.visit_date.map(|d| d.format("%Y-%m-%dT%H:%M:%S").to_string()),
                document,
            ],
        )?;
        Ok(inserted == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_patient_upsert_only_touches_updated_at() {
        let store = SqliteRecordStore::in_memory().expect("Should create db");
        assert_eq!(store.count_patients().expect("Should count"), 0);

        let patient = PatientRecord::new("P001", 65, "Male", "Boston")
            .with_lifestyle(Some(28.5), Some("yes"), Some("no"));
        assert!(store.save_patient(&patient).expect("Should save"));

        let mut changed = PatientRecord::new("P001", 30, "Female", "Denver");
        changed.updated_at = patient.updated_at + Duration::hours(1);
        assert!(!store.save_patient(&changed).expect("Should save"));

        let loaded = store.load_patients().expect("Should load");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].age, 65);
        assert_eq!(loaded[0].gender, "Male");
        assert_eq!(loaded[0].bmi, Some(28.5));
        assert_eq!(loaded[0].updated_at, changed.updated_at);
    }

    #[test]
    fn test_visits_are_append_only() {
        let store = SqliteRecordStore::in_memory().expect("Should create db");

        let mut visit = VisitRecord::new("V1", "P001");
        visit.severity_score = Some(7.0);
        assert!(store.save_visit(&visit).expect("Should save"));

        visit.severity_score = Some(2.0);
        assert!(!store.save_visit(&visit).expect("Should save"));
        assert!(store.save_visit(&VisitRecord::new("V2", "P001")).expect("Should save"));

        let loaded = store.load_visits().expect("Should load");
        assert_eq!(store.count_visits().expect("Should count"), 2);
        assert_eq!(loaded[0].visit_id, "V1");
        assert_eq!(loaded[0].severity_score, Some(7.0));
        assert_eq!(loaded[1].visit_id, "V2");
    }

    #[test]
    fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("records.db");
        {
            let store = SqliteRecordStore::new(&path).expect("Should open");
            store
                .save_patient(&PatientRecord::new("P9", 40, "Female", "Austin"))
                .expect("Should save");
        }
        let reopened = SqliteRecordStore::new(&path).expect("Should reopen");
        assert_eq!(reopened.count_patients().expect("Should count"), 1);
    }
}
