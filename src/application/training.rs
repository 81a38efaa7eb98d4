//! Training run: load records, fill in synthetic visits when the store is
//! sparse, train all three tasks, persist the bundle and smoke-test it.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};

use super::prediction::PredictionService;
use super::synthetic;
use super::trainer::{TaskReport, Trainer};
use crate::adapters::{RegistryError, StorageError};
use crate::config::TrainingConfig;
use crate::domain::{
    merge_visits, BatchPrediction, BatchRequest, BundleVersion, ModelBundle, RawRecord, Task,
};
use crate::ports::{ModelRegistry, RecordSource};
use crate::CarecastError;

/// Per-task result of a training run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskStatus {
    Trained(TaskReport),
    /// Not enough data for this task
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    pub n_patients: usize,
    pub n_visits: usize,
    /// Visits generated for this run; they replaced the stored ones
    pub synthesized_visits: usize,
    pub tasks: BTreeMap<Task, TaskStatus>,
    /// Saved version, absent when nothing was trained or the save failed
    pub version: Option<BundleVersion>,
    pub persistence_error: Option<String>,
    pub smoke_test: Option<BatchPrediction>,
}

impl TrainingReport {
    /// Some task or the save failed outright. Skipped tasks do not count.
    #[must_use]
    pub fn is_partial_failure(&self) -> bool {
        self.persistence_error.is_some()
            || self
                .tasks
                .values()
                .any(|status| matches!(status, TaskStatus::Failed { .. }))
    }
}

/// Request used to smoke-test a freshly trained bundle.
#[must_use]
pub fn smoke_test_request() -> BatchRequest {
    let record = |value: serde_json::Value| RawRecord::from_value(value).unwrap_or_default();
    BatchRequest {
        patient_data: record(json!({
            "age": 65,
            "gender": "Male",
            "bmi": 28.5,
            "smoker_status": "yes",
            "alcohol_use": "no",
        })),
        visit_data: record(json!({
            "severity_score": 7,
            "length_of_stay": 4,
            "previous_visit_gap_days": 45,
            "number_of_previous_visits": 3,
            "prev_severity": 5,
        })),
    }
}

/// Service for offline training runs.
pub struct TrainingService<S, R>
where
    S: RecordSource,
    R: ModelRegistry,
{
    records: Arc<S>,
    registry: Arc<R>,
    config: TrainingConfig,
}

impl<S, R> TrainingService<S, R>
where
    S: RecordSource,
    S::Error: Into<StorageError>,
    R: ModelRegistry,
    R::Error: Into<RegistryError>,
{
    pub fn new(records: Arc<S>, registry: Arc<R>, config: TrainingConfig) -> Self {
        Self {
            records,
            registry,
            config,
        }
    }

    /// Run the full pipeline once.
    ///
    /// Task failures and a failed save are recorded in the report rather
    /// than returned.
    ///
    /// # Errors
    /// Returns [`CarecastError::TrainingDataInsufficient`] when there are
    /// fewer patients than the configured minimum, or a storage error if the
    /// records cannot be loaded.
    pub fn run(&self) -> Result<TrainingReport, CarecastError> {
        let patients = self
            .records
            .load_patients()
            .map_err(|e| CarecastError::Storage(e.into()))?;
        let mut visits = self
            .records
            .load_visits()
            .map_err(|e| CarecastError::Storage(e.into()))?;
        info!(patients = patients.len(), visits = visits.len(), "Loaded records");

        if patients.len() < self.config.min_patients {
            return Err(CarecastError::TrainingDataInsufficient {
                task: "training run".to_string(),
                reason: format!(
                    "{} patients, need at least {}",
                    patients.len(),
                    self.config.min_patients
                ),
            });
        }

        let mut synthesized_visits = 0;
        if synthetic::should_synthesize(&self.config.synthesis, patients.len(), visits.len()) {
            warn!(
                real_visits = visits.len(),
                "Too few visits, training on synthetic visit history"
            );
            visits = synthetic::synthesize_visits(
                &patients,
                &self.config.synthesis,
                Utc::now(),
                self.config.seed,
            );
            synthesized_visits = visits.len();
        }

        let trainer = Trainer::new(self.config.clone());
        let rows = merge_visits(&patients, &visits);
        let mut bundle = ModelBundle::new(Utc::now());
        let mut tasks = BTreeMap::new();

        tasks.insert(
            Task::Readmission,
            status(Task::Readmission, trainer.train_readmission(&rows), |m| {
                bundle.readmission = Some(m);
            }),
        );
        tasks.insert(
            Task::RiskScore,
            status(Task::RiskScore, trainer.train_risk_score(&rows), |m| {
                bundle.risk_score = Some(m);
            }),
        );
        tasks.insert(
            Task::DiseaseProgression,
            status(
                Task::DiseaseProgression,
                trainer.train_disease_progression(&visits),
                |m| bundle.disease_progression = Some(m),
            ),
        );

        let mut report = TrainingReport {
            n_patients: patients.len(),
            n_visits: visits.len(),
            synthesized_visits,
            tasks,
            version: None,
            persistence_error: None,
            smoke_test: None,
        };

        if bundle.is_empty() {
            warn!("No task produced a model, nothing to save");
            return Ok(report);
        }

        match self.registry.save(&bundle) {
            Ok(version) => {
                info!(%version, tasks = ?bundle.tasks(), "Saved model bundle");
                report.version = Some(version);
            }
            Err(e) => {
                let e: RegistryError = e.into();
                error!(error = %e, "Failed to save model bundle");
                report.persistence_error = Some(e.to_string());
            }
        }

        let service = PredictionService::from_bundle(bundle);
        let smoke = service.predict_batch(&smoke_test_request());
        for task in smoke.failed_tasks() {
            warn!(%task, "Smoke-test prediction failed");
        }
        report.smoke_test = Some(smoke);

        Ok(report)
    }
}

fn status<M>(
    task: Task,
    result: Result<(M, TaskReport), CarecastError>,
    store: impl FnOnce(M),
) -> TaskStatus {
    match result {
        Ok((model, report)) => {
            store(model);
            TaskStatus::Trained(report)
        }
        Err(CarecastError::TrainingDataInsufficient { reason, .. }) => {
            warn!(%task, %reason, "Skipping task");
            TaskStatus::Skipped { reason }
        }
        Err(e) => {
            error!(%task, error = %e, "Task training failed");
            TaskStatus::Failed {
                error: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{FsModelRegistry, SqliteRecordStore};
    use crate::application::fixtures::{patients, visits};
    use crate::config::SynthesisConfig;
    use crate::ports::RecordSink;

    fn config() -> TrainingConfig {
        TrainingConfig {
            n_estimators: 5,
            ..TrainingConfig::default()
        }
    }

    fn store_with(n_patients: usize, with_visits: bool) -> Arc<SqliteRecordStore> {
        let store = SqliteRecordStore::in_memory().expect("db");
        let patients = patients(n_patients);
        for p in &patients {
            store.save_patient(p).expect("patient");
        }
        if with_visits {
            for v in &visits(&patients, true) {
                store.save_visit(v).expect("visit");
            }
        }
        Arc::new(store)
    }

    #[test]
    fn test_smoke_test_request_fields() {
        let request = smoke_test_request();
        assert!(request
            .readmission_input()
            .missing_fields(Task::Readmission.required_fields())
            .is_empty());
        assert!(request
            .progression_input()
            .missing_fields(Task::DiseaseProgression.required_fields())
            .is_empty());
    }

    #[test]
    fn test_full_run_on_real_visits() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = Arc::new(FsModelRegistry::new(dir.path()));
        let service = TrainingService::new(store_with(110, true), Arc::clone(&registry), config());

        let report = service.run().expect("run");
        assert_eq!(report.synthesized_visits, 0);
        assert_eq!(report.n_visits, 330);
        assert!(report
            .tasks
            .values()
            .all(|s| matches!(s, TaskStatus::Trained(_))));
        assert!(!report.is_partial_failure());

        let version = report.version.clone().expect("saved");
        assert_eq!(registry.latest_version().expect("list"), Some(version));

        let smoke = report.smoke_test.expect("smoke test");
        assert!(smoke.failed_tasks().is_empty());
    }

    #[test]
    fn test_sparse_store_gets_synthetic_visits() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = Arc::new(FsModelRegistry::new(dir.path()));
        let service = TrainingService::new(store_with(120, false), registry, config());

        let report = service.run().expect("run");
        assert!(report.synthesized_visits >= 120);
        assert_eq!(report.n_visits, report.synthesized_visits);
        assert!(report.version.is_some());
    }

    #[test]
    fn test_sparse_store_without_synthesis_skips_tasks() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = Arc::new(FsModelRegistry::new(dir.path()));
        let config = TrainingConfig {
            synthesis: SynthesisConfig {
                enabled: false,
                ..SynthesisConfig::default()
            },
            ..config()
        };
        let service = TrainingService::new(store_with(120, false), registry, config);

        let report = service.run().expect("run");
        assert!(report
            .tasks
            .values()
            .all(|s| matches!(s, TaskStatus::Skipped { .. })));
        assert!(report.version.is_none());
        assert!(report.smoke_test.is_none());
        assert!(!report.is_partial_failure());
    }

    #[test]
    fn test_too_few_patients() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = Arc::new(FsModelRegistry::new(dir.path()));
        let service = TrainingService::new(store_with(50, true), registry, config());
        assert!(matches!(
            service.run(),
            Err(CarecastError::TrainingDataInsufficient { .. })
        ));
    }
}
