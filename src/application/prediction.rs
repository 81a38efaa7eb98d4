//! Prediction service: serves the three tasks from one loaded model bundle.

use std::sync::Arc;

use ndarray::ArrayView1;

use crate::adapters::RegistryError;
use crate::domain::{
    BatchPrediction, BatchRequest, BundleVersion, ModelBundle, Prediction, ProgressionPrediction,
    RawRecord, ReadmissionPrediction, ReadmissionRisk, RiskScorePrediction, Task, AGE_RANGE,
};
use crate::domain::record::FieldSource;
use crate::ml::forest::argmax;
use crate::ports::ModelRegistry;
use crate::CarecastError;

/// Service for model inference.
///
/// Starts unloaded and moves to loaded exactly once. The loaded bundle is
/// shared immutably, so a loaded service can be used from many threads.
#[derive(Debug, Clone, Default)]
pub struct PredictionService {
    bundle: Option<Arc<ModelBundle>>,
}

impl PredictionService {
    /// Create an unloaded service. Every prediction fails with
    /// [`CarecastError::ModelNotReady`] until a bundle is loaded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_bundle(bundle: ModelBundle) -> Self {
        Self {
            bundle: Some(Arc::new(bundle)),
        }
    }

    /// Load a bundle from `registry`: `version`, or the latest one.
    ///
    /// # Returns
    /// The loaded version, or `None` when the registry holds no bundles and
    /// the service stays unloaded.
    ///
    /// # Errors
    /// Returns [`CarecastError::Validation`] if a bundle is already loaded,
    /// or [`CarecastError::Persistence`] if the bundle cannot be read whole.
    pub fn load<R>(
        &mut self,
        registry: &R,
        version: Option<&BundleVersion>,
    ) -> Result<Option<BundleVersion>, CarecastError>
    where
        R: ModelRegistry,
        R::Error: Into<RegistryError>,
    {
        if let Some(loaded) = &self.bundle {
            return Err(CarecastError::Validation(format!(
                "Model bundle {} is already loaded",
                loaded.version
            )));
        }

        let version = match version {
            Some(v) => v.clone(),
            None => match registry
                .latest_version()
                .map_err(|e| CarecastError::Persistence(e.into()))?
            {
                Some(v) => v,
                None => {
                    tracing::warn!("No saved model bundles, prediction service stays unloaded");
                    return Ok(None);
                }
            },
        };

        let bundle = registry
            .load(&version)
            .map_err(|e| CarecastError::Persistence(e.into()))?;
        tracing::info!(version = %bundle.version, tasks = ?bundle.tasks(), "Loaded model bundle");
        self.bundle = Some(Arc::new(bundle));
        Ok(Some(version))
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.bundle.is_some()
    }

    #[must_use]
    pub fn version(&self) -> Option<&BundleVersion> {
        self.bundle.as_ref().map(|b| &b.version)
    }

    fn bundle(&self, task: Task) -> Result<&ModelBundle, CarecastError> {
        match &self.bundle {
            Some(bundle) if bundle.has(task) => Ok(bundle),
            _ => Err(CarecastError::ModelNotReady { model: task }),
        }
    }

    /// 30-day readmission risk.
    ///
    /// # Errors
    /// `ModelNotReady`, `Validation` for missing fields or an out-of-range
    /// age, `UnknownCategory` for a category unseen in training.
    pub fn predict_readmission(
        &self,
        input: &RawRecord,
    ) -> Result<ReadmissionPrediction, CarecastError> {
        let model = self
            .bundle(Task::Readmission)?
            .readmission
            .as_ref()
            .ok_or(CarecastError::ModelNotReady {
                model: Task::Readmission,
            })?;
        validate(Task::Readmission, input)?;

        let features = model.encoder.transform(input)?;
        let proba = model
            .classifier
            .predict_proba_row(ArrayView1::from(features.as_slice()))?;
        let risk = ReadmissionRisk::from_class(argmax(&proba));
        Ok(ReadmissionPrediction {
            readmission_risk: risk,
            probability: proba.get(1).copied().unwrap_or(0.0),
            recommendation: risk.recommendation().to_string(),
        })
    }

    /// Composite risk score, clipped to 0-100 and categorized.
    ///
    /// # Errors
    /// Same as [`Self::predict_readmission`].
    pub fn predict_risk_score(&self, input: &RawRecord) -> Result<RiskScorePrediction, CarecastError> {
        let model = self
            .bundle(Task::RiskScore)?
            .risk_score
            .as_ref()
            .ok_or(CarecastError::ModelNotReady {
                model: Task::RiskScore,
            })?;
        validate(Task::RiskScore, input)?;

        let features = model.encoder.transform(input)?;
        let raw = model
            .regressor
            .predict_row(ArrayView1::from(features.as_slice()))?;
        Ok(RiskScorePrediction::from_raw_score(raw))
    }

    /// Severity trend for the next visit.
    ///
    /// # Errors
    /// `ModelNotReady` or `Validation` for missing fields.
    pub fn predict_disease_progression(
        &self,
        input: &RawRecord,
    ) -> Result<ProgressionPrediction, CarecastError> {
        let model = self
            .bundle(Task::DiseaseProgression)?
            .disease_progression
            .as_ref()
            .ok_or(CarecastError::ModelNotReady {
                model: Task::DiseaseProgression,
            })?;
        validate(Task::DiseaseProgression, input)?;

        let features = model.encoder.transform(input)?;
        let proba = model
            .classifier
            .predict_proba_row(ArrayView1::from(features.as_slice()))?;
        let mut distribution = [0.0; 3];
        for (slot, p) in distribution.iter_mut().zip(&proba) {
            *slot = *p;
        }
        Ok(ProgressionPrediction::from_distribution(distribution))
    }

    /// Run one task.
    ///
    /// # Errors
    /// Whatever the task's own prediction returns.
    pub fn predict(&self, task: Task, input: &RawRecord) -> Result<Prediction, CarecastError> {
        Ok(match task {
            Task::Readmission => Prediction::Readmission(self.predict_readmission(input)?),
            Task::RiskScore => Prediction::RiskScore(self.predict_risk_score(input)?),
            Task::DiseaseProgression => {
                Prediction::DiseaseProgression(self.predict_disease_progression(input)?)
            }
        })
    }

    /// Run all three tasks; each outcome stands on its own.
    #[must_use]
    pub fn predict_batch(&self, request: &BatchRequest) -> BatchPrediction {
        let batch = BatchPrediction {
            readmission: self.predict_readmission(&request.readmission_input()).into(),
            risk_score: self.predict_risk_score(&request.risk_score_input()).into(),
            disease_progression: self
                .predict_disease_progression(&request.progression_input())
                .into(),
        };
        let failed = batch.failed_tasks();
        if !failed.is_empty() {
            tracing::debug!(failed = ?failed, "Batch prediction had failing tasks");
        }
        batch
    }
}

fn validate(task: Task, input: &RawRecord) -> Result<(), CarecastError> {
    let missing = input.missing_fields(task.required_fields());
    if !missing.is_empty() {
        return Err(CarecastError::Validation(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )));
    }

    if task.required_fields().contains(&"age") {
        match input.numeric("age") {
            Some(age) if age >= *AGE_RANGE.start() as f64 && age <= *AGE_RANGE.end() as f64 => {}
            Some(age) => {
                return Err(CarecastError::Validation(format!(
                    "age must be between 0 and 150, got {age}"
                )))
            }
            None => return Err(CarecastError::Validation("age must be a number".to_string())),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::FsModelRegistry;
    use crate::application::fixtures::{patients, visits};
    use crate::application::trainer::Trainer;
    use crate::config::TrainingConfig;
    use crate::domain::{merge_visits, Outcome};
    use chrono::Utc;
    use serde_json::json;

    fn trained_bundle() -> ModelBundle {
        let patients = patients(40);
        let visits = visits(&patients, true);
        let rows = merge_visits(&patients, &visits);
        let trainer = Trainer::new(TrainingConfig {
            n_estimators: 10,
            ..TrainingConfig::default()
        });

        let mut bundle = ModelBundle::new(Utc::now());
        bundle.readmission = Some(trainer.train_readmission(&rows).expect("readmission").0);
        bundle.risk_score = Some(trainer.train_risk_score(&rows).expect("risk").0);
        bundle.disease_progression = Some(
            trainer
                .train_disease_progression(&visits)
                .expect("progression")
                .0,
        );
        bundle
    }

    fn patient_input() -> RawRecord {
        RawRecord::from_value(json!({
            "age": 65, "gender": "Male", "bmi": 28.5,
            "smoker_status": "yes", "alcohol_use": "no",
            "severity_score": 7, "length_of_stay": 4,
            "previous_visit_gap_days": 45, "number_of_previous_visits": 3
        }))
        .expect("object")
    }

    fn progression_input() -> RawRecord {
        RawRecord::from_value(json!({
            "prev_severity": 5, "length_of_stay": 4,
            "previous_visit_gap_days": 45, "number_of_previous_visits": 3
        }))
        .expect("object")
    }

    #[test]
    fn test_unloaded_service_rejects_every_task() {
        let service = PredictionService::new();
        assert!(!service.is_loaded());
        for task in Task::ALL {
            let err = service.predict(task, &patient_input()).expect_err("unloaded");
            assert!(matches!(err, CarecastError::ModelNotReady { model } if model == task));
            assert!(err.to_string().contains("train_models"));
        }

        let batch = service.predict_batch(&BatchRequest::default());
        assert_eq!(batch.failed_tasks(), Task::ALL.to_vec());
    }

    #[test]
    fn test_predictions_have_expected_shape() {
        let service = PredictionService::from_bundle(trained_bundle());

        let readmission = service.predict_readmission(&patient_input()).expect("readmission");
        assert!((0.0..=1.0).contains(&readmission.probability));
        assert_eq!(
            readmission.recommendation,
            readmission.readmission_risk.recommendation()
        );

        let risk = service.predict_risk_score(&patient_input()).expect("risk");
        assert!((0.0..=100.0).contains(&risk.risk_score));
        assert_eq!(risk.color, risk.category.color());

        let progression = service
            .predict_disease_progression(&progression_input())
            .expect("progression");
        let p = progression.probabilities;
        approx::assert_abs_diff_eq!(p.improving + p.stable + p.worsening, 1.0, epsilon = 1e-9);
        assert!(progression.confidence >= p.improving.max(p.stable).max(p.worsening) - 1e-12);
    }

    #[test]
    fn test_validation_errors() {
        let service = PredictionService::from_bundle(trained_bundle());

        let missing = patient_input().without(&["bmi", "gender"]);
        let err = service.predict_readmission(&missing).expect_err("missing");
        assert!(matches!(err, CarecastError::Validation(ref m) if m.contains("gender, bmi")));

        let old = patient_input().with("age", 151);
        assert!(matches!(
            service.predict_risk_score(&old),
            Err(CarecastError::Validation(_))
        ));

        let null_gender = patient_input().with("gender", serde_json::Value::Null);
        let err = service.predict_readmission(&null_gender).expect_err("null gender");
        assert!(matches!(err, CarecastError::Validation(ref m) if m.contains("gender")));

        let null_smoker = patient_input().with("smoker_status", serde_json::Value::Null);
        assert!(matches!(
            service.predict_risk_score(&null_smoker),
            Err(CarecastError::Validation(ref m)) if m.contains("smoker_status")
        ));

        let unseen = patient_input().with("gender", "Other");
        assert!(matches!(
            service.predict_readmission(&unseen),
            Err(CarecastError::UnknownCategory { ref column, .. }) if column == "gender"
        ));
    }

    #[test]
    fn test_batch_isolates_failures() {
        let service = PredictionService::from_bundle(trained_bundle());
        let request = BatchRequest {
            patient_data: patient_input().without(&["gender"]),
            visit_data: progression_input(),
        };
        let batch = service.predict_batch(&request);
        assert!(matches!(batch.readmission, Outcome::Err { .. }));
        assert!(matches!(batch.risk_score, Outcome::Err { .. }));
        assert!(batch.disease_progression.is_ok());
    }

    #[test]
    fn test_batch_progression_failure_leaves_other_tasks() {
        let service = PredictionService::from_bundle(trained_bundle());
        let request = BatchRequest {
            patient_data: patient_input(),
            visit_data: progression_input().without(&["prev_severity"]),
        };
        let batch = service.predict_batch(&request);
        assert!(batch.readmission.is_ok());
        assert!(batch.risk_score.is_ok());
        assert_eq!(batch.failed_tasks(), vec![Task::DiseaseProgression]);
        assert!(batch
            .disease_progression
            .error()
            .is_some_and(|e| e.contains("prev_severity")));
    }

    #[test]
    fn test_load_from_registry_predicts_identically() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = FsModelRegistry::new(dir.path());

        let mut empty = PredictionService::new();
        assert_eq!(empty.load(&registry, None).expect("load"), None);
        assert!(!empty.is_loaded());

        let bundle = trained_bundle();
        let version = registry.save(&bundle).expect("save");
        let in_memory = PredictionService::from_bundle(bundle);

        let mut loaded = PredictionService::new();
        assert_eq!(loaded.load(&registry, None).expect("load"), Some(version.clone()));
        assert_eq!(loaded.version(), Some(&version));

        assert_eq!(
            loaded.predict_readmission(&patient_input()).expect("loaded"),
            in_memory.predict_readmission(&patient_input()).expect("memory")
        );
        assert_eq!(
            loaded.predict_risk_score(&patient_input()).expect("loaded"),
            in_memory.predict_risk_score(&patient_input()).expect("memory")
        );

        assert!(matches!(
            loaded.load(&registry, Some(&version)),
            Err(CarecastError::Validation(_))
        ));
    }
}
