//! Per-task training procedures and their evaluation reports.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::TrainingConfig;
use crate::domain::{
    MergedRow, ProgressionModel, ReadmissionModel, RiskScoreModel, Task, VisitRecord,
};
use crate::ml::forest::argmax;
use crate::ml::labels::{self, LabelSource};
use crate::ml::metrics::{self, FeatureImportance};
use crate::ml::split::{self, Split};
use crate::ml::{
    BoostingParams, ClassWeight, FeatureEncoder, FeatureSpec, ForestParams,
    GradientBoostingRegressor, RandomForestClassifier, Smote, StandardScaler,
};
use crate::CarecastError;

/// Model inputs of the readmission classifier, in column order.
#[must_use]
pub fn readmission_features() -> Vec<FeatureSpec> {
    vec![
        FeatureSpec::numeric("age"),
        FeatureSpec::categorical("gender"),
        FeatureSpec::numeric("bmi"),
        FeatureSpec::categorical("smoker_status"),
        FeatureSpec::categorical("alcohol_use"),
        FeatureSpec::numeric("severity_score"),
        FeatureSpec::numeric("length_of_stay"),
        FeatureSpec::numeric("previous_visit_gap_days"),
        FeatureSpec::numeric("number_of_previous_visits"),
    ]
}

/// Model inputs of the risk regressor: the readmission inputs without the
/// visit gap.
#[must_use]
pub fn risk_score_features() -> Vec<FeatureSpec> {
    readmission_features()
        .into_iter()
        .filter(|f| f.name != "previous_visit_gap_days")
        .collect()
}

#[must_use]
pub fn progression_features() -> Vec<FeatureSpec> {
    vec![
        FeatureSpec::numeric("prev_severity"),
        FeatureSpec::numeric("length_of_stay"),
        FeatureSpec::numeric("previous_visit_gap_days"),
        FeatureSpec::numeric("number_of_previous_visits"),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskMetrics {
    Classification { accuracy: f64, roc_auc: Option<f64> },
    Regression { mse: f64, r2: f64 },
}

/// Minority oversampling outcome for the readmission training split.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImbalanceCorrection {
    Oversampled { synthesized: usize },
    /// Training continued on the unbalanced split
    Skipped { reason: String },
}

/// Evaluation summary of one trained task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskReport {
    pub task: Task,
    pub n_samples: usize,
    pub n_train: usize,
    pub n_test: usize,
    pub stratified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_source: Option<LabelSource>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub label_distribution: BTreeMap<usize, usize>,
    pub metrics: TaskMetrics,
    pub feature_importances: Vec<FeatureImportance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imbalance_correction: Option<ImbalanceCorrection>,
}

/// Runs the three training procedures with one configuration.
#[derive(Debug, Clone)]
pub struct Trainer {
    config: TrainingConfig,
}

impl Trainer {
    #[must_use]
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    fn require_rows(&self, task: Task, rows: usize) -> Result<(), CarecastError> {
        if rows < self.config.min_training_rows {
            return Err(CarecastError::TrainingDataInsufficient {
                task: task.to_string(),
                reason: format!(
                    "{rows} usable rows, need at least {}",
                    self.config.min_training_rows
                ),
            });
        }
        Ok(())
    }

    fn forest_params(&self, max_depth: usize) -> ForestParams {
        ForestParams {
            n_estimators: self.config.n_estimators,
            max_depth,
            class_weight: ClassWeight::Balanced,
            bootstrap: true,
            seed: self.config.seed,
        }
    }

    /// Scaler, SMOTE on the training split, balanced random forest.
    ///
    /// # Errors
    /// Returns [`CarecastError::TrainingDataInsufficient`] for too few rows,
    /// or an estimator error.
    pub fn train_readmission(
        &self,
        rows: &[MergedRow<'_>],
    ) -> Result<(ReadmissionModel, TaskReport), CarecastError> {
        self.require_rows(Task::Readmission, rows.len())?;

        let (x, encoder) = FeatureEncoder::fit_transform(rows, &readmission_features())?;
        let (y, label_source) = labels::readmission_labels(rows, &encoder);
        if label_source == LabelSource::SyntheticHeuristic {
            warn!("No readmission ground truth in visits, using severity/stay heuristic labels");
        }

        let split = split::stratified_split(&y, self.config.test_size, self.config.seed)?;
        let y_train = split::take(&y, &split.train);
        let y_test = split::take(&y, &split.test);

        let scaler = StandardScaler::fit(&split::take_rows(&x, &split.train))?;
        let x_train = scaler.transform(&split::take_rows(&x, &split.train))?;
        let x_test = scaler.transform(&split::take_rows(&x, &split.test))?;

        let smote = Smote::new(self.config.smote_k_neighbors, self.config.seed);
        let (x_fit, y_fit, correction) = match smote.fit_resample(&x_train, &y_train) {
            Ok(resampled) => {
                let synthesized = resampled.synthesized;
                (
                    resampled.x,
                    resampled.y,
                    ImbalanceCorrection::Oversampled { synthesized },
                )
            }
            Err(e) => {
                warn!(error = %e, "SMOTE failed, training on the unbalanced split");
                (
                    x_train,
                    y_train,
                    ImbalanceCorrection::Skipped {
                        reason: e.to_string(),
                    },
                )
            }
        };

        let classifier = RandomForestClassifier::fit(
            &self.forest_params(self.config.readmission_max_depth),
            &x_fit,
            &y_fit,
            2,
        )?;

        let proba = classifier.predict_proba(&x_test)?;
        let predicted: Vec<usize> = proba
            .rows()
            .into_iter()
            .map(|row| argmax(&row.to_vec()))
            .collect();
        let positive: Vec<f64> = proba.column(1).to_vec();
        let metrics = TaskMetrics::Classification {
            accuracy: metrics::accuracy(&y_test, &predicted),
            roc_auc: metrics::roc_auc(&y_test, &positive),
        };

        let report = base_report(
            Task::Readmission,
            &split,
            metrics,
            metrics::rank_importances(&encoder.feature_names(), &classifier.feature_importances()),
        );
        let report = TaskReport {
            label_source: Some(label_source),
            label_distribution: labels::label_distribution(&y),
            imbalance_correction: Some(correction),
            ..report
        };
        log_report(&report);

        let model = ReadmissionModel {
            encoder: encoder.with_scaler(scaler),
            classifier,
        };
        Ok((model, report))
    }

    /// Gradient boosting on the synthesized composite risk target, unscaled.
    ///
    /// # Errors
    /// Returns [`CarecastError::TrainingDataInsufficient`] for too few rows,
    /// or an estimator error.
    pub fn train_risk_score(
        &self,
        rows: &[MergedRow<'_>],
    ) -> Result<(RiskScoreModel, TaskReport), CarecastError> {
        self.require_rows(Task::RiskScore, rows.len())?;

        let (x, encoder) = FeatureEncoder::fit_transform(rows, &risk_score_features())?;
        let y = labels::risk_score_targets(rows, &encoder);

        let split = split::train_test_split(rows.len(), self.config.test_size, self.config.seed)?;
        let regressor = GradientBoostingRegressor::fit(
            &BoostingParams {
                n_estimators: self.config.n_estimators,
                max_depth: self.config.risk_max_depth,
                learning_rate: self.config.learning_rate,
                seed: self.config.seed,
            },
            &split::take_rows(&x, &split.train),
            &split::take(&y, &split.train),
        )?;

        let y_test = split::take(&y, &split.test);
        let predicted = regressor.predict(&split::take_rows(&x, &split.test))?;
        let metrics = TaskMetrics::Regression {
            mse: metrics::mean_squared_error(&y_test, &predicted),
            r2: metrics::r2_score(&y_test, &predicted),
        };

        let report = base_report(
            Task::RiskScore,
            &split,
            metrics,
            metrics::rank_importances(&encoder.feature_names(), &regressor.feature_importances()),
        );
        log_report(&report);

        Ok((RiskScoreModel { encoder, regressor }, report))
    }

    /// Balanced random forest over consecutive-visit trend rows.
    ///
    /// # Errors
    /// Returns [`CarecastError::TrainingDataInsufficient`] when there are
    /// too few visits or trend rows, or an estimator error.
    pub fn train_disease_progression(
        &self,
        visits: &[VisitRecord],
    ) -> Result<(ProgressionModel, TaskReport), CarecastError> {
        if visits.len() <= self.config.min_progression_visits {
            return Err(CarecastError::TrainingDataInsufficient {
                task: Task::DiseaseProgression.to_string(),
                reason: format!(
                    "{} visits, need more than {}",
                    visits.len(),
                    self.config.min_progression_visits
                ),
            });
        }

        let rows = labels::progression_rows(visits);
        self.require_rows(Task::DiseaseProgression, rows.len())?;

        let (x, encoder) = FeatureEncoder::fit_transform(&rows, &progression_features())?;
        let y = labels::progression_labels(&rows);

        let split = split::stratified_split(&y, self.config.test_size, self.config.seed)?;
        let classifier = RandomForestClassifier::fit(
            &self.forest_params(self.config.progression_max_depth),
            &split::take_rows(&x, &split.train),
            &split::take(&y, &split.train),
            3,
        )?;

        let y_test = split::take(&y, &split.test);
        let predicted = classifier.predict(&split::take_rows(&x, &split.test))?;
        let metrics = TaskMetrics::Classification {
            accuracy: metrics::accuracy(&y_test, &predicted),
            roc_auc: None,
        };

        let report = base_report(
            Task::DiseaseProgression,
            &split,
            metrics,
            metrics::rank_importances(&encoder.feature_names(), &classifier.feature_importances()),
        );
        let report = TaskReport {
            label_distribution: labels::label_distribution(&y),
            ..report
        };
        log_report(&report);

        Ok((ProgressionModel { encoder, classifier }, report))
    }
}

fn base_report(
    task: Task,
    split: &Split,
    metrics: TaskMetrics,
    feature_importances: Vec<FeatureImportance>,
) -> TaskReport {
    TaskReport {
        task,
        n_samples: split.train.len() + split.test.len(),
        n_train: split.train.len(),
        n_test: split.test.len(),
        stratified: split.stratified,
        label_source: None,
        label_distribution: BTreeMap::new(),
        metrics,
        feature_importances,
        imbalance_correction: None,
    }
}

fn log_report(report: &TaskReport) {
    let top = report
        .feature_importances
        .first()
        .map_or("-", |f| f.feature.as_str());
    match &report.metrics {
        TaskMetrics::Classification { accuracy, roc_auc } => info!(
            task = %report.task,
            n_train = report.n_train,
            n_test = report.n_test,
            accuracy,
            roc_auc = roc_auc.unwrap_or(f64::NAN),
            top_feature = top,
            "Model trained"
        ),
        TaskMetrics::Regression { mse, r2 } => info!(
            task = %report.task,
            n_train = report.n_train,
            n_test = report.n_test,
            mse,
            r2,
            top_feature = top,
            "Model trained"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::fixtures::{patients, visits};
    use crate::domain::{merge_visits, ReadmissionFlag};

    fn small_config() -> TrainingConfig {
        TrainingConfig {
            n_estimators: 10,
            ..TrainingConfig::default()
        }
    }

    #[test]
    fn test_feature_sets() {
        assert_eq!(readmission_features().len(), 9);
        let risk: Vec<String> = risk_score_features().into_iter().map(|f| f.name).collect();
        assert_eq!(risk.len(), 8);
        assert!(!risk.contains(&"previous_visit_gap_days".to_string()));
        assert_eq!(progression_features()[0].name, "prev_severity");
    }

    #[test]
    fn test_train_readmission_with_ground_truth() {
        let patients = patients(40);
        let visits = visits(&patients, true);
        let rows = merge_visits(&patients, &visits);

        let trainer = Trainer::new(small_config());
        let (model, report) = trainer.train_readmission(&rows).expect("train");

        assert_eq!(report.n_samples, 120);
        assert!(report.stratified);
        assert_eq!(report.label_source, Some(LabelSource::GroundTruth));
        assert!(matches!(
            report.imbalance_correction,
            Some(ImbalanceCorrection::Oversampled { synthesized }) if synthesized > 0
        ));
        assert!(matches!(report.metrics, TaskMetrics::Classification { roc_auc: Some(_), .. }));
        assert_eq!(report.feature_importances.len(), 9);
        assert!(model.encoder.scaler().is_some());
        assert_eq!(model.classifier.n_classes(), 2);
    }

    #[test]
    fn test_smote_failure_is_not_fatal() {
        let patients = patients(20);
        let mut visits = visits(&patients, true);
        // a single readmitted visit leaves too few minority samples for SMOTE
        for (i, v) in visits.iter_mut().enumerate() {
            v.readmitted_within_30_days = if i == 0 || i == 1 {
                ReadmissionFlag::Yes
            } else {
                ReadmissionFlag::No
            };
        }
        let rows = merge_visits(&patients, &visits);
        let (_, report) = Trainer::new(small_config())
            .train_readmission(&rows)
            .expect("train");
        assert!(matches!(
            report.imbalance_correction,
            Some(ImbalanceCorrection::Skipped { .. })
        ));
    }

    #[test]
    fn test_train_risk_score_has_unscaled_encoder() {
        let patients = patients(40);
        let visits = visits(&patients, false);
        let rows = merge_visits(&patients, &visits);

        let (model, report) = Trainer::new(small_config())
            .train_risk_score(&rows)
            .expect("train");
        assert!(model.encoder.scaler().is_none());
        assert_eq!(report.n_test, 24);
        assert!(matches!(report.metrics, TaskMetrics::Regression { .. }));
        assert_eq!(report.feature_importances.len(), 8);
    }

    #[test]
    fn test_train_progression() {
        let patients = patients(40);
        let visits = visits(&patients, false);

        let (model, report) = Trainer::new(small_config())
            .train_disease_progression(&visits)
            .expect("train");
        assert_eq!(report.n_samples, 80);
        assert_eq!(model.classifier.n_classes(), 3);
        assert_eq!(report.label_distribution.values().sum::<usize>(), 80);
    }

    #[test]
    fn test_progression_needs_more_than_minimum_visits() {
        let patients = patients(7);
        let visits = visits(&patients, false);
        assert_eq!(visits.len(), 21);
        let config = TrainingConfig {
            min_progression_visits: 21,
            ..small_config()
        };
        assert!(matches!(
            Trainer::new(config).train_disease_progression(&visits),
            Err(CarecastError::TrainingDataInsufficient { .. })
        ));
    }

    #[test]
    fn test_too_few_rows() {
        let patients = patients(2);
        let visits = visits(&patients, true);
        let rows = merge_visits(&patients, &visits);
        assert!(matches!(
            Trainer::new(small_config()).train_readmission(&rows),
            Err(CarecastError::TrainingDataInsufficient { .. })
        ));
    }
}
