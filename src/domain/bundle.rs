//! Fitted model bundle: estimators plus the encoder state they were trained
//! with, saved and loaded as one versioned unit.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::prediction::Task;
use crate::ml::{EncoderState, GradientBoostingRegressor, RandomForestClassifier};

const VERSION_FORMAT: &str = "%Y%m%d_%H%M%S_%6f";

/// Sortable bundle version key derived from the creation timestamp
/// (`YYYYmmdd_HHMMSS_ffffff`, UTC). Lexicographic order is chronological.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BundleVersion(String);

impl BundleVersion {
    #[must_use]
    pub fn from_timestamp(created_at: DateTime<Utc>) -> Self {
        Self(created_at.format(VERSION_FORMAT).to_string())
    }

    /// Parse a version string, rejecting anything that is not a timestamp
    /// key (this also keeps path separators out of registry file names).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        NaiveDateTime::parse_from_str(s, VERSION_FORMAT)
            .ok()
            .map(|_| Self(s.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BundleVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Readmission classifier; its encoder state carries the fitted scaler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadmissionModel {
    pub encoder: EncoderState,
    pub classifier: RandomForestClassifier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScoreModel {
    pub encoder: EncoderState,
    pub regressor: GradientBoostingRegressor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressionModel {
    pub encoder: EncoderState,
    pub classifier: RandomForestClassifier,
}

/// Everything needed to serve predictions, frozen once built.
///
/// A task whose training was skipped or failed is `None`; predicting it
/// yields a model-not-ready error.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelBundle {
    pub version: BundleVersion,
    pub created_at: DateTime<Utc>,
    pub readmission: Option<ReadmissionModel>,
    pub risk_score: Option<RiskScoreModel>,
    pub disease_progression: Option<ProgressionModel>,
}

impl ModelBundle {
    #[must_use]
    pub fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            version: BundleVersion::from_timestamp(created_at),
            created_at,
            readmission: None,
            risk_score: None,
            disease_progression: None,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks().is_empty()
    }

    /// Tasks with a fitted model, in canonical order.
    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        Task::ALL
            .into_iter()
            .filter(|task| self.has(*task))
            .collect()
    }

    #[must_use]
    pub fn has(&self, task: Task) -> bool {
        match task {
            Task::Readmission => self.readmission.is_some(),
            Task::RiskScore => self.risk_score.is_some(),
            Task::DiseaseProgression => self.disease_progression.is_some(),
        }
    }
}
