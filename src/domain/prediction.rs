//! Prediction tasks and their domain-level results.

use serde::{Deserialize, Serialize};

use super::record::RawRecord;

/// The three prediction tasks served by a model bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    Readmission,
    RiskScore,
    DiseaseProgression,
}

impl Task {
    pub const ALL: [Task; 3] = [Task::Readmission, Task::RiskScore, Task::DiseaseProgression];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Readmission => "readmission",
            Self::RiskScore => "risk_score",
            Self::DiseaseProgression => "disease_progression",
        }
    }

    /// Fields a request must carry for this task. Any request missing one of
    /// these fails fast.
    #[must_use]
    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            Self::Readmission => &[
                "age",
                "gender",
                "bmi",
                "smoker_status",
                "alcohol_use",
                "severity_score",
                "length_of_stay",
                "previous_visit_gap_days",
                "number_of_previous_visits",
            ],
            Self::RiskScore => &[
                "age",
                "gender",
                "bmi",
                "smoker_status",
                "alcohol_use",
                "severity_score",
                "length_of_stay",
                "number_of_previous_visits",
            ],
            Self::DiseaseProgression => &[
                "prev_severity",
                "length_of_stay",
                "previous_visit_gap_days",
                "number_of_previous_visits",
            ],
        }
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Task {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "readmission" => Ok(Self::Readmission),
            "risk_score" | "risk" => Ok(Self::RiskScore),
            "disease_progression" | "progression" => Ok(Self::DiseaseProgression),
            other => Err(format!("unknown task: {other}")),
        }
    }
}

/// Binary 30-day readmission outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadmissionRisk {
    High,
    Low,
}

impl ReadmissionRisk {
    #[must_use]
    pub fn from_class(class: usize) -> Self {
        if class == 1 {
            Self::High
        } else {
            Self::Low
        }
    }

    /// Fixed care recommendation for this outcome.
    #[must_use]
    pub fn recommendation(&self) -> &'static str {
        match self {
            Self::High => "Close monitoring required",
            Self::Low => "Standard care protocol",
        }
    }
}

/// Composite risk category derived from a 0-100 risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    /// Score below 30
    Low,
    /// Score from 30 up to 60
    Moderate,
    /// Score of 60 and above
    High,
}

impl RiskLevel {
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score < 30.0 {
            Self::Low
        } else if score < 60.0 {
            Self::Moderate
        } else {
            Self::High
        }
    }

    /// Color tag used by dashboards.
    #[must_use]
    pub fn color(&self) -> &'static str {
        match self {
            Self::Low => "green",
            Self::Moderate => "yellow",
            Self::High => "red",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "Low Risk"),
            Self::Moderate => write!(f, "Moderate Risk"),
            Self::High => write!(f, "High Risk"),
        }
    }
}

/// Severity trend between consecutive visits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Progression {
    Improving = 0,
    Stable = 1,
    Worsening = 2,
}

impl Progression {
    pub const ALL: [Progression; 3] = [Self::Improving, Self::Stable, Self::Worsening];

    /// Bucket a severity change: `(-inf, -1]` improving, `(-1, 1]` stable,
    /// `(1, inf)` worsening.
    #[must_use]
    pub fn from_change(severity_change: f64) -> Self {
        if severity_change <= -1.0 {
            Self::Improving
        } else if severity_change <= 1.0 {
            Self::Stable
        } else {
            Self::Worsening
        }
    }

    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for Progression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Improving => write!(f, "Improving"),
            Self::Stable => write!(f, "Stable"),
            Self::Worsening => write!(f, "Worsening"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadmissionPrediction {
    pub readmission_risk: ReadmissionRisk,
    /// Probability of readmission (class 1), 0.0 to 1.0
    pub probability: f64,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScorePrediction {
    /// Clipped to 0-100
    pub risk_score: f64,
    pub category: RiskLevel,
    pub color: String,
}

impl RiskScorePrediction {
    /// Build from a raw regressor output, clipping to [0, 100].
    #[must_use]
    pub fn from_raw_score(raw: f64) -> Self {
        let risk_score = raw.clamp(0.0, 100.0);
        let category = RiskLevel::from_score(risk_score);
        Self {
            risk_score,
            category,
            color: category.color().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressionProbabilities {
    pub improving: f64,
    pub stable: f64,
    pub worsening: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressionPrediction {
    pub progression: Progression,
    /// Probability of the predicted class
    pub confidence: f64,
    pub probabilities: ProgressionProbabilities,
}

impl ProgressionPrediction {
    /// Build from a three-class probability distribution (arg-max wins, ties
    /// go to the lower class index).
    #[must_use]
    pub fn from_distribution(probabilities: [f64; 3]) -> Self {
        let mut best = 0;
        for (i, p) in probabilities.iter().enumerate() {
            if *p > probabilities[best] {
                best = i;
            }
        }
        Self {
            progression: Progression::ALL[best],
            confidence: probabilities[best],
            probabilities: ProgressionProbabilities {
                improving: probabilities[0],
                stable: probabilities[1],
                worsening: probabilities[2],
            },
        }
    }
}

/// Any single-task prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum Prediction {
    Readmission(ReadmissionPrediction),
    RiskScore(RiskScorePrediction),
    DiseaseProgression(ProgressionPrediction),
}

/// Per-task result inside an aggregate response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Outcome<T> {
    Ok(T),
    Err { error: String },
}

impl<T> Outcome<T> {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    #[must_use]
    pub fn ok(&self) -> Option<&T> {
        match self {
            Self::Ok(v) => Some(v),
            Self::Err { .. } => None,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Ok(_) => None,
            Self::Err { error } => Some(error),
        }
    }
}

impl<T, E: std::fmt::Display> From<Result<T, E>> for Outcome<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(v) => Self::Ok(v),
            Err(e) => Self::Err {
                error: e.to_string(),
            },
        }
    }
}

/// Combined input for running all three tasks at once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    #[serde(default)]
    pub patient_data: RawRecord,
    #[serde(default)]
    pub visit_data: RawRecord,
}

impl BatchRequest {
    /// Patient and visit fields combined.
    #[must_use]
    pub fn readmission_input(&self) -> RawRecord {
        self.patient_data.merged(&self.visit_data)
    }

    /// Patient and visit fields, minus the trend-only visit fields.
    #[must_use]
    pub fn risk_score_input(&self) -> RawRecord {
        self.patient_data.merged(
            &self
                .visit_data
                .without(&["prev_severity", "previous_visit_gap_days"]),
        )
    }

    #[must_use]
    pub fn progression_input(&self) -> RawRecord {
        self.visit_data.clone()
    }
}

/// Aggregate response: each task succeeds or fails on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPrediction {
    pub readmission: Outcome<ReadmissionPrediction>,
    pub risk_score: Outcome<RiskScorePrediction>,
    pub disease_progression: Outcome<ProgressionPrediction>,
}

impl BatchPrediction {
    #[must_use]
    pub fn failed_tasks(&self) -> Vec<Task> {
        let mut failed = Vec::new();
        if !self.readmission.is_ok() {
            failed.push(Task::Readmission);
        }
        if !self.risk_score.is_ok() {
            failed.push(Task::RiskScore);
        }
        if !self.disease_progression.is_ok() {
            failed.push(Task::DiseaseProgression);
        }
        failed
    }
}
