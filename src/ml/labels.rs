//! Target construction for the three tasks.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::EncoderState;
use crate::domain::frame::{MergedRow, ProgressionRow};
use crate::domain::prediction::Progression;
use crate::domain::record::FieldSource;
use crate::domain::VisitRecord;

/// Where the readmission labels came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelSource {
    GroundTruth,
    /// Severity/length-of-stay rule; used only when no visit carries a
    /// readmission flag at all.
    SyntheticHeuristic,
}

/// Heuristic readmission label: severe and long stays count as readmitted.
#[must_use]
pub fn synthetic_readmission_label(severity_score: f64, length_of_stay: f64) -> usize {
    usize::from(severity_score > 7.0 && length_of_stay > 5.0)
}

/// Binary readmission labels for the merged frame.
///
/// If any visit carries the readmission field the column is treated as
/// present and every row uses its flag (unrecognized values count as 0).
/// Otherwise the heuristic is applied to the imputed severity and stay.
#[must_use]
pub fn readmission_labels(rows: &[MergedRow<'_>], state: &EncoderState) -> (Vec<usize>, LabelSource) {
    let has_ground_truth = rows
        .iter()
        .any(|row| row.visit.readmitted_within_30_days.is_present());

    if has_ground_truth {
        let labels = rows
            .iter()
            .map(|row| row.visit.readmitted_within_30_days.label())
            .collect();
        return (labels, LabelSource::GroundTruth);
    }

    let labels = rows
        .iter()
        .map(|row| {
            synthetic_readmission_label(
                state.numeric_value(row, "severity_score"),
                state.numeric_value(row, "length_of_stay"),
            )
        })
        .collect();
    (labels, LabelSource::SyntheticHeuristic)
}

/// Whether a lifestyle answer counts as "yes" (smoker, drinks alcohol).
#[must_use]
pub fn is_affirmative(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "yes" | "y" | "true" | "1" | "current" | "smoker"
    )
}

/// Inputs of the composite risk formula, after imputation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskComponents {
    pub age: f64,
    pub severity_score: f64,
    pub smoker: bool,
    pub alcohol: bool,
    pub number_of_previous_visits: f64,
}

impl RiskComponents {
    /// Gather the formula inputs from a row, imputing numerics from `state`.
    #[must_use]
    pub fn compute<R: FieldSource + ?Sized>(row: &R, state: &EncoderState) -> Self {
        Self {
            age: state.numeric_value(row, "age"),
            severity_score: state.numeric_value(row, "severity_score"),
            smoker: row
                .category("smoker_status")
                .is_some_and(|v| is_affirmative(&v)),
            alcohol: row.category("alcohol_use").is_some_and(|v| is_affirmative(&v)),
            number_of_previous_visits: state.numeric_value(row, "number_of_previous_visits"),
        }
    }

    /// Composite 0-100 risk score.
    ///
    /// age up to 30 points, severity 5 per point, smoking 10, alcohol 5,
    /// prior visits 2 each up to 15.
    #[must_use]
    pub fn score(&self) -> f64 {
        let age = ((self.age - 30.0) / 50.0 * 30.0).clamp(0.0, 30.0);
        let severity = self.severity_score * 5.0;
        let lifestyle =
            (if self.smoker { 10.0 } else { 0.0 }) + (if self.alcohol { 5.0 } else { 0.0 });
        let visits = (self.number_of_previous_visits * 2.0).clamp(0.0, 15.0);
        (age + severity + lifestyle + visits).clamp(0.0, 100.0)
    }
}

/// Synthesized regression targets for the merged frame.
#[must_use]
pub fn risk_score_targets<R: FieldSource>(rows: &[R], state: &EncoderState) -> Vec<f64> {
    rows.iter()
        .map(|row| RiskComponents::compute(row, state).score())
        .collect()
}

/// Derive trend rows from visit history.
///
/// Visits are grouped by patient and ordered by date (undated visits last,
/// otherwise stable). Each visit after a patient's first is paired with the
/// previous visit's severity. Rows where either severity is missing are
/// dropped.
#[must_use]
pub fn progression_rows(visits: &[VisitRecord]) -> Vec<ProgressionRow> {
    let mut by_patient: BTreeMap<&str, Vec<&VisitRecord>> = BTreeMap::new();
    for visit in visits {
        by_patient.entry(visit.patient_id.as_str()).or_default().push(visit);
    }

    let mut rows = Vec::new();
    for history in by_patient.values_mut() {
        history.sort_by(|a, b| match (a.visit_date, b.visit_date) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });

        for pair in history.windows(2) {
            let (previous, current) = (pair[0], pair[1]);
            let (Some(prev_severity), Some(severity)) =
                (previous.severity_score, current.severity_score)
            else {
                continue;
            };
            rows.push(ProgressionRow {
                patient_id: current.patient_id.clone(),
                visit_id: current.visit_id.clone(),
                prev_severity,
                severity_change: severity - prev_severity,
                length_of_stay: current.length_of_stay,
                previous_visit_gap_days: current.previous_visit_gap_days,
                number_of_previous_visits: current.number_of_previous_visits,
            });
        }
    }
    rows
}

/// Trend class labels for progression rows.
#[must_use]
pub fn progression_labels(rows: &[ProgressionRow]) -> Vec<usize> {
    rows.iter()
        .map(|row| Progression::from_change(row.severity_change).index())
        .collect()
}

/// Count of each label, for reporting.
#[must_use]
pub fn label_distribution(labels: &[usize]) -> BTreeMap<usize, usize> {
    let mut counts = BTreeMap::new();
    for &label in labels {
        *counts.entry(label).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::frame::merge_visits;
    use crate::domain::visit::ReadmissionFlag;
    use crate::domain::{PatientRecord, RawRecord};
    use crate::ml::{FeatureEncoder, FeatureSpec};
    use approx::assert_abs_diff_eq;
    use chrono::NaiveDate;

    fn visit(id: &str, patient: &str, day: u32, severity: Option<f64>) -> VisitRecord {
        let mut v = VisitRecord::new(id, patient);
        v.visit_date = NaiveDate::from_ymd_opt(2024, 1, day).and_then(|d| d.and_hms_opt(0, 0, 0));
        v.severity_score = severity;
        v.length_of_stay = Some(3.0);
        v
    }

    fn severity_state<R: FieldSource>(rows: &[R]) -> EncoderState {
        FeatureEncoder::fit_transform(
            rows,
            &[
                FeatureSpec::numeric("severity_score"),
                FeatureSpec::numeric("length_of_stay"),
            ],
        )
        .expect("fit")
        .1
    }

    #[test]
    fn test_synthetic_label_rule() {
        assert_eq!(synthetic_readmission_label(9.0, 6.0), 1);
        assert_eq!(synthetic_readmission_label(5.0, 6.0), 0);
        assert_eq!(synthetic_readmission_label(8.0, 5.0), 0);
    }

    #[test]
    fn test_heuristic_only_when_column_absent() {
        let patients = vec![PatientRecord::new("P1", 50, "Male", "Austin")];
        let mut severe = visit("V1", "P1", 1, Some(9.0));
        severe.length_of_stay = Some(6.0);
        let mild = visit("V2", "P1", 2, Some(2.0));
        let visits = vec![severe, mild];

        let rows = merge_visits(&patients, &visits);
        let state = severity_state(&rows);
        assert_eq!(
            readmission_labels(&rows, &state),
            (vec![1, 0], LabelSource::SyntheticHeuristic)
        );

        // One flagged visit makes the column present for every row.
        let mut visits = visits;
        visits[1].readmitted_within_30_days = ReadmissionFlag::Yes;
        let rows = merge_visits(&patients, &visits);
        assert_eq!(
            readmission_labels(&rows, &state),
            (vec![0, 1], LabelSource::GroundTruth)
        );
    }

    #[test]
    fn test_risk_formula_example() {
        let record = RawRecord::new()
            .with("age", 65)
            .with("severity_score", 7)
            .with("smoker_status", "yes")
            .with("alcohol_use", "no")
            .with("number_of_previous_visits", 3);
        let state = FeatureEncoder::fit_transform(
            std::slice::from_ref(&record),
            &[
                FeatureSpec::numeric("age"),
                FeatureSpec::numeric("severity_score"),
                FeatureSpec::numeric("number_of_previous_visits"),
            ],
        )
        .expect("fit")
        .1;
        let components = RiskComponents::compute(&record, &state);
        assert!(components.smoker);
        assert!(!components.alcohol);
        assert_abs_diff_eq!(components.score(), 72.0, epsilon = 1e-9);
    }

    #[test]
    fn test_risk_score_clipped() {
        let extreme = RiskComponents {
            age: 120.0,
            severity_score: 10.0,
            smoker: true,
            alcohol: true,
            number_of_previous_visits: 40.0,
        };
        assert_eq!(extreme.score(), 100.0);

        let young = RiskComponents {
            age: 10.0,
            severity_score: 0.0,
            smoker: false,
            alcohol: false,
            number_of_previous_visits: 0.0,
        };
        assert_eq!(young.score(), 0.0);
    }

    #[test]
    fn test_affirmative_spellings() {
        for v in ["yes", "Yes", " TRUE ", "1", "current", "Smoker", "y"] {
            assert!(is_affirmative(v), "{v}");
        }
        for v in ["no", "former", "0", "never", ""] {
            assert!(!is_affirmative(v), "{v}");
        }
    }

    #[test]
    fn test_progression_rows_sorted_by_date() {
        let visits = vec![
            visit("V3", "P1", 20, Some(7.0)),
            visit("V1", "P1", 1, Some(5.0)),
            visit("V2", "P1", 10, Some(4.0)),
            visit("V9", "P2", 3, Some(2.0)),
        ];
        let rows = progression_rows(&visits);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].visit_id, "V2");
        assert_eq!(rows[0].prev_severity, 5.0);
        assert_eq!(rows[0].severity_change, -1.0);
        assert_eq!(rows[1].visit_id, "V3");
        assert_eq!(rows[1].severity_change, 3.0);

        assert_eq!(
            progression_labels(&rows),
            vec![Progression::Improving.index(), Progression::Worsening.index()]
        );
    }

    #[test]
    fn test_progression_skips_missing_severity() {
        let visits = vec![
            visit("V1", "P1", 1, Some(5.0)),
            visit("V2", "P1", 2, None),
            visit("V3", "P1", 3, Some(6.0)),
        ];
        assert!(progression_rows(&visits).is_empty());
    }

    #[test]
    fn test_label_distribution() {
        let counts = label_distribution(&[0, 1, 1, 2, 1]);
        assert_eq!(counts.get(&1), Some(&3));
        assert_eq!(counts.get(&0), Some(&1));
    }
}
