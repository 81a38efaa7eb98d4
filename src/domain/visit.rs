//! Visit records and the optional ground-truth readmission flag.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::record::{coerce_numeric, FieldSource, RawRecord};

/// Fields a visit document must carry at intake.
pub const REQUIRED_VISIT_FIELDS: [&str; 2] = ["visit_id", "patient_id"];

/// Ground-truth 30-day readmission flag as found on a visit document.
///
/// `Absent` means the field was not supplied at all; `Unrecognized` means the
/// field was present but null or not one of the accepted spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReadmissionFlag {
    #[default]
    Absent,
    Unrecognized,
    Yes,
    No,
}

impl ReadmissionFlag {
    /// Interpret the raw field value.
    #[must_use]
    pub fn from_value(value: Option<&Value>) -> Self {
        match value {
            None => Self::Absent,
            Some(Value::Bool(true)) => Self::Yes,
            Some(Value::Bool(false)) => Self::No,
            Some(Value::Number(n)) => match n.as_f64() {
                Some(v) if v == 1.0 => Self::Yes,
                Some(v) if v == 0.0 => Self::No,
                _ => Self::Unrecognized,
            },
            Some(Value::String(s)) => match s.as_str() {
                "Yes" | "yes" | "True" | "true" | "1" => Self::Yes,
                "No" | "no" | "False" | "false" | "0" => Self::No,
                _ => Self::Unrecognized,
            },
            Some(_) => Self::Unrecognized,
        }
    }

    /// Whether the field was supplied on the visit.
    #[must_use]
    pub fn is_present(self) -> bool {
        !matches!(self, Self::Absent)
    }

    /// Binary label: only an affirmative flag is 1.
    #[must_use]
    pub fn label(self) -> usize {
        usize::from(matches!(self, Self::Yes))
    }
}

/// A stored hospital visit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisitRecord {
    pub visit_id: String,

    /// Reference to the visited patient
    pub patient_id: String,

    #[serde(default)]
    pub visit_date: Option<NaiveDateTime>,

    #[serde(default)]
    pub diagnosis: Option<String>,

    /// Ordinal clinical severity, 0 (mild) to 10 (critical)
    #[serde(default)]
    pub severity_score: Option<f64>,

    /// Length of stay in days
    #[serde(default)]
    pub length_of_stay: Option<f64>,

    #[serde(default)]
    pub previous_visit_gap_days: Option<f64>,

    #[serde(default)]
    pub number_of_previous_visits: Option<f64>,

    #[serde(default)]
    pub readmitted_within_30_days: ReadmissionFlag,
}

impl VisitRecord {
    #[must_use]
    pub fn new(visit_id: impl Into<String>, patient_id: impl Into<String>) -> Self {
        Self {
            visit_id: visit_id.into(),
            patient_id: patient_id.into(),
            ..Self::default()
        }
    }

    /// Validate an intake document and build a visit from it.
    ///
    /// Numeric fields supplied as strings are coerced; unparseable values
    /// become missing.
    ///
    /// # Errors
    /// Returns every validation problem found.
    pub fn from_document(doc: &RawRecord) -> Result<Self, Vec<String>> {
        let errors: Vec<String> = REQUIRED_VISIT_FIELDS
            .iter()
            .filter(|field| doc.text(field).is_none())
            .map(|field| format!("Missing required field: {field}"))
            .collect();
        if !errors.is_empty() {
            return Err(errors);
        }

        let (Some(visit_id), Some(patient_id)) = (doc.text("visit_id"), doc.text("patient_id"))
        else {
            return Err(vec!["Malformed visit document".to_string()]);
        };

        Ok(Self {
            visit_id,
            patient_id,
            visit_date: doc.get("visit_date").and_then(parse_visit_date),
            diagnosis: doc.text("diagnosis"),
            severity_score: doc.get("severity_score").and_then(coerce_numeric),
            length_of_stay: doc.get("length_of_stay").and_then(coerce_numeric),
            previous_visit_gap_days: doc.get("previous_visit_gap_days").and_then(coerce_numeric),
            number_of_previous_visits: doc
                .get("number_of_previous_visits")
                .and_then(coerce_numeric),
            readmitted_within_30_days: ReadmissionFlag::from_value(
                doc.get("readmitted_within_30_days"),
            ),
        })
    }
}

/// Parse a visit date from RFC 3339, `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD`.
#[must_use]
pub fn parse_visit_date(value: &Value) -> Option<NaiveDateTime> {
    let s = value.as_str()?.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

impl FieldSource for VisitRecord {
    fn numeric(&self, field: &str) -> Option<f64> {
        match field {
            "severity_score" => self.severity_score,
            "length_of_stay" => self.length_of_stay,
            "previous_visit_gap_days" => self.previous_visit_gap_days,
            "number_of_previous_visits" => self.number_of_previous_visits,
            _ => None,
        }
    }

    fn category(&self, field: &str) -> Option<String> {
        match field {
            "diagnosis" => self.diagnosis.clone(),
            "visit_id" => Some(self.visit_id.clone()),
            "patient_id" => Some(self.patient_id.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_readmission_flag_spellings() {
        for v in [json!("Yes"), json!("yes"), json!("True"), json!("1"), json!(1), json!(true)] {
            assert_eq!(ReadmissionFlag::from_value(Some(&v)), ReadmissionFlag::Yes, "{v}");
        }
        for v in [json!("No"), json!("no"), json!(0), json!(false)] {
            assert_eq!(ReadmissionFlag::from_value(Some(&v)), ReadmissionFlag::No, "{v}");
        }
        assert_eq!(
            ReadmissionFlag::from_value(Some(&json!(null))),
            ReadmissionFlag::Unrecognized
        );
        assert_eq!(ReadmissionFlag::from_value(None), ReadmissionFlag::Absent);
        assert_eq!(ReadmissionFlag::Unrecognized.label(), 0);
        assert!(ReadmissionFlag::Unrecognized.is_present());
    }

    #[test]
    fn test_visit_from_document_coerces_numbers() {
        let doc = RawRecord::from_value(json!({
            "visit_id": "V1",
            "patient_id": "P1",
            "visit_date": "2024-03-05",
            "severity_score": "8",
            "length_of_stay": 6,
            "previous_visit_gap_days": "n/a",
        }))
        .expect("object");

        let visit = VisitRecord::from_document(&doc).expect("Should parse");
        assert_eq!(visit.severity_score, Some(8.0));
        assert_eq!(visit.length_of_stay, Some(6.0));
        assert_eq!(visit.previous_visit_gap_days, None);
        assert_eq!(visit.readmitted_within_30_days, ReadmissionFlag::Absent);
        assert_eq!(
            visit.visit_date.map(|d| d.date()),
            NaiveDate::from_ymd_opt(2024, 3, 5)
        );
    }

    #[test]
    fn test_visit_requires_ids() {
        let doc = RawRecord::new().with("visit_id", "V9");
        let errors = VisitRecord::from_document(&doc).expect_err("Should fail");
        assert_eq!(errors, vec!["Missing required field: patient_id".to_string()]);
    }

    #[test]
    fn test_visit_date_formats() {
        assert!(parse_visit_date(&json!("2024-01-02T10:00:00Z")).is_some());
        assert!(parse_visit_date(&json!("2024-01-02 10:00:00")).is_some());
        assert!(parse_visit_date(&json!("2024-01-02")).is_some());
        assert!(parse_visit_date(&json!("yesterday")).is_none());
    }
}
