//! Patient records: demographics and lifestyle attributes.

use serde::{Deserialize, Serialize};

use super::record::{coerce_numeric, FieldSource, RawRecord};

/// Valid age range accepted at intake (inclusive).
pub const AGE_RANGE: std::ops::RangeInclusive<i64> = 0..=150;

/// Fields a patient document must carry at intake.
pub const REQUIRED_PATIENT_FIELDS: [&str; 4] = ["patient_id", "age", "gender", "location"];

/// A stored patient.
///
/// Created via intake and immutable afterwards, except for `updated_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    /// Unique patient identifier
    pub patient_id: String,

    /// Age in years, 0-150
    pub age: u32,

    pub gender: String,

    pub location: String,

    /// Body mass index
    #[serde(default)]
    pub bmi: Option<f64>,

    #[serde(default)]
    pub smoker_status: Option<String>,

    #[serde(default)]
    pub alcohol_use: Option<String>,

    pub created_at: chrono::DateTime<chrono::Utc>,

    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl PatientRecord {
    /// Create a patient with the required intake fields.
    #[must_use]
    pub fn new(
        patient_id: impl Into<String>,
        age: u32,
        gender: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            patient_id: patient_id.into(),
            age,
            gender: gender.into(),
            location: location.into(),
            bmi: None,
            smoker_status: None,
            alcohol_use: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach lifestyle and physiological attributes.
    #[must_use]
    pub fn with_lifestyle(
        mut self,
        bmi: Option<f64>,
        smoker_status: Option<&str>,
        alcohol_use: Option<&str>,
    ) -> Self {
        self.bmi = bmi;
        self.smoker_status = smoker_status.map(str::to_string);
        self.alcohol_use = alcohol_use.map(str::to_string);
        self
    }

    /// Validate an intake document and build a patient from it.
    ///
    /// Out-of-range ages are rejected, never clamped.
    ///
    /// # Errors
    /// Returns every validation problem found, in field order.
    pub fn from_document(doc: &RawRecord) -> Result<Self, Vec<String>> {
        let mut errors = Vec::new();

        for field in REQUIRED_PATIENT_FIELDS {
            if doc.text(field).is_none() {
                errors.push(format!("Missing required field: {field}"));
            }
        }

        let age = match doc.get("age") {
            Some(value) if doc.text("age").is_some() => match parse_age(value) {
                Some(age) if AGE_RANGE.contains(&age) => Some(age as u32),
                Some(_) => {
                    errors.push("Age must be between 0 and 150".to_string());
                    None
                }
                None => {
                    errors.push("Age must be a number".to_string());
                    None
                }
            },
            _ => None,
        };

        if !errors.is_empty() {
            return Err(errors);
        }

        let (Some(patient_id), Some(age), Some(gender), Some(location)) = (
            doc.text("patient_id"),
            age,
            doc.text("gender"),
            doc.text("location"),
        ) else {
            return Err(vec!["Malformed patient document".to_string()]);
        };

        let mut patient = Self::new(patient_id, age, gender, location);
        patient.bmi = doc.get("bmi").and_then(coerce_numeric);
        patient.smoker_status = doc.text("smoker_status");
        patient.alcohol_use = doc.text("alcohol_use");
        Ok(patient)
    }
}

/// Integer age from a JSON number or numeric string.
fn parse_age(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .map(|f| f as i64)
        }),
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

impl FieldSource for PatientRecord {
    fn numeric(&self, field: &str) -> Option<f64> {
        match field {
            "age" => Some(f64::from(self.age)),
            "bmi" => self.bmi,
            _ => None,
        }
    }

    fn category(&self, field: &str) -> Option<String> {
        match field {
            "gender" => Some(self.gender.clone()),
            "location" => Some(self.location.clone()),
            "smoker_status" => self.smoker_status.clone(),
            "alcohol_use" => self.alcohol_use.clone(),
            "patient_id" => Some(self.patient_id.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> RawRecord {
        RawRecord::from_value(value).expect("object")
    }

    #[test]
    fn test_intake_accepts_valid_document() {
        let patient = PatientRecord::from_document(&doc(json!({
            "patient_id": "P001",
            "age": "65",
            "gender": "Male",
            "location": "Boston",
            "bmi": "28.5",
            "smoker_status": "yes",
        })))
        .expect("Should validate");

        assert_eq!(patient.age, 65);
        assert_eq!(patient.bmi, Some(28.5));
        assert_eq!(patient.smoker_status.as_deref(), Some("yes"));
        assert!(patient.alcohol_use.is_none());
    }

    #[test]
    fn test_intake_rejects_out_of_range_age() {
        let errors = PatientRecord::from_document(&doc(json!({
            "patient_id": "P002",
            "age": 151,
            "gender": "Female",
            "location": "Austin",
        })))
        .expect_err("Age 151 must be rejected");
        assert_eq!(errors, vec!["Age must be between 0 and 150".to_string()]);

        assert!(PatientRecord::from_document(&doc(json!({
            "patient_id": "P003",
            "age": -1,
            "gender": "Female",
            "location": "Austin",
        })))
        .is_err());
    }

    #[test]
    fn test_intake_accepts_boundary_ages() {
        for age in [0, 150] {
            let patient = PatientRecord::from_document(&doc(json!({
                "patient_id": "P004",
                "age": age,
                "gender": "Female",
                "location": "Austin",
            })))
            .expect("Boundary age is valid");
            assert_eq!(i64::from(patient.age), age);
        }
    }

    #[test]
    fn test_intake_reports_all_missing_fields() {
        let errors = PatientRecord::from_document(&doc(json!({
            "age": 40,
            "gender": "",
        })))
        .expect_err("Should fail");
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("patient_id")));
        assert!(errors.iter().any(|e| e.contains("gender")));
        assert!(errors.iter().any(|e| e.contains("location")));
    }

    #[test]
    fn test_intake_rejects_non_numeric_age() {
        let errors = PatientRecord::from_document(&doc(json!({
            "patient_id": "P005",
            "age": "sixty",
            "gender": "Male",
            "location": "Denver",
        })))
        .expect_err("Should fail");
        assert_eq!(errors, vec!["Age must be a number".to_string()]);
    }
}
