//! Training frames: visit × patient join and per-patient trend rows.

use std::collections::HashMap;

use super::patient::PatientRecord;
use super::record::FieldSource;
use super::visit::VisitRecord;

/// One row of the merged training frame: a visit plus its patient, if known.
#[derive(Debug, Clone, Copy)]
pub struct MergedRow<'a> {
    pub visit: &'a VisitRecord,
    pub patient: Option<&'a PatientRecord>,
}

impl FieldSource for MergedRow<'_> {
    fn numeric(&self, field: &str) -> Option<f64> {
        self.visit
            .numeric(field)
            .or_else(|| self.patient.and_then(|p| p.numeric(field)))
    }

    fn category(&self, field: &str) -> Option<String> {
        self.visit
            .category(field)
            .or_else(|| self.patient.and_then(|p| p.category(field)))
    }
}

/// Left-join visits to patients on the visit's patient reference.
///
/// One row per visit, in visit order. Visits whose patient is unknown keep a
/// `None` patient; their patient attributes are imputed downstream.
#[must_use]
pub fn merge_visits<'a>(
    patients: &'a [PatientRecord],
    visits: &'a [VisitRecord],
) -> Vec<MergedRow<'a>> {
    let mut by_id: HashMap<&str, &PatientRecord> = HashMap::with_capacity(patients.len());
    for patient in patients {
        by_id.entry(patient.patient_id.as_str()).or_insert(patient);
    }

    visits
        .iter()
        .map(|visit| MergedRow {
            visit,
            patient: by_id.get(visit.patient_id.as_str()).copied(),
        })
        .collect()
}

/// A visit paired with the severity of the same patient's previous visit.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressionRow {
    pub patient_id: String,
    pub visit_id: String,
    pub prev_severity: f64,
    pub severity_change: f64,
    pub length_of_stay: Option<f64>,
    pub previous_visit_gap_days: Option<f64>,
    pub number_of_previous_visits: Option<f64>,
}

impl FieldSource for ProgressionRow {
    fn numeric(&self, field: &str) -> Option<f64> {
        match field {
            "prev_severity" => Some(self.prev_severity),
            "severity_change" => Some(self.severity_change),
            "length_of_stay" => self.length_of_stay,
            "previous_visit_gap_days" => self.previous_visit_gap_days,
            "number_of_previous_visits" => self.number_of_previous_visits,
            _ => None,
        }
    }

    fn category(&self, _field: &str) -> Option<String> {
        None
    }
}
