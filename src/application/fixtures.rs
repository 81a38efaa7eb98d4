//! Shared records for application-layer tests.

use chrono::NaiveDate;

use crate::domain::{PatientRecord, ReadmissionFlag, VisitRecord};

pub(crate) fn patients(n: usize) -> Vec<PatientRecord> {
    (0..n)
        .map(|i| {
            PatientRecord::new(
                format!("P{i}"),
                30 + (i % 50) as u32,
                if i % 2 == 0 { "Male" } else { "Female" },
                "Boston",
            )
            .with_lifestyle(
                Some(20.0 + (i % 15) as f64),
                Some(if i % 3 == 0 { "yes" } else { "no" }),
                Some(if i % 4 == 0 { "yes" } else { "no" }),
            )
        })
        .collect()
}

/// Three visits per patient with severities drifting down, flat or up
/// depending on the patient.
pub(crate) fn visits(patients: &[PatientRecord], with_flag: bool) -> Vec<VisitRecord> {
    let mut visits = Vec::new();
    for (p, patient) in patients.iter().enumerate() {
        for i in 0..3u32 {
            let mut v = VisitRecord::new(format!("{}_V{i}", patient.patient_id), &patient.patient_id);
            v.visit_date = NaiveDate::from_ymd_opt(2024, 1 + i, 1 + (p % 28) as u32)
                .and_then(|d| d.and_hms_opt(9, 0, 0));
            let drift = (p % 3) as f64 - 1.0;
            v.severity_score = Some((5.0 + drift * 2.0 * f64::from(i)).clamp(0.0, 10.0));
            v.length_of_stay = Some(1.0 + ((p + i as usize) % 9) as f64);
            v.previous_visit_gap_days = Some(if i == 0 { 0.0 } else { 30.0 });
            v.number_of_previous_visits = Some(f64::from(i));
            if with_flag {
                v.readmitted_within_30_days = if (p + i as usize) % 4 == 0 {
                    ReadmissionFlag::Yes
                } else {
                    ReadmissionFlag::No
                };
            }
            visits.push(v);
        }
    }
    visits
}
