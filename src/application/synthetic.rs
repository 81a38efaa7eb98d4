//! Synthetic visit generation for record stores with patients but almost no
//! visit history.

use chrono::{DateTime, Duration, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::SynthesisConfig;
use crate::domain::{PatientRecord, ReadmissionFlag, VisitRecord};

/// Whether the loaded records call for synthetic visits.
#[must_use]
pub fn should_synthesize(config: &SynthesisConfig, n_patients: usize, n_visits: usize) -> bool {
    config.enabled && n_visits < config.max_real_visits && n_patients > config.min_patients
}

/// Generate 1-3 visits for each of the first `patient_limit` patients.
///
/// Visit `i` (0-based) of a patient has severity 1-10, a stay of 1-14 days,
/// a gap of 7-179 days since the previous visit (0 for the first), `i`
/// previous visits, a date 1-364 days before `now`, and is flagged as
/// readmitted with probability `readmission_rate`. Ids are
/// `{patient_id}_V{i+1}`.
#[must_use]
pub fn synthesize_visits(
    patients: &[PatientRecord],
    config: &SynthesisConfig,
    now: DateTime<Utc>,
    seed: u64,
) -> Vec<VisitRecord> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut visits = Vec::new();

    for patient in patients.iter().take(config.patient_limit) {
        let n_visits = rng.gen_range(1..=3);
        for i in 0..n_visits {
            let days_ago = rng.gen_range(1..365);
            let severity: u8 = rng.gen_range(1..=10);
            let stay: u8 = rng.gen_range(1..=14);
            let gap: u16 = if i > 0 { rng.gen_range(7..180) } else { 0 };
            let readmitted = if rng.gen_bool(config.readmission_rate.clamp(0.0, 1.0)) {
                ReadmissionFlag::Yes
            } else {
                ReadmissionFlag::No
            };

            visits.push(VisitRecord {
                visit_id: format!("{}_V{}", patient.patient_id, i + 1),
                patient_id: patient.patient_id.clone(),
                visit_date: Some((now - Duration::days(days_ago)).naive_utc()),
                diagnosis: None,
                severity_score: Some(f64::from(severity)),
                length_of_stay: Some(f64::from(stay)),
                previous_visit_gap_days: Some(f64::from(gap)),
                number_of_previous_visits: Some(f64::from(i)),
                readmitted_within_30_days: readmitted,
            });
        }
    }
    visits
}
