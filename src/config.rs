//! Runtime configuration from `CARECAST_*` environment variables.
//!
//! Every setting has a default, so an empty environment yields a working
//! configuration. Unparseable values fall back to the default with a warning.

use std::path::PathBuf;
use std::str::FromStr;

const DB_PATH_ENV: &str = "CARECAST_DB_PATH";
const MODEL_DIR_ENV: &str = "CARECAST_MODEL_DIR";
const LOG_MODE_ENV: &str = "CARECAST_LOG_MODE";
const LOG_FILE_ENV: &str = "CARECAST_LOG_FILE";
const SEED_ENV: &str = "CARECAST_SEED";
const TEST_SIZE_ENV: &str = "CARECAST_TEST_SIZE";
const N_ESTIMATORS_ENV: &str = "CARECAST_N_ESTIMATORS";
const SYNTHESIZE_ENV: &str = "CARECAST_SYNTHESIZE_VISITS";

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
        "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
        _ => None,
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> T {
    match lookup(name) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(variable = name, "Ignoring unparseable value");
            default
        }),
        None => default,
    }
}

/// Where log output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    /// stderr, keeping stdout free for command output
    Auto,
    File,
    Stdout,
}

impl LogMode {
    fn parse(value: &str) -> Self {
        match value.trim() {
            "file" => Self::File,
            "stdout" => Self::Stdout,
            _ => Self::Auto,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub mode: LogMode,
    pub file: PathBuf,
}

/// Locations of the record store and model directory, plus logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub model_dir: PathBuf,
    pub log: LogConfig,
}

impl AppConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    /// Build from an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            db_path: lookup(DB_PATH_ENV).map_or_else(|| PathBuf::from("carecast.db"), PathBuf::from),
            model_dir: lookup(MODEL_DIR_ENV)
                .map_or_else(|| PathBuf::from("ml_models_saved"), PathBuf::from),
            log: LogConfig {
                mode: lookup(LOG_MODE_ENV).map_or(LogMode::Auto, |v| LogMode::parse(&v)),
                file: lookup(LOG_FILE_ENV).map_or_else(|| PathBuf::from("carecast.log"), PathBuf::from),
            },
        }
    }
}

/// When and how synthetic visits are generated for a sparse record store.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisConfig {
    pub enabled: bool,
    /// Synthesize only when fewer real visits than this exist
    pub max_real_visits: usize,
    /// ... and more patients than this
    pub min_patients: usize,
    /// Only the first `patient_limit` patients get synthetic visits
    pub patient_limit: usize,
    pub readmission_rate: f64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_real_visits: 100,
            min_patients: 100,
            patient_limit: 1000,
            readmission_rate: 0.3,
        }
    }
}

/// Hyperparameters and thresholds for a training run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingConfig {
    pub n_estimators: usize,
    pub readmission_max_depth: usize,
    pub risk_max_depth: usize,
    pub progression_max_depth: usize,
    pub learning_rate: f64,
    pub test_size: f64,
    pub seed: u64,
    pub smote_k_neighbors: usize,
    /// Fewer usable rows than this skips a task
    pub min_training_rows: usize,
    /// Progression trains only with more visits than this
    pub min_progression_visits: usize,
    /// A run with fewer patients than this is refused
    pub min_patients: usize,
    pub synthesis: SynthesisConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            readmission_max_depth: 10,
            risk_max_depth: 5,
            progression_max_depth: 8,
            learning_rate: 0.1,
            test_size: 0.2,
            seed: 42,
            smote_k_neighbors: 5,
            min_training_rows: 10,
            min_progression_visits: 20,
            min_patients: 100,
            synthesis: SynthesisConfig::default(),
        }
    }
}

impl TrainingConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    /// Defaults with overrides from `lookup`.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let test_size = parse_or(&lookup, TEST_SIZE_ENV, defaults.test_size);
        let test_size = if test_size > 0.0 && test_size < 1.0 {
            test_size
        } else {
            tracing::warn!(test_size, "Test size must be in (0, 1), using default");
            defaults.test_size
        };

        Self {
            n_estimators: parse_or(&lookup, N_ESTIMATORS_ENV, defaults.n_estimators).max(1),
            test_size,
            seed: parse_or(&lookup, SEED_ENV, defaults.seed),
            synthesis: SynthesisConfig {
                enabled: lookup(SYNTHESIZE_ENV)
                    .and_then(|v| parse_bool(&v))
                    .unwrap_or(defaults.synthesis.enabled),
                ..defaults.synthesis.clone()
            },
            ..defaults
        }
    }
}
