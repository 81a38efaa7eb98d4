//! Carecast: readmission, risk-score and disease-progression predictions.
//!
//! Command-line entry point for record intake and prediction. Training
//! lives in the `train_models` binary.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;

use carecast::adapters::{FsModelRegistry, SqliteRecordStore};
use carecast::application::{IntakeService, PredictionService};
use carecast::config::AppConfig;
use carecast::domain::BundleVersion;
use carecast::ports::ModelRegistry;
use carecast::{BatchRequest, RawRecord, Task};

#[derive(Parser)]
#[command(name = "carecast")]
#[command(about = "Patient visit intake and model predictions", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate and store patient and visit documents
    Ingest {
        /// JSON array of patient documents
        #[arg(long)]
        patients: Option<PathBuf>,

        /// JSON array of visit documents
        #[arg(long)]
        visits: Option<PathBuf>,
    },

    /// List saved model bundle versions, oldest first
    Versions,

    /// Run a prediction and print the JSON response
    Predict {
        target: Target,

        /// JSON object with the input fields (a batch takes
        /// `patient_data` and `visit_data`)
        #[arg(short, long)]
        input: PathBuf,

        /// Bundle version to load (default: latest)
        #[arg(long)]
        version: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Target {
    Readmission,
    RiskScore,
    DiseaseProgression,
    Batch,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Malformed JSON in {}", path.display()))
}

fn ingest(config: &AppConfig, patients: Option<PathBuf>, visits: Option<PathBuf>) -> Result<()> {
    if patients.is_none() && visits.is_none() {
        bail!("Nothing to ingest: pass --patients and/or --visits");
    }
    let patients: Vec<RawRecord> = patients
        .as_deref()
        .map(read_json::<Vec<RawRecord>>)
        .transpose()?
        .unwrap_or_default();
    let visits: Vec<RawRecord> = visits
        .as_deref()
        .map(read_json::<Vec<RawRecord>>)
        .transpose()?
        .unwrap_or_default();

    let store = Arc::new(SqliteRecordStore::new(&config.db_path)?);
    let summary = IntakeService::new(store).ingest_all(&patients, &visits)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn versions(config: &AppConfig) -> Result<()> {
    let registry = FsModelRegistry::new(&config.model_dir);
    for version in registry.list_versions()? {
        println!("{version}");
    }
    Ok(())
}

fn predict(config: &AppConfig, target: Target, input: &Path, version: Option<String>) -> Result<()> {
    let version = version
        .map(|v| BundleVersion::parse(&v).with_context(|| format!("Invalid bundle version {v:?}")))
        .transpose()?;

    let registry = FsModelRegistry::new(&config.model_dir);
    let mut service = PredictionService::new();
    if service.load(&registry, version.as_ref())?.is_none() {
        bail!(
            "No saved model bundles in {}; run `train_models` first",
            config.model_dir.display()
        );
    }

    let response = match target {
        Target::Batch => {
            let request: BatchRequest = read_json(input)?;
            serde_json::to_value(service.predict_batch(&request))?
        }
        Target::Readmission => single(&service, Task::Readmission, input)?,
        Target::RiskScore => single(&service, Task::RiskScore, input)?,
        Target::DiseaseProgression => single(&service, Task::DiseaseProgression, input)?,
    };
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn single(service: &PredictionService, task: Task, input: &Path) -> Result<serde_json::Value> {
    let record: RawRecord = read_json(input)?;
    let prediction = service.predict(task, &record)?;
    Ok(serde_json::to_value(prediction)?)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::from_env();
    let _guard = carecast::logging::init(&config.log)?;

    match cli.command {
        Commands::Ingest { patients, visits } => ingest(&config, patients, visits),
        Commands::Versions => versions(&config),
        Commands::Predict {
            target,
            input,
            version,
        } => predict(&config, target, &input, version),
    }
}
