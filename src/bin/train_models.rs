//! Offline training run for all three Carecast models.
//!
//! Reads patients and visits from the record store, trains the readmission,
//! risk-score and disease-progression models, saves them as one bundle
//! version and prints the training report as JSON.
//!
//! # Usage
//!
//! ```bash
//! CARECAST_DB_PATH=carecast.db CARECAST_MODEL_DIR=ml_models_saved cargo run --bin train_models
//! ```

use std::sync::Arc;

use anyhow::{bail, Result};

use carecast::adapters::{FsModelRegistry, SqliteRecordStore};
use carecast::application::TrainingService;
use carecast::config::{AppConfig, TrainingConfig};

fn main() -> Result<()> {
    let app = AppConfig::from_env();
    let _guard = carecast::logging::init(&app.log)?;
    let config = TrainingConfig::from_env();

    tracing::info!(
        db = %app.db_path.display(),
        models = %app.model_dir.display(),
        seed = config.seed,
        "Starting training run"
    );

    let store = Arc::new(SqliteRecordStore::new(&app.db_path)?);
    let registry = Arc::new(FsModelRegistry::new(&app.model_dir));
    let report = TrainingService::new(store, registry, config).run()?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.is_partial_failure() {
        bail!("Training finished with failures");
    }
    Ok(())
}
