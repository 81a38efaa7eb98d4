//! Filesystem model registry.
//!
//! A bundle version `v` is stored as flat JSON files in the model directory:
//!
//! - `readmission_model_{v}.json`, `risk_model_{v}.json`,
//!   `disease_progression_model_{v}.json`: fitted estimators (tasks that
//!   were not trained have no file)
//! - `encoders_{v}.json`: per-task encoder state, including the readmission
//!   scaler
//! - `manifest_{v}.json`: SHA-256 of every member file plus the task list
//!
//! Every file is written to a temporary name and renamed into place. The
//! manifest is written last, so a version without a manifest does not exist
//! as far as [`FsModelRegistry::list_versions`] is concerned. Loading
//! verifies every member hash before deserializing anything.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::{
    BundleVersion, ModelBundle, ProgressionModel, ReadmissionModel, RiskScoreModel, Task,
};
use crate::ml::{EncoderState, GradientBoostingRegressor, RandomForestClassifier};
use crate::ports::ModelRegistry;

const MANIFEST_FORMAT: u32 = 1;
const MANIFEST_PREFIX: &str = "manifest_";

/// Error type for registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed {file}: {message}")]
    Serialization { file: String, message: String },

    #[error("Model bundle {0} not found")]
    NotFound(BundleVersion),

    #[error("Model bundle {version} is incomplete: {detail}")]
    PartialBundle { version: BundleVersion, detail: String },

    #[error("Model bundle {version} failed integrity check on {file}")]
    Integrity { version: BundleVersion, file: String },

    #[error("Model bundle {0} already exists")]
    AlreadyExists(BundleVersion),

    #[error("Unsupported manifest format {0}")]
    UnsupportedFormat(u32),
}

#[derive(Debug, Serialize, Deserialize)]
struct BundleManifest {
    format: u32,
    version: BundleVersion,
    created_at: DateTime<Utc>,
    tasks: Vec<Task>,
    /// file name -> lowercase hex SHA-256
    files: BTreeMap<String, String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct EncoderFile {
    readmission: Option<EncoderState>,
    risk_score: Option<EncoderState>,
    disease_progression: Option<EncoderState>,
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes).iter().map(|b| format!("{b:02x}")).collect()
}

fn model_file(task: Task, version: &BundleVersion) -> String {
    let stem = match task {
        Task::Readmission => "readmission_model",
        Task::RiskScore => "risk_model",
        Task::DiseaseProgression => "disease_progression_model",
    };
    format!("{stem}_{version}.json")
}

fn encoders_file(version: &BundleVersion) -> String {
    format!("encoders_{version}.json")
}

fn manifest_file(version: &BundleVersion) -> String {
    format!("{MANIFEST_PREFIX}{version}.json")
}

/// Model registry backed by a local directory.
#[derive(Debug, Clone)]
pub struct FsModelRegistry {
    dir: PathBuf,
}

impl FsModelRegistry {
    #[must_use]
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> RegistryError + '_ {
        move |source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Write `bytes` under `name` via a temporary file and return its hash.
    fn write_atomic(&self, name: &str, bytes: &[u8]) -> Result<String, RegistryError> {
        let final_path = self.dir.join(name);
        let tmp_path = self.dir.join(format!(".{name}.tmp"));
        fs::write(&tmp_path, bytes).map_err(Self::io_err(&tmp_path))?;
        fs::rename(&tmp_path, &final_path).map_err(Self::io_err(&final_path))?;
        Ok(sha256_hex(bytes))
    }

    fn write_json<T: Serialize>(
        &self,
        name: &str,
        value: &T,
        files: &mut BTreeMap<String, String>,
    ) -> Result<(), RegistryError> {
        let bytes = serde_json::to_vec(value).map_err(|e| RegistryError::Serialization {
            file: name.to_string(),
            message: e.to_string(),
        })?;
        let hash = self.write_atomic(name, &bytes)?;
        files.insert(name.to_string(), hash);
        Ok(())
    }

    /// Read a member file and check it against the manifest.
    fn read_verified(
        &self,
        manifest: &BundleManifest,
        name: &str,
    ) -> Result<Vec<u8>, RegistryError> {
        let Some(expected) = manifest.files.get(name) else {
            return Err(RegistryError::PartialBundle {
                version: manifest.version.clone(),
                detail: format!("manifest does not list {name}"),
            });
        };
        let path = self.dir.join(name);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RegistryError::PartialBundle {
                    version: manifest.version.clone(),
                    detail: format!("{name} is missing"),
                });
            }
            Err(source) => return Err(RegistryError::Io { path, source }),
        };
        if &sha256_hex(&bytes) != expected {
            return Err(RegistryError::Integrity {
                version: manifest.version.clone(),
                file: name.to_string(),
            });
        }
        Ok(bytes)
    }

    fn read_json<T: DeserializeOwned>(
        &self,
        manifest: &BundleManifest,
        name: &str,
    ) -> Result<T, RegistryError> {
        let bytes = self.read_verified(manifest, name)?;
        serde_json::from_slice(&bytes).map_err(|e| RegistryError::Serialization {
            file: name.to_string(),
            message: e.to_string(),
        })
    }

    fn read_manifest(&self, version: &BundleVersion) -> Result<BundleManifest, RegistryError> {
        let name = manifest_file(version);
        let path = self.dir.join(&name);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RegistryError::NotFound(version.clone()));
            }
            Err(source) => return Err(RegistryError::Io { path, source }),
        };
        let manifest: BundleManifest =
            serde_json::from_slice(&bytes).map_err(|e| RegistryError::Serialization {
                file: name,
                message: e.to_string(),
            })?;
        if manifest.format != MANIFEST_FORMAT {
            return Err(RegistryError::UnsupportedFormat(manifest.format));
        }
        if &manifest.version != version {
            return Err(RegistryError::PartialBundle {
                version: version.clone(),
                detail: format!("manifest names version {}", manifest.version),
            });
        }
        Ok(manifest)
    }
}

fn missing_encoder(version: &BundleVersion, task: Task) -> RegistryError {
    RegistryError::PartialBundle {
        version: version.clone(),
        detail: format!("no encoder state for {task}"),
    }
}

impl ModelRegistry for FsModelRegistry {
    type Error = RegistryError;

    fn save(&self, bundle: &ModelBundle) -> Result<BundleVersion, Self::Error> {
        let version = &bundle.version;
        fs::create_dir_all(&self.dir).map_err(Self::io_err(&self.dir))?;
        if self.dir.join(manifest_file(version)).exists() {
            return Err(RegistryError::AlreadyExists(version.clone()));
        }

        let mut files = BTreeMap::new();
        let mut encoders = EncoderFile::default();

        if let Some(model) = &bundle.readmission {
            self.write_json(&model_file(Task::Readmission, version), &model.classifier, &mut files)?;
            encoders.readmission = Some(model.encoder.clone());
        }
        if let Some(model) = &bundle.risk_score {
            self.write_json(&model_file(Task::RiskScore, version), &model.regressor, &mut files)?;
            encoders.risk_score = Some(model.encoder.clone());
        }
        if let Some(model) = &bundle.disease_progression {
            self.write_json(
                &model_file(Task::DiseaseProgression, version),
                &model.classifier,
                &mut files,
            )?;
            encoders.disease_progression = Some(model.encoder.clone());
        }
        self.write_json(&encoders_file(version), &encoders, &mut files)?;

        let manifest = BundleManifest {
            format: MANIFEST_FORMAT,
            version: version.clone(),
            created_at: bundle.created_at,
            tasks: bundle.tasks(),
            files,
        };
        let name = manifest_file(version);
        let bytes = serde_json::to_vec_pretty(&manifest).map_err(|e| {
            RegistryError::Serialization {
                file: name.clone(),
                message: e.to_string(),
            }
        })?;
        self.write_atomic(&name, &bytes)?;

        tracing::info!(version = %version, tasks = manifest.tasks.len(), "Saved model bundle");
        Ok(version.clone())
    }

    fn load(&self, version: &BundleVersion) -> Result<ModelBundle, Self::Error> {
        let manifest = self.read_manifest(version)?;
        let mut encoders: EncoderFile = self.read_json(&manifest, &encoders_file(version))?;

        let mut bundle = ModelBundle {
            version: version.clone(),
            created_at: manifest.created_at,
            readmission: None,
            risk_score: None,
            disease_progression: None,
        };

        for task in &manifest.tasks {
            let name = model_file(*task, version);
            match task {
                Task::Readmission => {
                    let classifier: RandomForestClassifier = self.read_json(&manifest, &name)?;
                    let encoder = encoders
                        .readmission
                        .take()
                        .ok_or_else(|| missing_encoder(version, *task))?;
                    bundle.readmission = Some(ReadmissionModel { encoder, classifier });
                }
                Task::RiskScore => {
                    let regressor: GradientBoostingRegressor = self.read_json(&manifest, &name)?;
                    let encoder = encoders
                        .risk_score
                        .take()
                        .ok_or_else(|| missing_encoder(version, *task))?;
                    bundle.risk_score = Some(RiskScoreModel { encoder, regressor });
                }
                Task::DiseaseProgression => {
                    let classifier: RandomForestClassifier = self.read_json(&manifest, &name)?;
                    let encoder = encoders
                        .disease_progression
                        .take()
                        .ok_or_else(|| missing_encoder(version, *task))?;
                    bundle.disease_progression = Some(ProgressionModel { encoder, classifier });
                }
            }
        }

        tracing::debug!(version = %version, tasks = manifest.tasks.len(), "Loaded model bundle");
        Ok(bundle)
    }

    fn list_versions(&self) -> Result<Vec<BundleVersion>, Self::Error> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(RegistryError::Io {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(Self::io_err(&self.dir))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let version = name
                .strip_prefix(MANIFEST_PREFIX)
                .and_then(|rest| rest.strip_suffix(".json"))
                .and_then(BundleVersion::parse);
            if let Some(version) = version {
                versions.push(version);
            }
        }
        versions.sort();
        Ok(versions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RawRecord;
    use crate::ml::{BoostingParams, FeatureEncoder, FeatureSpec, ForestParams};
    use chrono::TimeZone;
    use ndarray::Array2;

    fn training_rows() -> Vec<RawRecord> {
        (0..30)
            .map(|i| {
                RawRecord::new()
                    .with("age", 20 + i)
                    .with("gender", if i % 2 == 0 { "Male" } else { "Female" })
                    .with("severity_score", i % 10)
            })
            .collect()
    }

    fn fitted_bundle(at: DateTime<Utc>, with_progression: bool) -> ModelBundle {
        let specs = [
            FeatureSpec::numeric("age"),
            FeatureSpec::categorical("gender"),
            FeatureSpec::numeric("severity_score"),
        ];
        let rows = training_rows();
        let (x, encoder) = FeatureEncoder::fit_transform(&rows, &specs).expect("fit");
        let labels: Vec<usize> = (0..30).map(|i| usize::from(i % 10 > 6)).collect();
        let targets: Vec<f64> = (0..30).map(|i| f64::from(i) * 1.5).collect();

        let scaler = crate::ml::StandardScaler::fit(&x).expect("scaler");
        let scaled = scaler.transform(&x).expect("scale");
        let classifier =
            RandomForestClassifier::fit(&ForestParams::new(4, 4, 42), &scaled, &labels, 2).expect("rf");
        let regressor = GradientBoostingRegressor::fit(
            &BoostingParams {
                n_estimators: 5,
                max_depth: 3,
                learning_rate: 0.1,
                seed: 42,
            },
            &x,
            &targets,
        )
        .expect("gbr");

        let mut bundle = ModelBundle::new(at);
        bundle.readmission = Some(ReadmissionModel {
            encoder: encoder.clone().with_scaler(scaler),
            classifier,
        });
        bundle.risk_score = Some(RiskScoreModel {
            encoder: encoder.clone(),
            regressor,
        });
        if with_progression {
            let three: Vec<usize> = (0..30).map(|i| i % 3).collect();
            bundle.disease_progression = Some(ProgressionModel {
                encoder,
                classifier: RandomForestClassifier::fit(&ForestParams::new(3, 3, 1), &x, &three, 3)
                    .expect("rf"),
            });
        }
        bundle
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, 12, 0, 0).single().expect("date")
    }

    #[test]
    fn test_save_load_is_bit_identical() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = FsModelRegistry::new(dir.path());
        let bundle = fitted_bundle(at(1), true);

        let version = registry.save(&bundle).expect("save");
        let loaded = registry.load(&version).expect("load");
        assert_eq!(loaded, bundle);

        let probe = Array2::from_shape_vec((1, 3), vec![47.0, 1.0, 8.0]).expect("shape");
        let original = bundle.risk_score.as_ref().expect("risk").regressor.predict(&probe);
        let restored = loaded.risk_score.as_ref().expect("risk").regressor.predict(&probe);
        assert_eq!(original, restored);
    }

    #[test]
    fn test_untrained_task_is_absent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = FsModelRegistry::new(dir.path());
        let version = registry.save(&fitted_bundle(at(2), false)).expect("save");

        assert!(!dir
            .path()
            .join(model_file(Task::DiseaseProgression, &version))
            .exists());
        let loaded = registry.load(&version).expect("load");
        assert_eq!(loaded.tasks(), vec![Task::Readmission, Task::RiskScore]);
    }

    #[test]
    fn test_latest_and_listing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = FsModelRegistry::new(dir.path());
        assert_eq!(registry.latest_version().expect("latest"), None);

        let later = registry.save(&fitted_bundle(at(9), false)).expect("save");
        let earlier = registry.save(&fitted_bundle(at(3), false)).expect("save");

        assert_eq!(registry.list_versions().expect("list"), vec![earlier, later.clone()]);
        assert_eq!(registry.latest_version().expect("latest"), Some(later.clone()));
        assert_eq!(registry.load(&later).expect("load").version, later);
    }

    #[test]
    fn test_version_without_manifest_is_invisible() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = FsModelRegistry::new(dir.path());
        let version = registry.save(&fitted_bundle(at(4), false)).expect("save");
        fs::remove_file(dir.path().join(manifest_file(&version))).expect("remove");

        assert!(registry.list_versions().expect("list").is_empty());
        assert!(matches!(registry.load(&version), Err(RegistryError::NotFound(_))));
    }

    #[test]
    fn test_missing_member_fails_whole_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = FsModelRegistry::new(dir.path());
        let version = registry.save(&fitted_bundle(at(5), true)).expect("save");
        fs::remove_file(dir.path().join(model_file(Task::RiskScore, &version))).expect("remove");

        assert!(matches!(
            registry.load(&version),
            Err(RegistryError::PartialBundle { .. })
        ));
    }

    #[test]
    fn test_tampered_member_fails_integrity() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = FsModelRegistry::new(dir.path());
        let version = registry.save(&fitted_bundle(at(6), false)).expect("save");
        let path = dir.path().join(encoders_file(&version));
        let mut bytes = fs::read(&path).expect("read");
        bytes.push(b' ');
        fs::write(&path, bytes).expect("write");

        match registry.load(&version) {
            Err(RegistryError::Integrity { file, .. }) => assert_eq!(file, encoders_file(&version)),
            other => panic!("expected integrity failure, got {other:?}"),
        }
    }

    #[test]
    fn test_versions_are_immutable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = FsModelRegistry::new(dir.path());
        let bundle = fitted_bundle(at(7), false);
        registry.save(&bundle).expect("save");
        assert!(matches!(
            registry.save(&bundle),
            Err(RegistryError::AlreadyExists(_))
        ));
    }
}
