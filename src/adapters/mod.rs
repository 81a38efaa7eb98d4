//! Adapters layer: Concrete implementations of ports.
//!
//! - `sqlite`: SQLite record store for patients and visits
//! - `registry`: filesystem model registry with hash-checked manifests
//! - `sanitize`: PII filtering for logs

pub mod registry;
pub mod sanitize;
pub mod sqlite;

// Re-export adapter errors for lib.rs
pub use registry::{FsModelRegistry, RegistryError};
pub use sqlite::{SqliteRecordStore, StorageError};
