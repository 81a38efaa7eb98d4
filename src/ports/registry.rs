//! Model registry port: versioned persistence of fitted model bundles.

use crate::domain::{BundleVersion, ModelBundle};

/// Trait for bundle persistence.
///
/// Saved bundles are immutable. Loading is all-or-nothing: a bundle with a
/// missing or corrupt member is never partially returned.
pub trait ModelRegistry: Send + Sync {
    /// Error type for registry operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Persist `bundle` under its version.
    ///
    /// # Errors
    /// Returns error if the version already exists or a write fails.
    fn save(&self, bundle: &ModelBundle) -> Result<BundleVersion, Self::Error>;

    /// Load one complete bundle.
    ///
    /// # Errors
    /// Returns error if the version is unknown, incomplete or corrupt.
    fn load(&self, version: &BundleVersion) -> Result<ModelBundle, Self::Error>;

    /// Saved versions, oldest first.
    ///
    /// # Errors
    /// Returns error if the registry cannot be listed.
    fn list_versions(&self) -> Result<Vec<BundleVersion>, Self::Error>;

    /// Latest saved version, if any.
    ///
    /// # Errors
    /// Returns error if the registry cannot be listed.
    fn latest_version(&self) -> Result<Option<BundleVersion>, Self::Error> {
        Ok(self.list_versions()?.into_iter().max())
    }
}
