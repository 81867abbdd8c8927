//! Manifest registry trait definition.

use semver::Version;
use warden_types::error::RepositoryError;
use warden_types::plugin::PluginManifest;

/// Repository trait for published plugin manifests.
///
/// Manifests are immutable per (id, version): `insert` never overwrites and
/// returns `RepositoryError::Conflict` when the pair already exists.
/// Implementations live in warden-infra (e.g., SqliteManifestRepository).
pub trait ManifestRepository: Send + Sync {
    /// Store a new manifest.
    fn insert(
        &self,
        manifest: &PluginManifest,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get one published version.
    fn get(
        &self,
        plugin_id: &str,
        version: &Version,
    ) -> impl std::future::Future<Output = Result<Option<PluginManifest>, RepositoryError>> + Send;

    /// Every published version of a plugin, ascending by version.
    fn versions(
        &self,
        plugin_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<PluginManifest>, RepositoryError>> + Send;

    /// Every published manifest, ordered by id then version.
    fn list(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<PluginManifest>, RepositoryError>> + Send;
}
