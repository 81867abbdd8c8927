//! In-process repository implementations.
//!
//! Backed by `tokio::sync::RwLock`-guarded maps: a commit holds the write
//! lock for its whole duration, so snapshots never observe a partial write.
//! Used by tests and by embedders that do not need durable storage.

use std::collections::BTreeMap;
use std::sync::Arc;

use semver::Version;
use tokio::sync::RwLock;
use warden_types::error::RepositoryError;
use warden_types::installation::InstallationRecord;
use warden_types::permission::{PermissionGrant, PermissionKind};
use warden_types::plugin::PluginManifest;
use warden_types::sandbox::SandboxConfig;

use super::manifest::ManifestRepository;
use super::state::{PairSnapshot, PairWrite, SandboxWrite, StateRepository};

/// Manifest registry held in memory. Clones share storage.
#[derive(Debug, Clone, Default)]
pub struct InMemoryManifestRepository {
    manifests: Arc<RwLock<BTreeMap<(String, Version), PluginManifest>>>,
}

impl InMemoryManifestRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ManifestRepository for InMemoryManifestRepository {
    async fn insert(&self, manifest: &PluginManifest) -> Result<(), RepositoryError> {
        let mut manifests = self.manifests.write().await;
        let key = (manifest.id.clone(), manifest.version.clone());
        if manifests.contains_key(&key) {
            return Err(RepositoryError::Conflict(manifest.label()));
        }
        manifests.insert(key, manifest.clone());
        Ok(())
    }

    async fn get(
        &self,
        plugin_id: &str,
        version: &Version,
    ) -> Result<Option<PluginManifest>, RepositoryError> {
        let manifests = self.manifests.read().await;
        Ok(manifests
            .get(&(plugin_id.to_string(), version.clone()))
            .cloned())
    }

    async fn versions(&self, plugin_id: &str) -> Result<Vec<PluginManifest>, RepositoryError> {
        let manifests = self.manifests.read().await;
        Ok(manifests
            .iter()
            .filter(|((id, _), _)| id == plugin_id)
            .map(|(_, m)| m.clone())
            .collect())
    }

    async fn list(&self) -> Result<Vec<PluginManifest>, RepositoryError> {
        let manifests = self.manifests.read().await;
        Ok(manifests.values().cloned().collect())
    }
}

type PairKey = (String, String);

#[derive(Debug, Default)]
struct StateTables {
    installations: BTreeMap<PairKey, InstallationRecord>,
    grants: BTreeMap<(String, String, PermissionKind), PermissionGrant>,
    sandboxes: BTreeMap<PairKey, SandboxConfig>,
}

/// Per-user engine state held in memory. Clones share storage.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStateRepository {
    tables: Arc<RwLock<StateTables>>,
}

impl InMemoryStateRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn pair(user_id: &str, plugin_id: &str) -> PairKey {
    (user_id.to_string(), plugin_id.to_string())
}

impl StateRepository for InMemoryStateRepository {
    async fn snapshot(&self, user_id: &str, plugin_id: &str) -> Result<PairSnapshot, RepositoryError> {
        let tables = self.tables.read().await;
        let key = pair(user_id, plugin_id);
        Ok(PairSnapshot {
            installation: tables.installations.get(&key).cloned(),
            grants: tables
                .grants
                .values()
                .filter(|g| g.user_id == user_id && g.plugin_id == plugin_id)
                .cloned()
                .collect(),
            sandbox: tables.sandboxes.get(&key).cloned(),
        })
    }

    async fn commit(&self, write: &PairWrite) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        let key = pair(&write.user_id, &write.plugin_id);

        if let Some(record) = &write.installation {
            tables.installations.insert(key.clone(), record.clone());
        }
        for grant in &write.grants {
            tables.grants.insert(
                (grant.user_id.clone(), grant.plugin_id.clone(), grant.kind),
                grant.clone(),
            );
        }
        match &write.sandbox {
            SandboxWrite::Keep => {}
            SandboxWrite::Put(config) => {
                tables.sandboxes.insert(key, config.clone());
            }
            SandboxWrite::Delete => {
                tables.sandboxes.remove(&key);
            }
        }
        Ok(())
    }

    async fn get_installation(
        &self,
        user_id: &str,
        plugin_id: &str,
    ) -> Result<Option<InstallationRecord>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.installations.get(&pair(user_id, plugin_id)).cloned())
    }

    async fn list_installations(&self, user_id: &str) -> Result<Vec<InstallationRecord>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .installations
            .iter()
            .filter(|((user, _), _)| user == user_id)
            .map(|(_, r)| r.clone())
            .collect())
    }
}
