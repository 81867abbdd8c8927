//! In-memory snapshot of the manifest registry used by the resolver.
//!
//! Resolution is a pure function, so everything it may consult is loaded up
//! front: every published version of every plugin reachable from the roots.

use std::collections::{BTreeMap, BTreeSet};

use semver::Version;
use warden_types::error::RepositoryError;
use warden_types::plugin::PluginManifest;

use crate::repository::manifest::ManifestRepository;

/// Published manifests by id, then version.
#[derive(Debug, Clone, Default)]
pub struct RegistryView {
    manifests: BTreeMap<String, BTreeMap<Version, PluginManifest>>,
}

impl RegistryView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_manifests<I: IntoIterator<Item = PluginManifest>>(manifests: I) -> Self {
        let mut view = Self::new();
        for manifest in manifests {
            view.insert(manifest);
        }
        view
    }

    pub fn insert(&mut self, manifest: PluginManifest) {
        self.manifests
            .entry(manifest.id.clone())
            .or_default()
            .insert(manifest.version.clone(), manifest);
    }

    pub fn get(&self, id: &str, version: &Version) -> Option<&PluginManifest> {
        self.manifests.get(id).and_then(|v| v.get(version))
    }

    /// Published versions of `id`, ascending.
    pub fn versions(&self, id: &str) -> impl Iterator<Item = &Version> {
        self.manifests.get(id).into_iter().flat_map(|v| v.keys())
    }

    /// Number of distinct plugin ids.
    pub fn id_count(&self) -> usize {
        self.manifests.len()
    }

    /// Load every version of every plugin reachable from `roots` through
    /// dependency edges of any published version.
    pub async fn gather<R: ManifestRepository>(
        repo: &R,
        roots: &[&PluginManifest],
    ) -> Result<Self, RepositoryError> {
        let mut view = Self::new();
        let mut visited: BTreeSet<String> = BTreeSet::new();
        let mut pending: Vec<String> = roots
            .iter()
            .flat_map(|m| m.dependencies.iter().map(|d| d.plugin_id.clone()))
            .collect();

        while let Some(id) = pending.pop() {
            if !visited.insert(id.clone()) {
                continue;
            }
            for manifest in repo.versions(&id).await? {
                pending.extend(
                    manifest
                        .dependencies
                        .iter()
                        .filter(|d| !visited.contains(&d.plugin_id))
                        .map(|d| d.plugin_id.clone()),
                );
                view.insert(manifest);
            }
        }

        Ok(view)
    }
}
