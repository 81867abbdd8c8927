//! Manifest registry service.
//!
//! Published manifests are immutable per (id, version). Republishing
//! identical content is a no-op; different content under an existing
//! version is rejected.

use std::sync::Arc;

use semver::Version;
use serde::Serialize;
use tracing::Instrument;
use warden_types::error::{ManifestError, RepositoryError};
use warden_types::plugin::PluginManifest;

use super::EngineContext;
use crate::repository::manifest::ManifestRepository;
use crate::repository::state::StateRepository;

/// Whether a publish stored anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishOutcome {
    Published,
    Unchanged,
}

pub struct ManifestService<M: ManifestRepository, S: StateRepository> {
    ctx: Arc<EngineContext<M, S>>,
}

impl<M: ManifestRepository, S: StateRepository> ManifestService<M, S> {
    pub fn new(ctx: Arc<EngineContext<M, S>>) -> Self {
        Self { ctx }
    }

    /// Validate and store a manifest.
    pub async fn publish(&self, manifest: PluginManifest) -> Result<PublishOutcome, ManifestError> {
        manifest.validate()?;

        let span = tracing::info_span!(
            "publish_manifest",
            plugin_id = %manifest.id,
            version = %manifest.version,
        );

        async {
            if let Some(existing) = self.ctx.manifests.get(&manifest.id, &manifest.version).await? {
                return same_content(&existing, &manifest);
            }

            match self.ctx.manifests.insert(&manifest).await {
                Ok(()) => {}
                // Lost a race with another publisher of the same version.
                Err(RepositoryError::Conflict(_)) => {
                    let existing = self
                        .ctx
                        .manifests
                        .get(&manifest.id, &manifest.version)
                        .await?
                        .ok_or_else(|| ManifestError::Storage("manifest vanished after conflict".to_string()))?;
                    return same_content(&existing, &manifest);
                }
                Err(e) => return Err(e.into()),
            }

            self.ctx.cache.bump_registry();
            tracing::info!("manifest published");
            Ok(PublishOutcome::Published)
        }
        .instrument(span)
        .await
    }

    pub async fn get(&self, plugin_id: &str, version: &Version) -> Result<Option<PluginManifest>, ManifestError> {
        Ok(self.ctx.manifests.get(plugin_id, version).await?)
    }

    pub async fn latest(&self, plugin_id: &str) -> Result<Option<PluginManifest>, ManifestError> {
        Ok(self.ctx.latest(plugin_id).await?)
    }

    /// Every published version of `plugin_id`, ascending.
    pub async fn versions(&self, plugin_id: &str) -> Result<Vec<PluginManifest>, ManifestError> {
        Ok(self.ctx.manifests.versions(plugin_id).await?)
    }

    pub async fn list(&self) -> Result<Vec<PluginManifest>, ManifestError> {
        Ok(self.ctx.manifests.list().await?)
    }
}

fn same_content(existing: &PluginManifest, manifest: &PluginManifest) -> Result<PublishOutcome, ManifestError> {
    if existing == manifest {
        tracing::debug!("identical manifest already published");
        Ok(PublishOutcome::Unchanged)
    } else {
        Err(ManifestError::ImmutableVersion {
            plugin_id: manifest.id.clone(),
            version: manifest.version.to_string(),
        })
    }
}
