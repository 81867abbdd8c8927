//! Business logic services (use cases).
//!
//! Services orchestrate repository calls, the pure resolver and policy
//! engines, locking, and event publication. They depend on the repository
//! traits (ports) -- never on concrete infrastructure implementations.
//!
//! All services share one [`EngineContext`]; [`Engine`] is the cheap-to-clone
//! handle the API layer holds.

pub mod cache;
pub mod installer;
pub mod lock;
pub mod manifest;
pub mod permission;
pub mod sandbox;

use std::sync::Arc;

use warden_types::config::EngineConfig;
use warden_types::error::{ConfigError, RepositoryError};
use warden_types::installation::{InstallStatus, InstallationRecord};
use warden_types::plugin::PluginManifest;
use warden_types::resolution::Resolution;

use crate::event::bus::EventBus;
use crate::plugin::{RegistryView, resolve};
use crate::repository::manifest::ManifestRepository;
use crate::repository::state::{PairWrite, StateRepository};
use crate::sandbox::SandboxPolicy;

use self::cache::{ResolutionCache, Stamp};
use self::installer::InstallService;
use self::lock::LockRegistry;
use self::manifest::ManifestService;
use self::permission::PermissionService;
use self::sandbox::SandboxService;

/// State shared by every service of one engine instance.
pub struct EngineContext<M: ManifestRepository, S: StateRepository> {
    pub manifests: M,
    pub state: S,
    pub locks: LockRegistry,
    pub cache: ResolutionCache,
    pub events: EventBus,
    pub policy: SandboxPolicy,
    pub config: EngineConfig,
}

impl<M: ManifestRepository, S: StateRepository> EngineContext<M, S> {
    pub fn new(manifests: M, state: S, config: EngineConfig) -> Self {
        Self {
            manifests,
            state,
            locks: LockRegistry::new(),
            cache: ResolutionCache::new(),
            events: EventBus::new(config.event_bus_capacity),
            policy: SandboxPolicy::new(config.isolation),
            config,
        }
    }

    /// Highest published version of `plugin_id`.
    pub async fn latest(&self, plugin_id: &str) -> Result<Option<PluginManifest>, RepositoryError> {
        Ok(self.manifests.versions(plugin_id).await?.into_iter().last())
    }

    /// The manifest that governs a pair: the recorded version while a live
    /// record exists, otherwise the latest published version.
    pub async fn governing_manifest(
        &self,
        plugin_id: &str,
        record: Option<&InstallationRecord>,
    ) -> Result<Option<PluginManifest>, RepositoryError> {
        if let Some(record) = record.filter(|r| r.status != InstallStatus::Uninstalled) {
            if let Some(manifest) = self.manifests.get(plugin_id, &record.version).await? {
                return Ok(Some(manifest));
            }
        }
        self.latest(plugin_id).await
    }

    /// Manifests of every plugin currently installed for `user_id`.
    pub async fn installed_manifests(&self, user_id: &str) -> Result<Vec<PluginManifest>, RepositoryError> {
        let mut manifests = Vec::new();
        for record in self.state.list_installations(user_id).await? {
            if !record.is_installed() {
                continue;
            }
            match self.manifests.get(&record.plugin_id, &record.version).await? {
                Some(manifest) => manifests.push(manifest),
                None => tracing::warn!(
                    user_id,
                    plugin_id = %record.plugin_id,
                    version = %record.version,
                    "installed version has no published manifest, ignoring"
                ),
            }
        }
        Ok(manifests)
    }

    /// Resolve `target` for `user_id`. The stamp is taken before any state is
    /// read, so a commit that lands afterwards always invalidates it.
    ///
    /// With `plan` unset the registry is not consulted: every dependency the
    /// installed set does not satisfy is reported missing.
    pub async fn resolve_for(
        &self,
        user_id: &str,
        target: &PluginManifest,
        plan: bool,
    ) -> Result<(Resolution, Stamp), RepositoryError> {
        let stamp = self.cache.stamp(user_id);
        let installed = self.installed_manifests(user_id).await?;

        let registry = if plan {
            let mut roots: Vec<&PluginManifest> = vec![target];
            roots.extend(installed.iter());
            RegistryView::gather(&self.manifests, &roots).await?
        } else {
            RegistryView::new()
        };

        Ok((resolve(target, &installed, &registry), stamp))
    }

    /// Persist a write that leaves the user's installed set unchanged.
    pub async fn commit(&self, write: &PairWrite) -> Result<(), RepositoryError> {
        if write.is_empty() {
            return Ok(());
        }
        self.state.commit(write).await
    }

    /// Persist a write that changes the user's installed set and bump the
    /// user's generation.
    ///
    /// With `expected` set, the write is applied only if the generation still
    /// equals it; returns `Ok(false)` without writing otherwise.
    pub async fn commit_installed_set(
        &self,
        write: &PairWrite,
        expected: Option<u64>,
    ) -> Result<bool, RepositoryError> {
        let _guard = self.locks.user_commit(&write.user_id).await;
        if expected.is_some_and(|generation| generation != self.cache.generation(&write.user_id)) {
            return Ok(false);
        }
        self.state.commit(write).await?;
        self.cache.bump(&write.user_id);
        Ok(true)
    }
}

/// Handle to a running engine. Clones share all state.
pub struct Engine<M: ManifestRepository, S: StateRepository> {
    ctx: Arc<EngineContext<M, S>>,
}

impl<M: ManifestRepository, S: StateRepository> Clone for Engine<M, S> {
    fn clone(&self) -> Self {
        Self {
            ctx: Arc::clone(&self.ctx),
        }
    }
}

impl<M: ManifestRepository, S: StateRepository> Engine<M, S> {
    /// Build an engine over the given repositories. Rejects an invalid
    /// isolation tier table.
    pub fn new(manifests: M, state: S, config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            ctx: Arc::new(EngineContext::new(manifests, state, config)),
        })
    }

    pub fn manifests(&self) -> ManifestService<M, S> {
        ManifestService::new(Arc::clone(&self.ctx))
    }

    pub fn installer(&self) -> InstallService<M, S> {
        InstallService::new(Arc::clone(&self.ctx))
    }

    pub fn permissions(&self) -> PermissionService<M, S> {
        PermissionService::new(Arc::clone(&self.ctx))
    }

    pub fn sandbox(&self) -> SandboxService<M, S> {
        SandboxService::new(Arc::clone(&self.ctx))
    }

    pub fn events(&self) -> &EventBus {
        &self.ctx.events
    }

    pub fn config(&self) -> &EngineConfig {
        &self.ctx.config
    }
}
