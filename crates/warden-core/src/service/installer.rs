//! Installation orchestrator.
//!
//! An install runs its steps in order: resolve, install planned dependencies
//! depth-first, request permissions, provision the sandbox, mark the record
//! `installed`. Resolution happens outside any lock; the final commit holds
//! the pair lock and is validated against the user's generation, re-resolving
//! when the installed set changed in between.
//!
//! Each dependency is its own transaction holding only its own pair lock, so
//! at most one pair lock is held at a time. A failed step marks the record
//! `failed` with a typed failure and leaves already-installed dependencies in
//! place.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use semver::Version;
use tracing::Instrument;
use warden_types::error::InstallError;
use warden_types::event::EngineEvent;
use warden_types::installation::{
    InstallOptions, InstallStatus, InstallationRecord, UninstallOptions,
};
use warden_types::permission::PermissionKind;
use warden_types::plugin::PluginManifest;
use warden_types::resolution::{Resolution, ResolvedDependency};
use warden_types::sandbox::SandboxConfig;

use super::EngineContext;
use crate::permission::GrantSet;
use crate::plugin::graph::{DependencyGraph, format_cycle};
use crate::repository::manifest::ManifestRepository;
use crate::repository::state::{PairWrite, SandboxWrite, StateRepository};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub struct InstallService<M: ManifestRepository, S: StateRepository> {
    ctx: Arc<EngineContext<M, S>>,
}

impl<M: ManifestRepository, S: StateRepository> InstallService<M, S> {
    pub fn new(ctx: Arc<EngineContext<M, S>>) -> Self {
        Self { ctx }
    }

    /// Resolve `plugin_id` (latest version unless `version` is given) against
    /// the user's installed set. Latest-version resolutions are cached until
    /// the installed set or the registry changes.
    pub async fn resolution(
        &self,
        plugin_id: &str,
        user_id: &str,
        version: Option<&Version>,
    ) -> Result<Resolution, InstallError> {
        if version.is_none() {
            if let Some(cached) = self.ctx.cache.get(plugin_id, user_id) {
                tracing::debug!(plugin_id, user_id, "resolution cache hit");
                return Ok(cached);
            }
        }

        let target = self.target(plugin_id, version).await?;
        let (resolution, stamp) = self.ctx.resolve_for(user_id, &target, true).await?;
        if version.is_none() {
            self.ctx.cache.put(user_id, stamp, resolution.clone());
        }
        Ok(resolution)
    }

    /// Every installation record of `user_id`, ordered by plugin id.
    pub async fn installations(&self, user_id: &str) -> Result<Vec<InstallationRecord>, InstallError> {
        Ok(self.ctx.state.list_installations(user_id).await?)
    }

    pub async fn installation(
        &self,
        plugin_id: &str,
        user_id: &str,
    ) -> Result<Option<InstallationRecord>, InstallError> {
        Ok(self.ctx.state.get_installation(user_id, plugin_id).await?)
    }

    /// Install `plugin_id` for `user_id`.
    ///
    /// Installing the installed version again is a no-op; installing a
    /// different version is an upgrade and passes the same gates.
    pub async fn install(
        &self,
        plugin_id: &str,
        user_id: &str,
        options: &InstallOptions,
    ) -> Result<InstallationRecord, InstallError> {
        let span = tracing::info_span!(
            "install",
            plugin_id,
            user_id,
            version = ?options.version,
            auto_install = options.auto_install_dependencies,
        );
        let mut visiting = Vec::new();
        self.install_tree(
            plugin_id,
            user_id,
            options.version.clone(),
            options.auto_install_dependencies,
            false,
            &mut visiting,
        )
        .instrument(span)
        .await
    }

    /// Move an installed plugin to `version`. Fails with `NotInstalled` when
    /// there is nothing to upgrade.
    pub async fn upgrade(
        &self,
        plugin_id: &str,
        user_id: &str,
        version: &Version,
    ) -> Result<InstallationRecord, InstallError> {
        let record = self
            .ctx
            .state
            .get_installation(user_id, plugin_id)
            .await?
            .filter(|r| r.is_installed())
            .ok_or_else(|| InstallError::NotInstalled {
                plugin_id: plugin_id.to_string(),
            })?;

        let span = tracing::info_span!(
            "upgrade",
            plugin_id,
            user_id,
            from = %record.version,
            to = %version,
        );
        let mut visiting = Vec::new();
        self.install_tree(
            plugin_id,
            user_id,
            Some(version.clone()),
            true,
            record.auto_installed,
            &mut visiting,
        )
        .instrument(span)
        .await
    }

    /// Remove `plugin_id`: revoke its grants, delete its sandbox config and
    /// mark the record `uninstalled`.
    ///
    /// Installed plugins that require it block the removal unless `cascade`
    /// is set, in which case they are uninstalled first.
    pub async fn uninstall(
        &self,
        plugin_id: &str,
        user_id: &str,
        options: UninstallOptions,
    ) -> Result<(), InstallError> {
        let span = tracing::info_span!("uninstall", plugin_id, user_id, cascade = options.cascade);
        let mut visiting = Vec::new();
        self.uninstall_tree(plugin_id, user_id, options.cascade, false, &mut visiting)
            .instrument(span)
            .await
    }

    async fn target(&self, plugin_id: &str, version: Option<&Version>) -> Result<PluginManifest, InstallError> {
        let manifest = match version {
            Some(version) => self.ctx.manifests.get(plugin_id, version).await?,
            None => self.ctx.latest(plugin_id).await?,
        };
        manifest.ok_or_else(|| InstallError::PluginNotFound {
            plugin_id: plugin_id.to_string(),
            version: version.map(|v| v.to_string()),
        })
    }

    fn install_tree<'a>(
        &'a self,
        plugin_id: &'a str,
        user_id: &'a str,
        version: Option<Version>,
        auto_install: bool,
        as_dependency: bool,
        visiting: &'a mut Vec<String>,
    ) -> BoxFuture<'a, Result<InstallationRecord, InstallError>> {
        Box::pin(async move {
            if let Some(pos) = visiting.iter().position(|id| id == plugin_id) {
                let mut path = visiting[pos..].to_vec();
                path.push(plugin_id.to_string());
                return Err(InstallError::UnresolvableConflict {
                    plugin_id: plugin_id.to_string(),
                    conflicts: vec![format_cycle(&path)],
                });
            }

            let target = self.target(plugin_id, version.as_ref()).await?;

            if let Some(record) = self.already_installed(&target, user_id, as_dependency).await? {
                return Ok(record);
            }

            self.ctx.events.publish(EngineEvent::InstallStarted {
                user_id: user_id.to_string(),
                plugin_id: plugin_id.to_string(),
                version: target.version.clone(),
            });

            visiting.push(plugin_id.to_string());
            let result = self
                .install_steps(&target, user_id, auto_install, as_dependency, visiting)
                .await;
            visiting.pop();

            if let Err(err) = &result {
                self.record_failure(&target, user_id, err).await;
            }
            result
        })
    }

    /// The existing record when `target` is already installed at its version.
    /// An explicit install of an auto-installed plugin makes it explicit.
    async fn already_installed(
        &self,
        target: &PluginManifest,
        user_id: &str,
        as_dependency: bool,
    ) -> Result<Option<InstallationRecord>, InstallError> {
        let _guard = self.ctx.locks.pair(user_id, &target.id).await;
        let Some(mut record) = self
            .ctx
            .state
            .get_installation(user_id, &target.id)
            .await?
            .filter(|r| r.is_installed() && r.version == target.version)
        else {
            return Ok(None);
        };

        if record.auto_installed && !as_dependency {
            record.auto_installed = false;
            record.updated_at = Utc::now();
            let mut write = PairWrite::new(user_id, &target.id);
            write.installation = Some(record.clone());
            self.ctx.commit(&write).await?;
        }
        tracing::debug!(plugin_id = %target.id, "already installed at requested version");
        Ok(Some(record))
    }

    async fn install_steps(
        &self,
        target: &PluginManifest,
        user_id: &str,
        auto_install: bool,
        as_dependency: bool,
        visiting: &mut Vec<String>,
    ) -> Result<InstallationRecord, InstallError> {
        self.mark_pending(target, user_id, as_dependency).await?;

        // Step 1: resolve and reject what can never be installed.
        let (resolution, _) = self.ctx.resolve_for(user_id, target, auto_install).await?;
        check_resolution(&resolution)?;
        for warning in &resolution.warnings {
            tracing::warn!(plugin_id = %target.id, "{warning}");
        }

        // Step 2: planned dependencies, depth-first in install order.
        let planned: Vec<ResolvedDependency> = resolution.planned().into_iter().cloned().collect();
        for dependency in planned {
            let installed = self
                .install_tree(
                    &dependency.plugin_id,
                    user_id,
                    Some(dependency.version.clone()),
                    auto_install,
                    true,
                    visiting,
                )
                .await;

            match installed {
                Ok(_) => {}
                Err(err) if !dependency.required => {
                    tracing::warn!(
                        dependency = %dependency.plugin_id,
                        error = %err,
                        "optional dependency failed to install, continuing"
                    );
                }
                Err(err) => {
                    return Err(InstallError::DependencyInstallFailed {
                        plugin_id: target.id.clone(),
                        dependency: dependency.plugin_id.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        // Steps 3-5: validated commit.
        let attempts = self.ctx.config.max_resolve_retries + 1;
        for attempt in 1..=attempts {
            let (resolution, stamp) = self.ctx.resolve_for(user_id, target, auto_install).await?;
            check_resolution(&resolution)?;
            let unmet: Vec<String> = resolution
                .planned()
                .into_iter()
                .filter(|d| d.required)
                .map(|d| format!("{}@{}", d.plugin_id, d.version))
                .collect();
            if !unmet.is_empty() {
                return Err(InstallError::MissingRequiredDependency {
                    plugin_id: target.id.clone(),
                    missing: unmet,
                });
            }

            match self
                .commit_install(target, user_id, as_dependency, &resolution, stamp.user)
                .await?
            {
                Some(record) => return Ok(record),
                None => tracing::debug!(attempt, "installed set changed during install, re-resolving"),
            }
        }

        Err(InstallError::Contended {
            plugin_id: target.id.clone(),
            attempts,
        })
    }

    /// Create or reset the record to `pending`. An installed record being
    /// upgraded stays `installed` until the upgrade commits.
    async fn mark_pending(
        &self,
        target: &PluginManifest,
        user_id: &str,
        as_dependency: bool,
    ) -> Result<(), InstallError> {
        let _guard = self.ctx.locks.pair(user_id, &target.id).await;
        let existing = self.ctx.state.get_installation(user_id, &target.id).await?;

        let record = match existing {
            Some(record) if record.is_installed() => return Ok(()),
            Some(mut record) if record.status != InstallStatus::Uninstalled => {
                record.status = InstallStatus::Pending;
                record.version = target.version.clone();
                record.auto_installed = record.auto_installed && as_dependency;
                record.failure = None;
                record.updated_at = Utc::now();
                record
            }
            _ => {
                let mut record = InstallationRecord::pending(user_id, &target.id, target.version.clone());
                record.auto_installed = as_dependency;
                record
            }
        };

        let mut write = PairWrite::new(user_id, &target.id);
        write.installation = Some(record);
        self.ctx.commit(&write).await?;
        Ok(())
    }

    /// Request permissions, provision the sandbox and mark the record
    /// installed, all in one write under the pair lock. Returns `None` when
    /// the user's generation moved past `expected`.
    async fn commit_install(
        &self,
        target: &PluginManifest,
        user_id: &str,
        as_dependency: bool,
        resolution: &Resolution,
        expected: u64,
    ) -> Result<Option<InstallationRecord>, InstallError> {
        let _guard = self.ctx.locks.pair(user_id, &target.id).await;
        let snapshot = self.ctx.state.snapshot(user_id, &target.id).await?;
        let now = Utc::now();

        // A concurrent request for the same pair may have finished first.
        if let Some(record) = snapshot
            .installation
            .as_ref()
            .filter(|r| r.is_installed() && r.version == target.version)
        {
            return Ok(Some(record.clone()));
        }

        let mut grants = GrantSet::new(user_id, &target.id, snapshot.grants);
        let requested = grants.request(target, now);
        let unsatisfied = grants.unsatisfied(target);

        let mut write = PairWrite::new(user_id, &target.id);
        write.grants = grants.changed();

        if !unsatisfied.is_empty() {
            // Keep the requests so the user can grant them and retry.
            self.ctx.commit(&write).await?;
            self.publish_requested(target, user_id, requested);
            return Err(InstallError::PermissionNotGranted {
                plugin_id: target.id.clone(),
                kinds: unsatisfied,
            });
        }

        let provisioned = snapshot.sandbox.is_none().then(|| {
            SandboxConfig::provisioned(&target.id, user_id, self.ctx.config.default_isolation_level)
        });
        if let Some(config) = &provisioned {
            write.sandbox = SandboxWrite::Put(config.clone());
        }

        let mut record = snapshot
            .installation
            .unwrap_or_else(|| InstallationRecord::pending(user_id, &target.id, target.version.clone()));
        record.version = target.version.clone();
        record.status = InstallStatus::Installed;
        record.dependencies_resolved = resolution.satisfied_ids();
        record.auto_installed = record.auto_installed && as_dependency;
        record.failure = None;
        record.updated_at = now;
        write.installation = Some(record.clone());

        if !self.ctx.commit_installed_set(&write, Some(expected)).await? {
            return Ok(None);
        }

        self.publish_requested(target, user_id, requested);
        if let Some(config) = provisioned {
            self.ctx.events.publish(EngineEvent::SandboxUpdated { config });
        }
        self.ctx.events.publish(EngineEvent::InstallCompleted {
            user_id: user_id.to_string(),
            plugin_id: target.id.clone(),
            version: record.version.clone(),
            dependencies: record.dependencies_resolved.clone(),
            auto_installed: record.auto_installed,
        });
        tracing::info!(
            plugin_id = %target.id,
            version = %record.version,
            auto_installed = record.auto_installed,
            "plugin installed"
        );

        Ok(Some(record))
    }

    fn publish_requested(
        &self,
        target: &PluginManifest,
        user_id: &str,
        kinds: Vec<PermissionKind>,
    ) {
        if kinds.is_empty() {
            return;
        }
        self.ctx.events.publish(EngineEvent::PermissionsRequested {
            user_id: user_id.to_string(),
            plugin_id: target.id.clone(),
            kinds,
        });
    }

    /// Attach `err` to the record. An installed record (a failed upgrade or
    /// reinstall) is left as it was.
    async fn record_failure(&self, target: &PluginManifest, user_id: &str, err: &InstallError) {
        let Some(failure) = err.to_failure() else {
            tracing::warn!(plugin_id = %target.id, error = %err, "install aborted");
            return;
        };

        let _guard = self.ctx.locks.pair(user_id, &target.id).await;
        let stored = match self.ctx.state.get_installation(user_id, &target.id).await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::error!(plugin_id = %target.id, error = %e, "failed to load record after install failure");
                return;
            }
        };

        if stored.as_ref().is_some_and(|r| r.is_installed()) {
            tracing::warn!(
                plugin_id = %target.id,
                version = %target.version,
                error = %err,
                "upgrade failed, installed version kept"
            );
        } else {
            let mut record = stored
                .unwrap_or_else(|| InstallationRecord::pending(user_id, &target.id, target.version.clone()));
            record.version = target.version.clone();
            record.status = InstallStatus::Failed;
            record.failure = Some(failure.clone());
            record.updated_at = Utc::now();

            let mut write = PairWrite::new(user_id, &target.id);
            write.installation = Some(record);
            if let Err(e) = self.ctx.commit(&write).await {
                tracing::error!(plugin_id = %target.id, error = %e, "failed to persist install failure");
            }
            tracing::warn!(plugin_id = %target.id, error = %err, "install failed");
        }

        self.ctx.events.publish(EngineEvent::InstallFailed {
            user_id: user_id.to_string(),
            plugin_id: target.id.clone(),
            kind: failure.kind,
            error: failure.message,
        });
    }

    fn uninstall_tree<'a>(
        &'a self,
        plugin_id: &'a str,
        user_id: &'a str,
        cascade: bool,
        cascaded: bool,
        visiting: &'a mut Vec<String>,
    ) -> BoxFuture<'a, Result<(), InstallError>> {
        Box::pin(async move {
            visiting.push(plugin_id.to_string());
            let result = self
                .uninstall_steps(plugin_id, user_id, cascade, cascaded, visiting)
                .await;
            visiting.pop();
            result
        })
    }

    async fn uninstall_steps(
        &self,
        plugin_id: &str,
        user_id: &str,
        cascade: bool,
        cascaded: bool,
        visiting: &mut Vec<String>,
    ) -> Result<(), InstallError> {
        let live = self
            .ctx
            .state
            .get_installation(user_id, plugin_id)
            .await?
            .is_some_and(|r| r.status != InstallStatus::Uninstalled);
        if !live {
            return Err(InstallError::NotInstalled {
                plugin_id: plugin_id.to_string(),
            });
        }

        let attempts = self.ctx.config.max_resolve_retries + 1;
        let mut attempt = 0;
        loop {
            let stamp = self.ctx.cache.stamp(user_id);

            let installed = self.ctx.installed_manifests(user_id).await?;
            let dependents: Vec<String> = DependencyGraph::from_manifests(&installed)
                .required_dependents(plugin_id)
                .into_iter()
                .filter(|id| id != plugin_id && !visiting.contains(id))
                .collect();

            if !dependents.is_empty() {
                if !cascade {
                    return Err(InstallError::DependencyStillRequired {
                        plugin_id: plugin_id.to_string(),
                        dependents,
                    });
                }
                for dependent in &dependents {
                    tracing::info!(dependent = %dependent, "cascading uninstall to dependent");
                    self.uninstall_tree(dependent, user_id, true, true, visiting).await?;
                }
                continue;
            }

            if self.remove(plugin_id, user_id, cascaded, stamp.user).await? {
                return Ok(());
            }
            attempt += 1;
            if attempt >= attempts {
                return Err(InstallError::Contended {
                    plugin_id: plugin_id.to_string(),
                    attempts,
                });
            }
            tracing::debug!(attempt, "installed set changed during uninstall, re-checking dependents");
        }
    }

    /// Revoke every grant, delete the sandbox config and mark the record
    /// uninstalled in one write. Returns `false` when the user's generation
    /// moved past `expected`.
    async fn remove(
        &self,
        plugin_id: &str,
        user_id: &str,
        cascaded: bool,
        expected: u64,
    ) -> Result<bool, InstallError> {
        let _guard = self.ctx.locks.pair(user_id, plugin_id).await;
        let snapshot = self.ctx.state.snapshot(user_id, plugin_id).await?;
        let now = Utc::now();

        let mut record = snapshot
            .installation
            .filter(|r| r.status != InstallStatus::Uninstalled)
            .ok_or_else(|| InstallError::NotInstalled {
                plugin_id: plugin_id.to_string(),
            })?;

        let mut grants = GrantSet::new(user_id, plugin_id, snapshot.grants);
        let revoked = grants.revoke(None, now);

        record.status = InstallStatus::Uninstalled;
        record.failure = None;
        record.updated_at = now;

        let mut write = PairWrite::new(user_id, plugin_id);
        write.installation = Some(record);
        write.grants = grants.changed();
        write.sandbox = SandboxWrite::Delete;

        if !self.ctx.commit_installed_set(&write, Some(expected)).await? {
            return Ok(false);
        }

        if !revoked.is_empty() {
            self.ctx.events.publish(EngineEvent::PermissionsRevoked {
                user_id: user_id.to_string(),
                plugin_id: plugin_id.to_string(),
                kinds: revoked,
            });
        }
        self.ctx.events.publish(EngineEvent::PluginUninstalled {
            user_id: user_id.to_string(),
            plugin_id: plugin_id.to_string(),
            cascaded,
        });
        tracing::info!(plugin_id, cascaded, "plugin uninstalled");
        Ok(true)
    }
}

/// Blocking conflicts first, then blocking missing dependencies.
fn check_resolution(resolution: &Resolution) -> Result<(), InstallError> {
    if !resolution.conflicts.is_empty() {
        return Err(InstallError::UnresolvableConflict {
            plugin_id: resolution.plugin_id.clone(),
            conflicts: resolution.conflicts.clone(),
        });
    }
    if !resolution.missing.is_empty() {
        return Err(InstallError::MissingRequiredDependency {
            plugin_id: resolution.plugin_id.clone(),
            missing: resolution.missing.clone(),
        });
    }
    Ok(())
}
