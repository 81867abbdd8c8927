//! Permission service: persists grant transitions per (user, plugin) pair.
//!
//! Transitions run under the pair lock against a fresh snapshot and are
//! committed as one write. The manifest consulted is the installed version
//! while a record exists, otherwise the latest published version.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use warden_types::error::{InstallError, PermissionError};
use warden_types::event::EngineEvent;
use warden_types::installation::{FailureKind, InstallStatus};
use warden_types::permission::{PermissionGrant, PermissionKind};
use warden_types::plugin::PluginManifest;

use super::EngineContext;
use crate::permission::{CapabilityEnforcer, GrantSet};
use crate::repository::manifest::ManifestRepository;
use crate::repository::state::{PairWrite, StateRepository};

pub struct PermissionService<M: ManifestRepository, S: StateRepository> {
    ctx: Arc<EngineContext<M, S>>,
}

impl<M: ManifestRepository, S: StateRepository> PermissionService<M, S> {
    pub fn new(ctx: Arc<EngineContext<M, S>>) -> Self {
        Self { ctx }
    }

    /// Persisted grants plus `not-requested` rows for declared kinds without
    /// one, in catalog order.
    pub async fn list(&self, plugin_id: &str, user_id: &str) -> Result<Vec<PermissionGrant>, PermissionError> {
        let snapshot = self.ctx.state.snapshot(user_id, plugin_id).await?;
        let manifest = self
            .ctx
            .governing_manifest(plugin_id, snapshot.installation.as_ref())
            .await?;
        if manifest.is_none() && snapshot.grants.is_empty() {
            return Err(PermissionError::UnknownPlugin(plugin_id.to_string()));
        }
        Ok(GrantSet::new(user_id, plugin_id, snapshot.grants).listing(manifest.as_ref()))
    }

    /// Request every declared kind that is not already requested or granted.
    #[tracing::instrument(name = "request_permissions", skip(self), fields(plugin_id = %plugin_id, user_id = %user_id))]
    pub async fn request(&self, plugin_id: &str, user_id: &str) -> Result<Vec<PermissionGrant>, PermissionError> {
        let (changed, listing) = self
            .transition(plugin_id, user_id, |set, manifest, now| Ok(set.request(manifest, now)))
            .await?;
        if !changed.is_empty() {
            tracing::info!(kinds = ?changed, "permissions requested");
            self.ctx.events.publish(EngineEvent::PermissionsRequested {
                user_id: user_id.to_string(),
                plugin_id: plugin_id.to_string(),
                kinds: changed,
            });
        }
        Ok(listing)
    }

    /// Grant `kinds`, or every declared kind when `None`.
    #[tracing::instrument(name = "grant_permissions", skip(self), fields(plugin_id = %plugin_id, user_id = %user_id))]
    pub async fn grant(
        &self,
        plugin_id: &str,
        user_id: &str,
        kinds: Option<&[PermissionKind]>,
    ) -> Result<Vec<PermissionGrant>, PermissionError> {
        let (changed, listing) = self
            .transition(plugin_id, user_id, |set, manifest, now| set.grant(manifest, kinds, now))
            .await?;
        if !changed.is_empty() {
            tracing::info!(kinds = ?changed, "permissions granted");
            self.ctx.events.publish(EngineEvent::PermissionsGranted {
                user_id: user_id.to_string(),
                plugin_id: plugin_id.to_string(),
                kinds: changed,
            });
        }
        Ok(listing)
    }

    /// Revoke `kinds`, or every existing grant when `None`.
    ///
    /// Revoking a required kind of an installed plugin moves its record to
    /// `failed` in the same write; granting again and re-running install
    /// restores it.
    #[tracing::instrument(name = "revoke_permissions", skip(self), fields(plugin_id = %plugin_id, user_id = %user_id))]
    pub async fn revoke(
        &self,
        plugin_id: &str,
        user_id: &str,
        kinds: Option<&[PermissionKind]>,
    ) -> Result<Vec<PermissionGrant>, PermissionError> {
        let (changed, listing) = self
            .transition(plugin_id, user_id, |set, _, now| Ok(set.revoke(kinds, now)))
            .await?;
        if !changed.is_empty() {
            tracing::info!(kinds = ?changed, "permissions revoked");
            self.ctx.events.publish(EngineEvent::PermissionsRevoked {
                user_id: user_id.to_string(),
                plugin_id: plugin_id.to_string(),
                kinds: changed,
            });
        }
        Ok(listing)
    }

    /// True iff every required kind of the governing manifest is granted.
    pub async fn is_fully_satisfied(&self, plugin_id: &str, user_id: &str) -> Result<bool, PermissionError> {
        let (manifest, set) = self.current(plugin_id, user_id).await?;
        Ok(set.is_fully_satisfied(&manifest))
    }

    /// Enforcement point for the execution runtime, built from the grant
    /// state as of this call.
    pub async fn enforcer(&self, plugin_id: &str, user_id: &str) -> Result<CapabilityEnforcer, PermissionError> {
        let (manifest, set) = self.current(plugin_id, user_id).await?;
        let grants: Vec<PermissionGrant> = set.grants().cloned().collect();
        Ok(CapabilityEnforcer::new(&manifest, user_id, &grants))
    }

    async fn current(&self, plugin_id: &str, user_id: &str) -> Result<(PluginManifest, GrantSet), PermissionError> {
        let snapshot = self.ctx.state.snapshot(user_id, plugin_id).await?;
        let manifest = self
            .ctx
            .governing_manifest(plugin_id, snapshot.installation.as_ref())
            .await?
            .ok_or_else(|| PermissionError::UnknownPlugin(plugin_id.to_string()))?;
        Ok((manifest, GrantSet::new(user_id, plugin_id, snapshot.grants)))
    }

    /// Apply one grant-set transition under the pair lock and commit it.
    /// Returns the kinds that changed and the resulting listing.
    async fn transition<F>(
        &self,
        plugin_id: &str,
        user_id: &str,
        apply: F,
    ) -> Result<(Vec<PermissionKind>, Vec<PermissionGrant>), PermissionError>
    where
        F: FnOnce(&mut GrantSet, &PluginManifest, DateTime<Utc>) -> Result<Vec<PermissionKind>, PermissionError>
            + Send,
    {
        let _guard = self.ctx.locks.pair(user_id, plugin_id).await;

        let snapshot = self.ctx.state.snapshot(user_id, plugin_id).await?;
        let manifest = self
            .ctx
            .governing_manifest(plugin_id, snapshot.installation.as_ref())
            .await?
            .ok_or_else(|| PermissionError::UnknownPlugin(plugin_id.to_string()))?;

        let now = Utc::now();
        let mut set = GrantSet::new(user_id, plugin_id, snapshot.grants);
        let changed = apply(&mut set, &manifest, now)?;

        let mut write = PairWrite::new(user_id, plugin_id);
        write.grants = set.changed();

        // An installed record must keep every required kind granted.
        let mut demoted = None;
        if let Some(mut record) = snapshot.installation.filter(|r| r.is_installed()) {
            let unsatisfied = set.unsatisfied(&manifest);
            if !unsatisfied.is_empty() {
                let err = InstallError::PermissionNotGranted {
                    plugin_id: plugin_id.to_string(),
                    kinds: unsatisfied,
                };
                record.status = InstallStatus::Failed;
                record.failure = err.to_failure();
                record.updated_at = now;
                write.installation = Some(record);
                demoted = Some(err);
            }
        }

        if demoted.is_some() {
            self.ctx.commit_installed_set(&write, None).await?;
        } else {
            self.ctx.commit(&write).await?;
        }

        if let Some(err) = demoted {
            tracing::warn!(error = %err, "required permission revoked, installation marked failed");
            self.ctx.events.publish(EngineEvent::InstallFailed {
                user_id: user_id.to_string(),
                plugin_id: plugin_id.to_string(),
                kind: FailureKind::PermissionNotGranted,
                error: err.to_string(),
            });
        }

        Ok((changed, set.listing(Some(&manifest))))
    }
}
