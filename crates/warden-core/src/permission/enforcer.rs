//! Runtime capability enforcement.
//!
//! Before the execution runtime performs a privileged operation on a plugin's
//! behalf it builds a [`CapabilityEnforcer`] from the authoritative grant
//! state and checks the operation's permission kind. A revoked grant fails
//! the next check; nothing is cached across invocations.

use std::collections::HashSet;

use warden_types::error::PermissionError;
use warden_types::permission::{PermissionGrant, PermissionKind};
use warden_types::plugin::PluginManifest;

/// Holds the kinds a plugin may exercise for one user.
///
/// Only grants in state `granted` for kinds the manifest still declares are
/// included; a granted row for a kind the manifest dropped is an inert
/// leftover.
#[derive(Debug, Clone)]
pub struct CapabilityEnforcer {
    granted: HashSet<PermissionKind>,
    plugin_id: String,
    user_id: String,
}

impl CapabilityEnforcer {
    pub fn new(manifest: &PluginManifest, user_id: &str, grants: &[PermissionGrant]) -> Self {
        let granted = grants
            .iter()
            .filter(|g| g.plugin_id == manifest.id && g.user_id == user_id)
            .filter(|g| g.is_granted() && manifest.declares(g.kind))
            .map(|g| g.kind)
            .collect();

        Self {
            granted,
            plugin_id: manifest.id.clone(),
            user_id: user_id.to_string(),
        }
    }

    /// Returns `Err(PermissionError::NotGranted)` unless `kind` is granted.
    pub fn check(&self, kind: PermissionKind) -> Result<(), PermissionError> {
        if self.granted.contains(&kind) {
            Ok(())
        } else {
            Err(PermissionError::NotGranted {
                plugin_id: self.plugin_id.clone(),
                user_id: self.user_id.clone(),
                kind,
            })
        }
    }

    /// Short-circuits on the first kind that is not granted.
    pub fn check_all(&self, kinds: &[PermissionKind]) -> Result<(), PermissionError> {
        for kind in kinds {
            self.check(*kind)?;
        }
        Ok(())
    }

    pub fn has_capability(&self, kind: PermissionKind) -> bool {
        self.granted.contains(&kind)
    }

    /// Granted kinds in catalog order.
    pub fn granted_kinds(&self) -> Vec<PermissionKind> {
        PermissionKind::ALL
            .into_iter()
            .filter(|k| self.granted.contains(k))
            .collect()
    }
}
