//! Outcome events published by the engine.
//!
//! `EngineEvent` is broadcast to every subscriber of the event bus. All
//! variants are Clone + Send + Sync for use with tokio broadcast channels.

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::installation::FailureKind;
use crate::permission::PermissionKind;
use crate::sandbox::SandboxConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// An install or upgrade transaction has begun.
    InstallStarted {
        user_id: String,
        plugin_id: String,
        version: Version,
    },

    /// A plugin reached `installed`.
    InstallCompleted {
        user_id: String,
        plugin_id: String,
        version: Version,
        dependencies: Vec<String>,
        auto_installed: bool,
    },

    /// An install transaction halted.
    InstallFailed {
        user_id: String,
        plugin_id: String,
        kind: FailureKind,
        error: String,
    },

    PluginUninstalled {
        user_id: String,
        plugin_id: String,
        /// True when removed because a required dependency was uninstalled.
        cascaded: bool,
    },

    PermissionsRequested {
        user_id: String,
        plugin_id: String,
        kinds: Vec<PermissionKind>,
    },

    PermissionsGranted {
        user_id: String,
        plugin_id: String,
        kinds: Vec<PermissionKind>,
    },

    PermissionsRevoked {
        user_id: String,
        plugin_id: String,
        kinds: Vec<PermissionKind>,
    },

    /// A sandbox config was provisioned or replaced.
    SandboxUpdated { config: SandboxConfig },

    /// Enforcement was switched off entirely for a plugin.
    SandboxDisabled { user_id: String, plugin_id: String },
}

impl EngineEvent {
    /// The (user, plugin) pair this event concerns.
    pub fn pair(&self) -> (&str, &str) {
        match self {
            EngineEvent::InstallStarted { user_id, plugin_id, .. }
            | EngineEvent::InstallCompleted { user_id, plugin_id, .. }
            | EngineEvent::InstallFailed { user_id, plugin_id, .. }
            | EngineEvent::PluginUninstalled { user_id, plugin_id, .. }
            | EngineEvent::PermissionsRequested { user_id, plugin_id, .. }
            | EngineEvent::PermissionsGranted { user_id, plugin_id, .. }
            | EngineEvent::PermissionsRevoked { user_id, plugin_id, .. }
            | EngineEvent::SandboxDisabled { user_id, plugin_id } => {
                (user_id.as_str(), plugin_id.as_str())
            }
            EngineEvent::SandboxUpdated { config } => {
                (config.user_id.as_str(), config.plugin_id.as_str())
            }
        }
    }
}
