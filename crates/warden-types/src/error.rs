use thiserror::Error;

use crate::installation::{FailureKind, InstallFailure};
use crate::permission::PermissionKind;
use crate::sandbox::ResourceKind;

/// Errors from repository operations (used by trait definitions in warden-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors raised while validating or publishing a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("invalid plugin id: '{0}'")]
    InvalidId(String),

    #[error("plugin '{0}' cannot depend on itself")]
    SelfDependency(String),

    #[error("plugin '{plugin_id}' declares dependency '{dependency}' more than once")]
    DuplicateDependency { plugin_id: String, dependency: String },

    #[error("plugin '{plugin_id}' declares permission '{kind}' more than once")]
    DuplicatePermission {
        plugin_id: String,
        kind: PermissionKind,
    },

    #[error("invalid version '{0}'")]
    InvalidVersion(String),

    #[error("{plugin_id}@{version} is already published with different content")]
    ImmutableVersion { plugin_id: String, version: String },

    #[error("storage error: {0}")]
    Storage(String),
}

/// Errors from permission operations and runtime enforcement.
#[derive(Debug, Error)]
pub enum PermissionError {
    /// A gated operation was attempted without a `granted` grant.
    #[error("permission '{kind}' not granted to plugin '{plugin_id}' for user '{user_id}'")]
    NotGranted {
        plugin_id: String,
        user_id: String,
        kind: PermissionKind,
    },

    #[error("plugin '{plugin_id}' does not declare permission '{kind}'")]
    NotDeclared {
        plugin_id: String,
        kind: PermissionKind,
    },

    #[error("unknown plugin '{0}'")]
    UnknownPlugin(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Errors from sandbox configuration and limit checks.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("disabling the sandbox for plugin '{plugin_id}' requires explicit confirmation")]
    DisableNotConfirmed { plugin_id: String },

    #[error("invalid {resource} limit: {reason}")]
    InvalidLimit {
        resource: ResourceKind,
        reason: String,
    },

    /// Raised by the execution runtime; carries the effective ceiling that
    /// was exceeded.
    #[error("plugin '{plugin_id}' exceeded {resource} limit: used {used}, limit {limit}")]
    LimitExceeded {
        plugin_id: String,
        resource: ResourceKind,
        used: u64,
        limit: u64,
    },

    #[error("unknown plugin '{0}'")]
    UnknownPlugin(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Errors from install, upgrade, and uninstall transactions.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("plugin '{plugin_id}' not found in registry")]
    PluginNotFound {
        plugin_id: String,
        version: Option<String>,
    },

    #[error("cannot install '{plugin_id}': {}", .conflicts.join("; "))]
    UnresolvableConflict {
        plugin_id: String,
        conflicts: Vec<String>,
    },

    #[error("cannot install '{plugin_id}': missing required dependencies {}", .missing.join(", "))]
    MissingRequiredDependency {
        plugin_id: String,
        missing: Vec<String>,
    },

    #[error("dependency '{dependency}' of '{plugin_id}' failed to install: {reason}")]
    DependencyInstallFailed {
        plugin_id: String,
        dependency: String,
        reason: String,
    },

    #[error("cannot uninstall '{plugin_id}': required by {}", .dependents.join(", "))]
    DependencyStillRequired {
        plugin_id: String,
        dependents: Vec<String>,
    },

    #[error("plugin '{plugin_id}' is missing granted permissions: {}", join_kinds(.kinds))]
    PermissionNotGranted {
        plugin_id: String,
        kinds: Vec<PermissionKind>,
    },

    #[error("plugin '{plugin_id}' is not installed")]
    NotInstalled { plugin_id: String },

    /// The user's installed set kept changing between resolution and commit.
    #[error("installed plugins changed {attempts} times while installing '{plugin_id}'; try again")]
    Contended { plugin_id: String, attempts: u32 },

    #[error("storage error: {0}")]
    Storage(String),
}

fn join_kinds(kinds: &[PermissionKind]) -> String {
    kinds
        .iter()
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl InstallError {
    /// The typed failure persisted on the installation record, if this error
    /// is one that a record can carry.
    pub fn to_failure(&self) -> Option<InstallFailure> {
        let (kind, details) = match self {
            InstallError::UnresolvableConflict { conflicts, .. } => {
                (FailureKind::UnresolvableConflict, conflicts.clone())
            }
            InstallError::MissingRequiredDependency { missing, .. } => {
                (FailureKind::MissingRequiredDependency, missing.clone())
            }
            InstallError::DependencyInstallFailed { dependency, .. } => {
                (FailureKind::DependencyInstallFailed, vec![dependency.clone()])
            }
            InstallError::PermissionNotGranted { kinds, .. } => (
                FailureKind::PermissionNotGranted,
                kinds.iter().map(|k| k.to_string()).collect(),
            ),
            InstallError::Storage(_) => (FailureKind::Storage, Vec::new()),
            InstallError::PluginNotFound { .. }
            | InstallError::DependencyStillRequired { .. }
            | InstallError::NotInstalled { .. }
            | InstallError::Contended { .. } => return None,
        };

        Some(InstallFailure {
            kind,
            message: self.to_string(),
            details,
        })
    }
}

impl From<RepositoryError> for InstallError {
    fn from(e: RepositoryError) -> Self {
        InstallError::Storage(e.to_string())
    }
}

impl From<RepositoryError> for PermissionError {
    fn from(e: RepositoryError) -> Self {
        PermissionError::Storage(e.to_string())
    }
}

impl From<RepositoryError> for SandboxError {
    fn from(e: RepositoryError) -> Self {
        SandboxError::Storage(e.to_string())
    }
}

impl From<RepositoryError> for ManifestError {
    fn from(e: RepositoryError) -> Self {
        ManifestError::Storage(e.to_string())
    }
}

impl From<PermissionError> for InstallError {
    fn from(e: PermissionError) -> Self {
        match e {
            PermissionError::NotGranted { plugin_id, kind, .. } => {
                InstallError::PermissionNotGranted {
                    plugin_id,
                    kinds: vec![kind],
                }
            }
            PermissionError::UnknownPlugin(plugin_id) => InstallError::PluginNotFound {
                plugin_id,
                version: None,
            },
            other => InstallError::Storage(other.to_string()),
        }
    }
}

impl From<SandboxError> for InstallError {
    fn from(e: SandboxError) -> Self {
        InstallError::Storage(e.to_string())
    }
}

/// Errors from engine configuration validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("syntax error".to_string());
        assert_eq!(err.to_string(), "query error: syntax error");
    }

    #[test]
    fn test_conflict_error_display_joins_entries() {
        let err = InstallError::UnresolvableConflict {
            plugin_id: "a".to_string(),
            conflicts: vec!["x".to_string(), "y".to_string()],
        };
        assert_eq!(err.to_string(), "cannot install 'a': x; y");
    }

    #[test]
    fn test_permission_not_granted_failure_details() {
        let err = InstallError::PermissionNotGranted {
            plugin_id: "c".to_string(),
            kinds: vec![PermissionKind::ReadFiles, PermissionKind::NetworkAccess],
        };
        let failure = err.to_failure().unwrap();
        assert_eq!(failure.kind, FailureKind::PermissionNotGranted);
        assert_eq!(failure.details, vec!["read-files", "network-access"]);
        assert!(failure.message.contains("read-files, network-access"));
    }

    #[test]
    fn test_uninstall_errors_do_not_become_record_failures() {
        let err = InstallError::DependencyStillRequired {
            plugin_id: "b".to_string(),
            dependents: vec!["a".to_string()],
        };
        assert!(err.to_failure().is_none());
        assert_eq!(err.to_string(), "cannot uninstall 'b': required by a");
    }

    #[test]
    fn test_limit_exceeded_display() {
        let err = SandboxError::LimitExceeded {
            plugin_id: "p".to_string(),
            resource: ResourceKind::Memory,
            used: 900,
            limit: 512,
        };
        assert!(err.to_string().contains("used 900, limit 512"));
    }
}
