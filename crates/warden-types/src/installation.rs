//! Installation lifecycle records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};

/// Lifecycle state of an installation.
///
/// - Pending: created at request time, steps still running
/// - Installed: resolution, permissions, and sandbox provisioning all succeeded
/// - Failed: a step failed; partial progress (installed dependencies) is kept
/// - Uninstalled: explicitly removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallStatus {
    Pending,
    Installed,
    Failed,
    Uninstalled,
}

impl fmt::Display for InstallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallStatus::Pending => write!(f, "pending"),
            InstallStatus::Installed => write!(f, "installed"),
            InstallStatus::Failed => write!(f, "failed"),
            InstallStatus::Uninstalled => write!(f, "uninstalled"),
        }
    }
}

impl FromStr for InstallStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InstallStatus::Pending),
            "installed" => Ok(InstallStatus::Installed),
            "failed" => Ok(InstallStatus::Failed),
            "uninstalled" => Ok(InstallStatus::Uninstalled),
            other => Err(format!("invalid install status: '{other}'")),
        }
    }
}

/// Which step of an install failed, for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnresolvableConflict,
    MissingRequiredDependency,
    DependencyInstallFailed,
    PermissionNotGranted,
    Storage,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::UnresolvableConflict => write!(f, "unresolvable_conflict"),
            FailureKind::MissingRequiredDependency => write!(f, "missing_required_dependency"),
            FailureKind::DependencyInstallFailed => write!(f, "dependency_install_failed"),
            FailureKind::PermissionNotGranted => write!(f, "permission_not_granted"),
            FailureKind::Storage => write!(f, "storage"),
        }
    }
}

/// Typed failure attached to a failed installation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Offending items: conflict strings, missing `id@constraint`s, or
    /// permission kinds, depending on `kind`.
    #[serde(default)]
    pub details: Vec<String>,
}

/// One (user, plugin) installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationRecord {
    pub user_id: String,
    pub plugin_id: String,
    pub version: Version,
    pub status: InstallStatus,
    /// Ids of the dependencies that were satisfied when this record was last
    /// resolved, sorted.
    #[serde(default)]
    pub dependencies_resolved: Vec<String>,
    /// True when installed only to satisfy another plugin's dependency.
    #[serde(default)]
    pub auto_installed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<InstallFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InstallationRecord {
    /// A fresh `pending` record.
    pub fn pending(user_id: &str, plugin_id: &str, version: Version) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.to_string(),
            plugin_id: plugin_id.to_string(),
            version,
            status: InstallStatus::Pending,
            dependencies_resolved: Vec::new(),
            auto_installed: false,
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_installed(&self) -> bool {
        self.status == InstallStatus::Installed
    }
}

/// Options for an install request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallOptions {
    /// Install missing required dependencies depth-first before the target.
    #[serde(default = "default_true")]
    pub auto_install_dependencies: bool,
    /// Specific version to install; latest published when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
}

fn default_true() -> bool {
    true
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            auto_install_dependencies: true,
            version: None,
        }
    }
}

/// Options for an uninstall request.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UninstallOptions {
    /// Remove installed plugins that require this one, instead of refusing.
    #[serde(default)]
    pub cascade: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip() {
        for status in [
            InstallStatus::Pending,
            InstallStatus::Installed,
            InstallStatus::Failed,
            InstallStatus::Uninstalled,
        ] {
            assert_eq!(status.to_string().parse::<InstallStatus>().unwrap(), status);
        }
    }

    #[test]
    fn pending_record_defaults() {
        let record = InstallationRecord::pending("u1", "eslint-pro", Version::new(1, 0, 0));
        assert_eq!(record.status, InstallStatus::Pending);
        assert!(!record.is_installed());
        assert!(record.failure.is_none());
        assert_eq!(record.created_at, record.updated_at);
    }

    #[test]
    fn install_options_default_auto_installs() {
        let opts: InstallOptions = serde_json::from_str("{}").unwrap();
        assert!(opts.auto_install_dependencies);
        assert!(opts.version.is_none());
    }
}
