//! Permission kinds, risk tiers, and per-(user, plugin) grant records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named privilege a plugin may request and a user may grant or revoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionKind {
    ReadFiles,
    WriteFiles,
    ExecuteCommands,
    NetworkAccess,
    EnvironmentVariables,
    GitAccess,
    DatabaseAccess,
    ApiKeys,
}

impl PermissionKind {
    /// Every kind, in catalog order.
    pub const ALL: [PermissionKind; 8] = [
        PermissionKind::ReadFiles,
        PermissionKind::WriteFiles,
        PermissionKind::ExecuteCommands,
        PermissionKind::NetworkAccess,
        PermissionKind::EnvironmentVariables,
        PermissionKind::GitAccess,
        PermissionKind::DatabaseAccess,
        PermissionKind::ApiKeys,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadFiles => "read-files",
            Self::WriteFiles => "write-files",
            Self::ExecuteCommands => "execute-commands",
            Self::NetworkAccess => "network-access",
            Self::EnvironmentVariables => "environment-variables",
            Self::GitAccess => "git-access",
            Self::DatabaseAccess => "database-access",
            Self::ApiKeys => "api-keys",
        }
    }
}

impl fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PermissionKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("invalid permission kind: '{s}'"))
    }
}

/// How dangerous a permission kind is when granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskTier::Low => write!(f, "low"),
            RiskTier::Medium => write!(f, "medium"),
            RiskTier::High => write!(f, "high"),
            RiskTier::Critical => write!(f, "critical"),
        }
    }
}

/// Lifecycle of a single grant.
///
/// `not-requested -> requested -> granted`, `requested -> revoked`,
/// `granted -> revoked`, and `revoked -> requested` to restart the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionState {
    NotRequested,
    Requested,
    Granted,
    Revoked,
}

impl fmt::Display for PermissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionState::NotRequested => write!(f, "not-requested"),
            PermissionState::Requested => write!(f, "requested"),
            PermissionState::Granted => write!(f, "granted"),
            PermissionState::Revoked => write!(f, "revoked"),
        }
    }
}

impl FromStr for PermissionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not-requested" => Ok(PermissionState::NotRequested),
            "requested" => Ok(PermissionState::Requested),
            "granted" => Ok(PermissionState::Granted),
            "revoked" => Ok(PermissionState::Revoked),
            other => Err(format!("invalid permission state: '{other}'")),
        }
    }
}

/// Grant record, unique per (user, plugin, kind).
///
/// Never physically deleted: revocation only changes `state`, and the audit
/// timestamps, once set, are never cleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub user_id: String,
    pub plugin_id: String,
    pub kind: PermissionKind,
    pub state: PermissionState,
    pub requested_at: Option<DateTime<Utc>>,
    pub granted_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl PermissionGrant {
    /// A synthesized, unpersisted row for a declared kind that has no grant yet.
    pub fn not_requested(user_id: &str, plugin_id: &str, kind: PermissionKind) -> Self {
        Self {
            user_id: user_id.to_string(),
            plugin_id: plugin_id.to_string(),
            kind,
            state: PermissionState::NotRequested,
            requested_at: None,
            granted_at: None,
            revoked_at: None,
            updated_at: Utc::now(),
        }
    }

    pub fn is_granted(&self) -> bool {
        self.state == PermissionState::Granted
    }
}
