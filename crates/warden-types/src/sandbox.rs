//! Sandbox configuration and effective-policy types.
//!
//! A [`SandboxConfig`] stores what the user asked for: an isolation level and
//! optional explicit ceilings. The [`EffectivePolicy`] is what the execution
//! runtime actually enforces after the explicit values have been clamped to
//! the level's ceiling.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SandboxError;

/// Named sandbox strictness tier. Ordered from least to most permissive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationLevel {
    Strict,
    Moderate,
    Permissive,
}

impl IsolationLevel {
    pub const ALL: [IsolationLevel; 3] = [
        IsolationLevel::Strict,
        IsolationLevel::Moderate,
        IsolationLevel::Permissive,
    ];
}

impl Default for IsolationLevel {
    fn default() -> Self {
        Self::Moderate
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IsolationLevel::Strict => write!(f, "strict"),
            IsolationLevel::Moderate => write!(f, "moderate"),
            IsolationLevel::Permissive => write!(f, "permissive"),
        }
    }
}

impl FromStr for IsolationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(IsolationLevel::Strict),
            "moderate" => Ok(IsolationLevel::Moderate),
            "permissive" => Ok(IsolationLevel::Permissive),
            other => Err(format!("invalid isolation level: '{other}'")),
        }
    }
}

/// Explicit per-plugin resource ceilings. `None` means "use the level default".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_memory_mb: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_execution_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_file_size_kb: Option<u32>,
}

impl ResourceLimits {
    /// Overlay `patch` onto `self`: fields set in the patch win.
    pub fn merged_with(&self, patch: &ResourceLimits) -> ResourceLimits {
        ResourceLimits {
            max_memory_mb: patch.max_memory_mb.or(self.max_memory_mb),
            max_execution_time_ms: patch.max_execution_time_ms.or(self.max_execution_time_ms),
            max_file_size_kb: patch.max_file_size_kb.or(self.max_file_size_kb),
        }
    }
}

/// Concrete ceilings in every resource dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveLimits {
    pub max_memory_mb: u32,
    pub max_execution_time_ms: u64,
    pub max_file_size_kb: u32,
}

impl EffectiveLimits {
    /// True when every dimension of `self` is at most the matching one of `other`.
    pub fn within(&self, other: &EffectiveLimits) -> bool {
        self.max_memory_mb <= other.max_memory_mb
            && self.max_execution_time_ms <= other.max_execution_time_ms
            && self.max_file_size_kb <= other.max_file_size_kb
    }
}

/// The single active sandbox record for a (plugin, user) pair.
///
/// `enabled: false` keeps the record; disabling is not deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxConfig {
    pub plugin_id: String,
    pub user_id: String,
    pub enabled: bool,
    pub isolation_level: IsolationLevel,
    #[serde(default)]
    pub resource_limits: ResourceLimits,
    pub updated_at: DateTime<Utc>,
}

impl SandboxConfig {
    /// Enabled config at `level` with no explicit overrides.
    pub fn provisioned(plugin_id: &str, user_id: &str, level: IsolationLevel) -> Self {
        Self {
            plugin_id: plugin_id.to_string(),
            user_id: user_id.to_string(),
            enabled: true,
            isolation_level: level,
            resource_limits: ResourceLimits::default(),
            updated_at: Utc::now(),
        }
    }
}

/// Partial sandbox update. Merged into the current config and written back
/// as a full replacement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isolation_level: Option<IsolationLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_limits: Option<ResourceLimits>,
    /// Must be true for an update that disables the sandbox.
    #[serde(default)]
    pub confirm_disable: bool,
}

/// What the execution runtime enforces for a plugin invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectivePolicy {
    pub plugin_id: String,
    pub user_id: String,
    /// False when the sandbox is disabled: nothing is enforced.
    pub enforced: bool,
    pub isolation_level: IsolationLevel,
    /// Clamped ceilings; `None` when not enforced.
    pub limits: Option<EffectiveLimits>,
}

impl EffectivePolicy {
    /// Compare observed usage against the enforced ceilings. Reports the first
    /// exceeded dimension, in memory / execution time / file size order.
    /// Nothing is exceeded when the sandbox is not enforced.
    pub fn check_usage(&self, usage: &ResourceUsage) -> Result<(), SandboxError> {
        let Some(limits) = self.limits.filter(|_| self.enforced) else {
            return Ok(());
        };

        let checks = [
            (
                ResourceKind::Memory,
                u64::from(usage.memory_mb),
                u64::from(limits.max_memory_mb),
            ),
            (
                ResourceKind::ExecutionTime,
                usage.execution_time_ms,
                limits.max_execution_time_ms,
            ),
            (
                ResourceKind::FileSize,
                u64::from(usage.file_size_kb),
                u64::from(limits.max_file_size_kb),
            ),
        ];

        match checks.into_iter().find(|(_, used, limit)| used > limit) {
            Some((resource, used, limit)) => Err(SandboxError::LimitExceeded {
                plugin_id: self.plugin_id.clone(),
                resource,
                used,
                limit,
            }),
            None => Ok(()),
        }
    }
}

/// A resource dimension governed by the sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Memory,
    ExecutionTime,
    FileSize,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Memory => write!(f, "memory (MB)"),
            ResourceKind::ExecutionTime => write!(f, "execution time (ms)"),
            ResourceKind::FileSize => write!(f, "file size (KB)"),
        }
    }
}

/// Observed usage reported by the execution runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub memory_mb: u32,
    pub execution_time_ms: u64,
    pub file_size_kb: u32,
}
