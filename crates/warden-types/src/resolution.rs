//! Dependency resolution result.

use semver::Version;
use serde::{Deserialize, Serialize};

/// One dependency in the resolved closure of a target plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedDependency {
    pub plugin_id: String,
    pub version: Version,
    /// True when already installed for the user; false when planned.
    pub installed: bool,
    /// False when only reachable through optional edges.
    pub required: bool,
}

/// Outcome of resolving a target manifest against a user's installed set.
///
/// `conflicts` and `missing` hold blocking entries only, so
/// `can_install == conflicts.is_empty() && missing.is_empty()`.
/// Problems on optional edges are surfaced in `warnings`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub plugin_id: String,
    pub version: Version,
    pub dependencies: Vec<ResolvedDependency>,
    pub conflicts: Vec<String>,
    pub missing: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Planned (not yet installed) dependency ids, dependencies first.
    #[serde(default)]
    pub install_order: Vec<String>,
    pub can_install: bool,
}

impl Resolution {
    /// Dependencies that still need installing, in install order.
    pub fn planned(&self) -> Vec<&ResolvedDependency> {
        self.install_order
            .iter()
            .filter_map(|id| self.dependencies.iter().find(|d| &d.plugin_id == id))
            .collect()
    }

    /// Ids of every dependency satisfied by the installed set.
    pub fn satisfied_ids(&self) -> Vec<String> {
        self.dependencies
            .iter()
            .filter(|d| d.installed)
            .map(|d| d.plugin_id.clone())
            .collect()
    }
}
