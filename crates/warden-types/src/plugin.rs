//! Plugin manifest domain types.
//!
//! A [`PluginManifest`] is the immutable, published description of one plugin
//! version: its identity, the plugins it depends on, and the permission kinds
//! it needs. A new version is a new manifest.

use std::collections::HashSet;
use std::fmt;

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};

use crate::error::ManifestError;
use crate::permission::PermissionKind;

/// Published description of one plugin version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Unique plugin identifier (e.g. "security-scanner").
    pub id: String,
    pub version: Version,
    /// Display name. Falls back to the id when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<DependencySpec>,
    #[serde(default)]
    pub permissions: Vec<PermissionRequirement>,
}

/// A dependency declaration inside a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySpec {
    /// Id of the plugin depended upon.
    #[serde(rename = "id")]
    pub plugin_id: String,
    /// Cargo-style version requirement (`^2`, `>=1.2, <2`, `~1.4.0`).
    #[serde(rename = "version")]
    pub constraint: VersionReq,
    /// Required edges block installation when unsatisfiable.
    #[serde(default = "default_true")]
    pub required: bool,
}

/// A permission kind declared by a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRequirement {
    pub kind: PermissionKind,
    /// Required kinds gate installation; optional kinds only gate the
    /// functionality that uses them.
    #[serde(default = "default_true")]
    pub required: bool,
}

fn default_true() -> bool {
    true
}

/// A directed dependency edge: `dependent` needs `dependency` at `constraint`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub dependent: String,
    pub dependency: String,
    pub constraint: VersionReq,
    pub required: bool,
}

impl DependencyEdge {
    /// `dependency@constraint`, the form used in missing/conflict reports.
    pub fn target_label(&self) -> String {
        format!("{}@{}", self.dependency, self.constraint)
    }
}

impl fmt::Display for DependencyEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}@{}", self.dependent, self.dependency, self.constraint)?;
        if !self.required {
            write!(f, " (optional)")?;
        }
        Ok(())
    }
}

impl PluginManifest {
    /// Build a bare manifest with no dependencies and no permissions.
    pub fn new(id: impl Into<String>, version: Version) -> Self {
        Self {
            id: id.into(),
            version,
            name: None,
            description: None,
            dependencies: Vec::new(),
            permissions: Vec::new(),
        }
    }

    /// Builder-style helper adding a dependency.
    pub fn with_dependency(mut self, plugin_id: &str, constraint: VersionReq, required: bool) -> Self {
        self.dependencies.push(DependencySpec {
            plugin_id: plugin_id.to_string(),
            constraint,
            required,
        });
        self
    }

    /// Builder-style helper adding a permission requirement.
    pub fn with_permission(mut self, kind: PermissionKind, required: bool) -> Self {
        self.permissions.push(PermissionRequirement { kind, required });
        self
    }

    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// `id@version` label.
    pub fn label(&self) -> String {
        format!("{}@{}", self.id, self.version)
    }

    /// Dependency declarations as graph edges originating at this plugin.
    pub fn edges(&self) -> Vec<DependencyEdge> {
        self.dependencies
            .iter()
            .map(|dep| DependencyEdge {
                dependent: self.id.clone(),
                dependency: dep.plugin_id.clone(),
                constraint: dep.constraint.clone(),
                required: dep.required,
            })
            .collect()
    }

    /// Every declared permission kind, in declaration order.
    pub fn declared_kinds(&self) -> Vec<PermissionKind> {
        self.permissions.iter().map(|p| p.kind).collect()
    }

    /// Declared kinds marked `required`.
    pub fn required_kinds(&self) -> Vec<PermissionKind> {
        self.permissions
            .iter()
            .filter(|p| p.required)
            .map(|p| p.kind)
            .collect()
    }

    pub fn declares(&self, kind: PermissionKind) -> bool {
        self.permissions.iter().any(|p| p.kind == kind)
    }

    /// Structural validation performed before a manifest is published.
    pub fn validate(&self) -> Result<(), ManifestError> {
        validate_plugin_id(&self.id)?;

        let mut seen = HashSet::new();
        for dep in &self.dependencies {
            validate_plugin_id(&dep.plugin_id)?;
            if dep.plugin_id == self.id {
                return Err(ManifestError::SelfDependency(self.id.clone()));
            }
            if !seen.insert(dep.plugin_id.as_str()) {
                return Err(ManifestError::DuplicateDependency {
                    plugin_id: self.id.clone(),
                    dependency: dep.plugin_id.clone(),
                });
            }
        }

        let mut kinds = HashSet::new();
        for perm in &self.permissions {
            if !kinds.insert(perm.kind) {
                return Err(ManifestError::DuplicatePermission {
                    plugin_id: self.id.clone(),
                    kind: perm.kind,
                });
            }
        }

        Ok(())
    }
}

/// Check a plugin id: non-empty, lowercase ASCII alphanumerics plus `-`, `_`
/// and `.`, starting with an alphanumeric.
pub fn validate_plugin_id(id: &str) -> Result<(), ManifestError> {
    let mut chars = id.chars();
    let valid_first = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    let valid_rest =
        chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.'));

    if valid_first && valid_rest {
        Ok(())
    } else {
        Err(ManifestError::InvalidId(id.to_string()))
    }
}
