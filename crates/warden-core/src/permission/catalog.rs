//! Static catalog of permission kinds.

use serde::Serialize;
use warden_types::permission::{PermissionKind, RiskTier};

/// Human-facing description of one permission kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub kind: PermissionKind,
    pub name: &'static str,
    pub description: &'static str,
    pub risk: RiskTier,
}

/// Every permission kind, in catalog order.
pub const CATALOG: [CatalogEntry; 8] = [
    CatalogEntry {
        kind: PermissionKind::ReadFiles,
        name: "Read Files",
        description: "Read files in your project",
        risk: RiskTier::Low,
    },
    CatalogEntry {
        kind: PermissionKind::WriteFiles,
        name: "Write Files",
        description: "Modify files in your project",
        risk: RiskTier::Medium,
    },
    CatalogEntry {
        kind: PermissionKind::ExecuteCommands,
        name: "Execute Commands",
        description: "Run system commands",
        risk: RiskTier::Critical,
    },
    CatalogEntry {
        kind: PermissionKind::NetworkAccess,
        name: "Network Access",
        description: "Make network requests",
        risk: RiskTier::Medium,
    },
    CatalogEntry {
        kind: PermissionKind::EnvironmentVariables,
        name: "Environment Variables",
        description: "Access environment variables",
        risk: RiskTier::Medium,
    },
    CatalogEntry {
        kind: PermissionKind::GitAccess,
        name: "Git Access",
        description: "Read and modify git repository",
        risk: RiskTier::Medium,
    },
    CatalogEntry {
        kind: PermissionKind::DatabaseAccess,
        name: "Database Access",
        description: "Access database connections",
        risk: RiskTier::High,
    },
    CatalogEntry {
        kind: PermissionKind::ApiKeys,
        name: "API Keys",
        description: "Access stored API keys",
        risk: RiskTier::Critical,
    },
];

pub fn entry(kind: PermissionKind) -> &'static CatalogEntry {
    &CATALOG[position(kind)]
}

pub fn risk(kind: PermissionKind) -> RiskTier {
    entry(kind).risk
}

/// Index of `kind` in catalog order, used for sorting listings.
/// `PermissionKind` variants are declared in catalog order.
pub fn position(kind: PermissionKind) -> usize {
    kind as usize
}

/// Highest risk tier among `kinds`, if any.
pub fn highest_risk(kinds: &[PermissionKind]) -> Option<RiskTier> {
    kinds.iter().map(|k| risk(*k)).max()
}
