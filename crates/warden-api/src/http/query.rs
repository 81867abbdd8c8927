//! Query parameter and request body types for the REST API.

use serde::Deserialize;
use warden_types::permission::PermissionKind;

/// Query parameters for the resolution endpoint.
#[derive(Debug, Deserialize, Default)]
pub struct ResolutionQuery {
    /// Resolve this version instead of the latest.
    pub version: Option<String>,
}

/// Query parameters for the manifest list endpoint.
#[derive(Debug, Deserialize, Default)]
pub struct ManifestQuery {
    /// Only list versions of this plugin.
    pub id: Option<String>,
}

/// Body of the grant and revoke endpoints. No kinds means all.
#[derive(Debug, Deserialize, Default)]
pub struct KindsBody {
    #[serde(default)]
    pub kinds: Option<Vec<PermissionKind>>,
}

/// Body of the upgrade endpoint.
#[derive(Debug, Deserialize)]
pub struct UpgradeBody {
    pub version: semver::Version,
}
