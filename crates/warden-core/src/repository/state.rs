//! Per-user engine state: installation records, permission grants, and
//! sandbox configs, all keyed by (user, plugin).

use warden_types::error::RepositoryError;
use warden_types::installation::InstallationRecord;
use warden_types::permission::PermissionGrant;
use warden_types::sandbox::SandboxConfig;

/// Everything stored for one (user, plugin) pair, read at a single point in
/// time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PairSnapshot {
    pub installation: Option<InstallationRecord>,
    pub grants: Vec<PermissionGrant>,
    pub sandbox: Option<SandboxConfig>,
}

/// What a write does to the pair's sandbox config.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SandboxWrite {
    #[default]
    Keep,
    /// Replace the whole config (last write wins).
    Put(SandboxConfig),
    Delete,
}

/// A set of changes to one (user, plugin) pair, applied atomically.
#[derive(Debug, Clone, PartialEq)]
pub struct PairWrite {
    pub user_id: String,
    pub plugin_id: String,
    pub installation: Option<InstallationRecord>,
    /// Grant rows to upsert by (user, plugin, kind). Grants are never deleted.
    pub grants: Vec<PermissionGrant>,
    pub sandbox: SandboxWrite,
}

impl PairWrite {
    pub fn new(user_id: &str, plugin_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            plugin_id: plugin_id.to_string(),
            installation: None,
            grants: Vec::new(),
            sandbox: SandboxWrite::Keep,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.installation.is_none() && self.grants.is_empty() && self.sandbox == SandboxWrite::Keep
    }
}

/// Repository trait for per-pair engine state.
///
/// `snapshot` must never observe half of a `commit`, and `commit` must apply
/// all of its parts or none. Callers serialize writes per pair themselves.
pub trait StateRepository: Send + Sync {
    /// Consistent read of everything stored for the pair.
    fn snapshot(
        &self,
        user_id: &str,
        plugin_id: &str,
    ) -> impl std::future::Future<Output = Result<PairSnapshot, RepositoryError>> + Send;

    /// Apply a write atomically.
    fn commit(
        &self,
        write: &PairWrite,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get_installation(
        &self,
        user_id: &str,
        plugin_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<InstallationRecord>, RepositoryError>> + Send;

    /// Every installation record of a user, ordered by plugin id.
    fn list_installations(
        &self,
        user_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<InstallationRecord>, RepositoryError>> + Send;
}
