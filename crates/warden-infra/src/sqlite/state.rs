//! SQLite engine state repository.
//!
//! Implements `StateRepository` over the `installations`, `permission_grants`
//! and `sandbox_configs` tables. A snapshot reads all three tables inside one
//! reader transaction; a commit applies every part of a `PairWrite` inside one
//! writer transaction.

use chrono::{DateTime, Utc};
use semver::Version;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use warden_core::repository::state::{PairSnapshot, PairWrite, SandboxWrite, StateRepository};
use warden_types::error::RepositoryError;
use warden_types::installation::{InstallFailure, InstallStatus, InstallationRecord};
use warden_types::permission::{PermissionGrant, PermissionKind, PermissionState};
use warden_types::sandbox::{IsolationLevel, ResourceLimits, SandboxConfig};

use super::pool::DatabasePool;

/// SQLite-backed implementation of `StateRepository`.
pub struct SqliteStateRepository {
    pool: DatabasePool,
}

impl SqliteStateRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn query_err(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

/// Internal row type for `installations`.
struct InstallationRow {
    user_id: String,
    plugin_id: String,
    version: String,
    status: String,
    dependencies_resolved: String,
    auto_installed: bool,
    failure: Option<String>,
    created_at: String,
    updated_at: String,
}

impl InstallationRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            user_id: row.try_get("user_id")?,
            plugin_id: row.try_get("plugin_id")?,
            version: row.try_get("version")?,
            status: row.try_get("status")?,
            dependencies_resolved: row.try_get("dependencies_resolved")?,
            auto_installed: row.try_get("auto_installed")?,
            failure: row.try_get("failure")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_record(self) -> Result<InstallationRecord, RepositoryError> {
        let version = Version::parse(&self.version)
            .map_err(|e| RepositoryError::Query(format!("invalid version: {e}")))?;
        let status: InstallStatus = self
            .status
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;
        let dependencies_resolved: Vec<String> = serde_json::from_str(&self.dependencies_resolved)
            .map_err(|e| RepositoryError::Query(format!("invalid dependencies JSON: {e}")))?;
        let failure: Option<InstallFailure> = self
            .failure
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| RepositoryError::Query(format!("invalid failure JSON: {e}")))?;

        Ok(InstallationRecord {
            user_id: self.user_id,
            plugin_id: self.plugin_id,
            version,
            status,
            dependencies_resolved,
            auto_installed: self.auto_installed,
            failure,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

/// Internal row type for `permission_grants`.
struct GrantRow {
    user_id: String,
    plugin_id: String,
    kind: String,
    state: String,
    requested_at: Option<String>,
    granted_at: Option<String>,
    revoked_at: Option<String>,
    updated_at: String,
}

impl GrantRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            user_id: row.try_get("user_id")?,
            plugin_id: row.try_get("plugin_id")?,
            kind: row.try_get("kind")?,
            state: row.try_get("state")?,
            requested_at: row.try_get("requested_at")?,
            granted_at: row.try_get("granted_at")?,
            revoked_at: row.try_get("revoked_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// `None` for a row whose kind is no longer in the catalog. Such rows are
    /// leftovers and never block the pair.
    fn into_grant(self) -> Result<Option<PermissionGrant>, RepositoryError> {
        let kind: PermissionKind = match self.kind.parse() {
            Ok(kind) => kind,
            Err(e) => {
                tracing::warn!(
                    user_id = %self.user_id,
                    plugin_id = %self.plugin_id,
                    kind = %self.kind,
                    error = %e,
                    "ignoring stored grant of unknown permission kind"
                );
                return Ok(None);
            }
        };
        let state: PermissionState = self
            .state
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;

        Ok(Some(PermissionGrant {
            user_id: self.user_id,
            plugin_id: self.plugin_id,
            kind,
            state,
            requested_at: self.requested_at.as_deref().map(parse_datetime).transpose()?,
            granted_at: self.granted_at.as_deref().map(parse_datetime).transpose()?,
            revoked_at: self.revoked_at.as_deref().map(parse_datetime).transpose()?,
            updated_at: parse_datetime(&self.updated_at)?,
        }))
    }
}

/// Internal row type for `sandbox_configs`.
struct SandboxRow {
    user_id: String,
    plugin_id: String,
    enabled: bool,
    isolation_level: String,
    max_memory_mb: Option<i64>,
    max_execution_time_ms: Option<i64>,
    max_file_size_kb: Option<i64>,
    updated_at: String,
}

impl SandboxRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            user_id: row.try_get("user_id")?,
            plugin_id: row.try_get("plugin_id")?,
            enabled: row.try_get("enabled")?,
            isolation_level: row.try_get("isolation_level")?,
            max_memory_mb: row.try_get("max_memory_mb")?,
            max_execution_time_ms: row.try_get("max_execution_time_ms")?,
            max_file_size_kb: row.try_get("max_file_size_kb")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_config(self) -> Result<SandboxConfig, RepositoryError> {
        let isolation_level: IsolationLevel = self
            .isolation_level
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;

        Ok(SandboxConfig {
            plugin_id: self.plugin_id,
            user_id: self.user_id,
            enabled: self.enabled,
            isolation_level,
            resource_limits: ResourceLimits {
                max_memory_mb: self.max_memory_mb.map(narrow).transpose()?,
                max_execution_time_ms: self.max_execution_time_ms.map(narrow).transpose()?,
                max_file_size_kb: self.max_file_size_kb.map(narrow).transpose()?,
            },
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

fn narrow<T: TryFrom<i64>>(value: i64) -> Result<T, RepositoryError> {
    T::try_from(value).map_err(|_| RepositoryError::Query(format!("limit out of range: {value}")))
}

const SELECT_INSTALLATION: &str = "SELECT user_id, plugin_id, version, status, dependencies_resolved, auto_installed, failure, created_at, updated_at FROM installations";

impl StateRepository for SqliteStateRepository {
    async fn snapshot(&self, user_id: &str, plugin_id: &str) -> Result<PairSnapshot, RepositoryError> {
        let mut tx = self.pool.reader.begin().await.map_err(query_err)?;

        let installation = sqlx::query(&format!(
            "{SELECT_INSTALLATION} WHERE user_id = ? AND plugin_id = ?"
        ))
        .bind(user_id)
        .bind(plugin_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(query_err)?
        .map(|row| InstallationRow::from_row(&row).map_err(query_err)?.into_record())
        .transpose()?;

        let grants = sqlx::query(
            "SELECT user_id, plugin_id, kind, state, requested_at, granted_at, revoked_at, updated_at
             FROM permission_grants WHERE user_id = ? AND plugin_id = ?",
        )
        .bind(user_id)
        .bind(plugin_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(query_err)?
        .iter()
        .map(|row| GrantRow::from_row(row).map_err(query_err)?.into_grant())
        .filter_map(Result::transpose)
        .collect::<Result<Vec<_>, _>>()?;

        let sandbox = sqlx::query(
            "SELECT user_id, plugin_id, enabled, isolation_level, max_memory_mb, max_execution_time_ms, max_file_size_kb, updated_at
             FROM sandbox_configs WHERE user_id = ? AND plugin_id = ?",
        )
        .bind(user_id)
        .bind(plugin_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(query_err)?
        .map(|row| SandboxRow::from_row(&row).map_err(query_err)?.into_config())
        .transpose()?;

        tx.commit().await.map_err(query_err)?;

        Ok(PairSnapshot {
            installation,
            grants,
            sandbox,
        })
    }

    async fn commit(&self, write: &PairWrite) -> Result<(), RepositoryError> {
        // SQLite integers are signed; refuse anything that would not read back.
        let time_ms = match &write.sandbox {
            SandboxWrite::Put(config) => config
                .resource_limits
                .max_execution_time_ms
                .map(|ms| {
                    i64::try_from(ms)
                        .map_err(|_| RepositoryError::Query(format!("limit out of range: {ms}")))
                })
                .transpose()?,
            _ => None,
        };

        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        if let Some(record) = &write.installation {
            let deps = serde_json::to_string(&record.dependencies_resolved)
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            let failure = record
                .failure
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(|e| RepositoryError::Query(e.to_string()))?;

            sqlx::query(
                "INSERT INTO installations (user_id, plugin_id, version, status, dependencies_resolved, auto_installed, failure, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (user_id, plugin_id) DO UPDATE SET
                    version = excluded.version,
                    status = excluded.status,
                    dependencies_resolved = excluded.dependencies_resolved,
                    auto_installed = excluded.auto_installed,
                    failure = excluded.failure,
                    updated_at = excluded.updated_at",
            )
            .bind(&record.user_id)
            .bind(&record.plugin_id)
            .bind(record.version.to_string())
            .bind(record.status.to_string())
            .bind(&deps)
            .bind(record.auto_installed)
            .bind(&failure)
            .bind(format_datetime(&record.created_at))
            .bind(format_datetime(&record.updated_at))
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;
        }

        for grant in &write.grants {
            sqlx::query(
                "INSERT INTO permission_grants (user_id, plugin_id, kind, state, requested_at, granted_at, revoked_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (user_id, plugin_id, kind) DO UPDATE SET
                    state = excluded.state,
                    requested_at = excluded.requested_at,
                    granted_at = excluded.granted_at,
                    revoked_at = excluded.revoked_at,
                    updated_at = excluded.updated_at",
            )
            .bind(&grant.user_id)
            .bind(&grant.plugin_id)
            .bind(grant.kind.as_str())
            .bind(grant.state.to_string())
            .bind(grant.requested_at.as_ref().map(format_datetime))
            .bind(grant.granted_at.as_ref().map(format_datetime))
            .bind(grant.revoked_at.as_ref().map(format_datetime))
            .bind(format_datetime(&grant.updated_at))
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;
        }

        match &write.sandbox {
            SandboxWrite::Keep => {}
            SandboxWrite::Put(config) => {
                let limits = &config.resource_limits;
                sqlx::query(
                    "INSERT INTO sandbox_configs (user_id, plugin_id, enabled, isolation_level, max_memory_mb, max_execution_time_ms, max_file_size_kb, updated_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                     ON CONFLICT (user_id, plugin_id) DO UPDATE SET
                        enabled = excluded.enabled,
                        isolation_level = excluded.isolation_level,
                        max_memory_mb = excluded.max_memory_mb,
                        max_execution_time_ms = excluded.max_execution_time_ms,
                        max_file_size_kb = excluded.max_file_size_kb,
                        updated_at = excluded.updated_at",
                )
                .bind(&write.user_id)
                .bind(&write.plugin_id)
                .bind(config.enabled)
                .bind(config.isolation_level.to_string())
                .bind(limits.max_memory_mb.map(i64::from))
                .bind(time_ms)
                .bind(limits.max_file_size_kb.map(i64::from))
                .bind(format_datetime(&config.updated_at))
                .execute(&mut *tx)
                .await
                .map_err(query_err)?;
            }
            SandboxWrite::Delete => {
                sqlx::query("DELETE FROM sandbox_configs WHERE user_id = ? AND plugin_id = ?")
                    .bind(&write.user_id)
                    .bind(&write.plugin_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(query_err)?;
            }
        }

        tx.commit().await.map_err(query_err)?;
        Ok(())
    }

    async fn get_installation(
        &self,
        user_id: &str,
        plugin_id: &str,
    ) -> Result<Option<InstallationRecord>, RepositoryError> {
        let row = sqlx::query(&format!(
            "{SELECT_INSTALLATION} WHERE user_id = ? AND plugin_id = ?"
        ))
        .bind(user_id)
        .bind(plugin_id)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(query_err)?;

        match row {
            Some(row) => Ok(Some(
                InstallationRow::from_row(&row).map_err(query_err)?.into_record()?,
            )),
            None => Ok(None),
        }
    }

    async fn list_installations(&self, user_id: &str) -> Result<Vec<InstallationRecord>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "{SELECT_INSTALLATION} WHERE user_id = ? ORDER BY plugin_id"
        ))
        .bind(user_id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        rows.iter()
            .map(|row| InstallationRow::from_row(row).map_err(query_err)?.into_record())
            .collect()
    }
}
