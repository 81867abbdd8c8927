//! SQLite manifest registry implementation.
//!
//! Manifests are stored whole as JSON, keyed by (plugin_id, version). Rows are
//! never updated: a second insert of the same key is a conflict.

use chrono::Utc;
use semver::Version;
use sqlx::Row;
use warden_core::repository::manifest::ManifestRepository;
use warden_types::error::RepositoryError;
use warden_types::plugin::PluginManifest;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `ManifestRepository`.
pub struct SqliteManifestRepository {
    pool: DatabasePool,
}

impl SqliteManifestRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn row_to_manifest(row: &sqlx::sqlite::SqliteRow) -> Result<PluginManifest, RepositoryError> {
    let json: String = row
        .try_get("manifest")
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
    serde_json::from_str(&json)
        .map_err(|e| RepositoryError::Query(format!("invalid manifest JSON: {e}")))
}

impl ManifestRepository for SqliteManifestRepository {
    async fn insert(&self, manifest: &PluginManifest) -> Result<(), RepositoryError> {
        let json =
            serde_json::to_string(manifest).map_err(|e| RepositoryError::Query(e.to_string()))?;

        let result = sqlx::query(
            "INSERT INTO plugin_manifests (plugin_id, version, manifest, published_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&manifest.id)
        .bind(manifest.version.to_string())
        .bind(&json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool.writer)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.message().contains("UNIQUE") => {
                Err(RepositoryError::Conflict(manifest.label()))
            }
            Err(e) => Err(RepositoryError::Query(e.to_string())),
        }
    }

    async fn get(
        &self,
        plugin_id: &str,
        version: &Version,
    ) -> Result<Option<PluginManifest>, RepositoryError> {
        let row = sqlx::query(
            "SELECT manifest FROM plugin_manifests WHERE plugin_id = ? AND version = ?",
        )
        .bind(plugin_id)
        .bind(version.to_string())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.as_ref().map(row_to_manifest).transpose()
    }

    async fn versions(&self, plugin_id: &str) -> Result<Vec<PluginManifest>, RepositoryError> {
        let rows = sqlx::query("SELECT manifest FROM plugin_manifests WHERE plugin_id = ?")
            .bind(plugin_id)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut manifests = rows
            .iter()
            .map(row_to_manifest)
            .collect::<Result<Vec<_>, _>>()?;
        // Text ordering of version strings is not semver ordering.
        manifests.sort_by(|a, b| a.version.cmp(&b.version));
        Ok(manifests)
    }

    async fn list(&self) -> Result<Vec<PluginManifest>, RepositoryError> {
        let rows = sqlx::query("SELECT manifest FROM plugin_manifests")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut manifests = rows
            .iter()
            .map(row_to_manifest)
            .collect::<Result<Vec<_>, _>>()?;
        manifests.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.version.cmp(&b.version)));
        Ok(manifests)
    }
}
