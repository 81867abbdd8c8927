//! Application state wiring the engine to its storage.
//!
//! The engine is generic over its repositories; AppState pins it to the
//! SQLite implementations from `warden-infra`.

use std::path::{Path, PathBuf};

use warden_core::Engine;
use warden_infra::config::load_engine_config;
use warden_infra::filesystem::{database_path, ensure_data_dir, resolve_data_dir};
use warden_infra::sqlite::manifest::SqliteManifestRepository;
use warden_infra::sqlite::pool::DatabasePool;
use warden_infra::sqlite::state::SqliteStateRepository;

/// The engine pinned to SQLite storage.
pub type WardenEngine = Engine<SqliteManifestRepository, SqliteStateRepository>;

/// Shared application state, used by both CLI commands and REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: WardenEngine,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Open the engine in the default data directory.
    pub async fn init() -> anyhow::Result<Self> {
        Self::open(&resolve_data_dir()).await
    }

    /// Create `data_dir` if needed, load `config.toml`, open `warden.db`
    /// (running migrations) and build the engine.
    pub async fn open(data_dir: &Path) -> anyhow::Result<Self> {
        ensure_data_dir(data_dir).await?;

        let config = load_engine_config(data_dir).await;

        let db_pool = DatabasePool::open(&database_path(data_dir)).await?;

        let engine = Engine::new(
            SqliteManifestRepository::new(db_pool.clone()),
            SqliteStateRepository::new(db_pool),
            config,
        )?;

        tracing::debug!(data_dir = %data_dir.display(), "engine opened");

        Ok(Self {
            engine,
            data_dir: data_dir.to_path_buf(),
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use semver::{Version, VersionReq};
    use warden_types::permission::PermissionKind;
    use warden_types::plugin::PluginManifest;

    use super::AppState;

    /// State over a fresh database in a temp dir. Keep the dir alive for the
    /// duration of the test.
    pub async fn state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::open(dir.path()).await.unwrap();
        (state, dir)
    }

    /// Publish `lib@1.0.0` and `app@1.0.0` (requires `lib@^1`, read-files).
    pub async fn publish_app(state: &AppState) {
        let manifests = state.engine.manifests();
        manifests
            .publish(PluginManifest::new("lib", Version::new(1, 0, 0)))
            .await
            .unwrap();
        manifests
            .publish(
                PluginManifest::new("app", Version::new(1, 0, 0))
                    .with_dependency("lib", VersionReq::parse("^1").unwrap(), true)
                    .with_permission(PermissionKind::ReadFiles, true),
            )
            .await
            .unwrap();
    }
}
