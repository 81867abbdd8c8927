//! Filesystem helpers for Warden.
//!
//! Data directory layout and on-disk plugin manifest files.

pub mod manifest;

use std::path::{Path, PathBuf};

/// Resolve the Warden data directory.
///
/// Uses `WARDEN_DATA_DIR` when set, otherwise `~/.warden`.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("WARDEN_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".warden");
    }

    // Last resort: current directory
    PathBuf::from(".warden")
}

/// Path of the SQLite database inside a data directory.
pub fn database_path(data_dir: &Path) -> PathBuf {
    data_dir.join("warden.db")
}

/// Create the data directory if it does not exist yet.
pub async fn ensure_data_dir(data_dir: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(data_dir).await
}
