//! Plugin manifest files on disk.
//!
//! A manifest file is TOML (`*.toml`) or JSON (`*.json`) with the same shape
//! as [`PluginManifest`]:
//!
//! ```text
//! id = "security-scanner"
//! version = "2.1.0"
//!
//! [[dependencies]]
//! id = "core-lib"
//! version = "^1.4"
//!
//! [[permissions]]
//! kind = "read-files"
//! ```

use std::path::Path;

use anyhow::{Context, bail};
use warden_types::plugin::PluginManifest;

/// Read, parse, and validate one manifest file.
pub fn load_manifest_file(path: &Path) -> anyhow::Result<PluginManifest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let manifest: PluginManifest = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?,
        Some("json") => serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?,
        _ => bail!(
            "Unsupported manifest file {}: expected .toml or .json",
            path.display()
        ),
    };

    manifest
        .validate()
        .with_context(|| format!("Invalid manifest {}", path.display()))?;
    Ok(manifest)
}

/// Load every `*.toml` / `*.json` manifest directly inside `dir`.
///
/// Unreadable or invalid files are skipped with a warning. The result is
/// ordered by (id, version) so dependencies publish deterministically.
pub fn load_manifest_dir(dir: &Path) -> anyhow::Result<Vec<PluginManifest>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read manifest directory: {}", dir.display()))?;

    let mut manifests = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_manifest = path.is_file()
            && matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("toml" | "json")
            );
        if !is_manifest {
            continue;
        }

        match load_manifest_file(&path) {
            Ok(manifest) => manifests.push(manifest),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping invalid manifest");
            }
        }
    }

    manifests.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.version.cmp(&b.version)));
    Ok(manifests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use semver::Version;
    use tempfile::tempdir;

    const SCANNER: &str = r#"
id = "security-scanner"
version = "2.1.0"

[[dependencies]]
id = "core-lib"
version = "^1.4"

[[permissions]]
kind = "read-files"
"#;

    #[test]
    fn test_load_toml_manifest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scanner.toml");
        std::fs::write(&path, SCANNER).unwrap();

        let manifest = load_manifest_file(&path).unwrap();
        assert_eq!(manifest.label(), "security-scanner@2.1.0");
        assert_eq!(manifest.dependencies.len(), 1);
        assert_eq!(manifest.dependencies[0].plugin_id, "core-lib");
        assert!(manifest.dependencies[0].required);
    }

    #[test]
    fn test_load_json_manifest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lib.json");
        std::fs::write(&path, r#"{"id": "core-lib", "version": "1.4.2"}"#).unwrap();

        let manifest = load_manifest_file(&path).unwrap();
        assert_eq!(manifest.version, Version::new(1, 4, 2));
        assert!(manifest.dependencies.is_empty());
    }

    #[test]
    fn test_invalid_manifest_is_rejected_with_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("self.toml");
        std::fs::write(
            &path,
            "id = \"a\"\nversion = \"1.0.0\"\n[[dependencies]]\nid = \"a\"\nversion = \"*\"\n",
        )
        .unwrap();

        let err = load_manifest_file(&path).unwrap_err();
        assert!(format!("{err:#}").contains("self.toml"));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plugin.yaml");
        std::fs::write(&path, "id: a").unwrap();
        assert!(load_manifest_file(&path).is_err());
    }

    #[test]
    fn test_load_dir_skips_invalid_and_sorts() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("scanner.toml"), SCANNER).unwrap();
        std::fs::write(
            dir.path().join("lib.json"),
            r#"{"id": "core-lib", "version": "1.4.2"}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("broken.toml"), "not { toml").unwrap();
        std::fs::write(dir.path().join("README.md"), "# plugins").unwrap();

        let labels: Vec<String> = load_manifest_dir(dir.path())
            .unwrap()
            .iter()
            .map(|m| m.label())
            .collect();
        assert_eq!(labels, vec!["core-lib@1.4.2", "security-scanner@2.1.0"]);
    }
}
