//! Plugin lifecycle CLI commands: publish, manifests, resolve, install,
//! upgrade, uninstall, list, catalog.

use std::path::Path;

use anyhow::{Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use dialoguer::Confirm;
use semver::Version;

use warden_core::permission::catalog::CATALOG;
use warden_core::service::manifest::PublishOutcome;
use warden_infra::filesystem::manifest::{load_manifest_dir, load_manifest_file};
use warden_types::installation::{InstallOptions, UninstallOptions};
use warden_types::permission::RiskTier;
use warden_types::plugin::PluginManifest;
use warden_types::resolution::Resolution;

use super::status_cell;
use crate::state::AppState;

fn new_table() -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Publish one manifest file, or every manifest file in a directory.
pub async fn publish(state: &AppState, path: &Path, json: bool) -> Result<()> {
    let manifests: Vec<PluginManifest> = if path.is_dir() {
        load_manifest_dir(path)?
    } else {
        vec![load_manifest_file(path)?]
    };

    if manifests.is_empty() {
        bail!("No manifests found in {}", path.display());
    }

    let service = state.engine.manifests();
    let mut results = Vec::with_capacity(manifests.len());
    for manifest in manifests {
        let label = manifest.label();
        let outcome = service.publish(manifest).await?;
        results.push((label, outcome));
    }

    if json {
        let out: Vec<_> = results
            .iter()
            .map(|(label, outcome)| serde_json::json!({"manifest": label, "outcome": outcome}))
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    for (label, outcome) in &results {
        match outcome {
            PublishOutcome::Published => {
                println!("  {} Published {}", style("✓").green().bold(), style(label).cyan());
            }
            PublishOutcome::Unchanged => {
                println!("  {} {} already published", style("=").dim(), label);
            }
        }
    }
    Ok(())
}

/// List published manifests, optionally only the versions of one plugin.
pub async fn list_manifests(state: &AppState, id: Option<&str>, json: bool) -> Result<()> {
    let service = state.engine.manifests();
    let manifests = match id {
        Some(id) => service.versions(id).await?,
        None => service.list().await?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&manifests)?);
        return Ok(());
    }

    if manifests.is_empty() {
        println!();
        println!(
            "  {} No manifests published. Publish one with: {}",
            style("i").blue().bold(),
            style("wdn publish <file.toml>").yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = new_table();
    table.set_header(vec![
        Cell::new("Plugin").fg(Color::White),
        Cell::new("Version").fg(Color::White),
        Cell::new("Dependencies").fg(Color::White),
        Cell::new("Permissions").fg(Color::White),
    ]);

    for manifest in &manifests {
        let deps = manifest
            .edges()
            .iter()
            .map(|e| {
                if e.required {
                    e.target_label()
                } else {
                    format!("{} (optional)", e.target_label())
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        let perms = manifest
            .declared_kinds()
            .iter()
            .map(|k| k.to_string())
            .collect::<Vec<_>>()
            .join(", ");

        table.add_row(vec![
            Cell::new(manifest.display_name()).fg(Color::Cyan),
            Cell::new(&manifest.version),
            Cell::new(deps).fg(Color::DarkGrey),
            Cell::new(perms),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

/// Show the resolution of a plugin against the user's installed set.
pub async fn resolve(
    state: &AppState,
    user: &str,
    plugin: &str,
    version: Option<&Version>,
    json: bool,
) -> Result<()> {
    let resolution = state
        .engine
        .installer()
        .resolution(plugin, user, version)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&resolution)?);
        return Ok(());
    }

    print_resolution(&resolution);
    Ok(())
}

fn print_resolution(resolution: &Resolution) {
    println!();
    let verdict = if resolution.can_install {
        style("can install").green().bold()
    } else {
        style("cannot install").red().bold()
    };
    println!(
        "  {}@{}: {}",
        style(&resolution.plugin_id).cyan().bold(),
        resolution.version,
        verdict
    );

    if !resolution.dependencies.is_empty() {
        let mut table = new_table();
        table.set_header(vec![
            Cell::new("Dependency").fg(Color::White),
            Cell::new("Version").fg(Color::White),
            Cell::new("Source").fg(Color::White),
        ]);
        for dep in &resolution.dependencies {
            let source = if dep.installed {
                Cell::new("installed").fg(Color::Green)
            } else {
                Cell::new("will install").fg(Color::Yellow)
            };
            let name = if dep.required {
                dep.plugin_id.clone()
            } else {
                format!("{} (optional)", dep.plugin_id)
            };
            table.add_row(vec![Cell::new(name), Cell::new(&dep.version), source]);
        }
        println!();
        println!("{table}");
    }

    if !resolution.install_order.is_empty() {
        println!();
        println!(
            "  {} {}",
            style("Install order:").bold(),
            resolution.install_order.join(" → ")
        );
    }
    for conflict in &resolution.conflicts {
        println!("  {} {conflict}", style("✗ conflict:").red().bold());
    }
    for missing in &resolution.missing {
        println!("  {} {missing}", style("✗ missing:").red().bold());
    }
    for warning in &resolution.warnings {
        println!("  {} {warning}", style("! warning:").yellow());
    }
    println!();
}

/// Install a plugin (or move it to `version`).
pub async fn install(
    state: &AppState,
    user: &str,
    plugin: &str,
    version: Option<Version>,
    no_deps: bool,
    json: bool,
) -> Result<()> {
    let options = InstallOptions {
        auto_install_dependencies: !no_deps,
        version,
    };
    let record = state.engine.installer().install(plugin, user, &options).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        println!(
            "  {} Installed {}@{}",
            style("✓").green().bold(),
            style(&record.plugin_id).cyan(),
            record.version
        );
        if !record.dependencies_resolved.is_empty() {
            println!(
                "    {} {}",
                style("dependencies:").dim(),
                record.dependencies_resolved.join(", ")
            );
        }
    }
    Ok(())
}

pub async fn upgrade(
    state: &AppState,
    user: &str,
    plugin: &str,
    version: &Version,
    json: bool,
) -> Result<()> {
    let record = state.engine.installer().upgrade(plugin, user, version).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        println!(
            "  {} Upgraded {} to {}",
            style("✓").green().bold(),
            style(&record.plugin_id).cyan(),
            record.version
        );
    }
    Ok(())
}

/// Uninstall a plugin, asking before a cascade unless `yes` is set.
pub async fn uninstall(
    state: &AppState,
    user: &str,
    plugin: &str,
    cascade: bool,
    yes: bool,
    json: bool,
) -> Result<()> {
    if cascade && !yes && !json {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Uninstall '{}' and every plugin that depends on it?",
                style(plugin).red().bold()
            ))
            .default(false)
            .interact()?;

        if !confirmed {
            println!("  Cancelled.");
            return Ok(());
        }
    }

    state
        .engine
        .installer()
        .uninstall(plugin, user, UninstallOptions { cascade })
        .await?;

    if json {
        println!(
            "{}",
            serde_json::json!({"uninstalled": true, "plugin_id": plugin, "cascade": cascade})
        );
    } else {
        println!("  {} Uninstalled {}", style("✓").red().bold(), plugin);
    }
    Ok(())
}

/// List the user's installation records.
pub async fn list(state: &AppState, user: &str, json: bool) -> Result<()> {
    let records = state.engine.installer().installations(user).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!();
        println!(
            "  {} No plugins installed for '{}'. Install one with: {}",
            style("i").blue().bold(),
            user,
            style("wdn install <plugin>").yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = new_table();
    table.set_header(vec![
        Cell::new("Plugin").fg(Color::White),
        Cell::new("Version").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Dependencies").fg(Color::White),
        Cell::new("Updated").fg(Color::White),
    ]);

    for record in &records {
        let name = if record.auto_installed {
            format!("{} (dependency)", record.plugin_id)
        } else {
            record.plugin_id.clone()
        };
        let deps = match &record.failure {
            Some(failure) => Cell::new(&failure.message).fg(Color::Red),
            None => Cell::new(record.dependencies_resolved.join(", ")).fg(Color::DarkGrey),
        };
        table.add_row(vec![
            Cell::new(name).fg(Color::Cyan),
            Cell::new(&record.version),
            status_cell(record.status),
            deps,
            Cell::new(record.updated_at.format("%Y-%m-%d %H:%M UTC")).fg(Color::DarkGrey),
        ]);
    }

    let installed = records.iter().filter(|r| r.is_installed()).count();
    println!();
    println!("{table}");
    println!();
    println!(
        "  {} installed plugin{}",
        style(installed).bold(),
        if installed == 1 { "" } else { "s" }
    );
    println!();
    Ok(())
}

/// Print the permission catalog.
pub fn catalog(json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&CATALOG)?);
        return Ok(());
    }

    let mut table = new_table();
    table.set_header(vec![
        Cell::new("Kind").fg(Color::White),
        Cell::new("Name").fg(Color::White),
        Cell::new("Risk").fg(Color::White),
        Cell::new("Description").fg(Color::White),
    ]);
    for entry in &CATALOG {
        table.add_row(vec![
            Cell::new(entry.kind).fg(Color::Cyan),
            Cell::new(entry.name),
            risk_cell(entry.risk),
            Cell::new(entry.description),
        ]);
    }
    println!();
    println!("{table}");
    println!();
    Ok(())
}

pub(crate) fn risk_cell(risk: RiskTier) -> Cell {
    let color = match risk {
        RiskTier::Low => Color::Green,
        RiskTier::Medium => Color::Yellow,
        RiskTier::High => Color::Magenta,
        RiskTier::Critical => Color::Red,
    };
    Cell::new(risk).fg(color)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::{publish_app, state};

    #[tokio::test]
    async fn publish_directory_then_list() {
        let (state, dir) = state().await;
        let manifests = dir.path().join("manifests");
        std::fs::create_dir(&manifests).unwrap();
        std::fs::write(
            manifests.join("lib.toml"),
            "id = \"lib\"\nversion = \"1.0.0\"\n",
        )
        .unwrap();
        std::fs::write(
            manifests.join("app.toml"),
            "id = \"app\"\nversion = \"1.0.0\"\n[[dependencies]]\nid = \"lib\"\nversion = \"^1\"\n",
        )
        .unwrap();

        publish(&state, &manifests, true).await.unwrap();
        // Republishing identical content is a no-op.
        publish(&state, &manifests, true).await.unwrap();

        let listed = state.engine.manifests().list().await.unwrap();
        assert_eq!(listed.len(), 2);
    }

    #[tokio::test]
    async fn publish_empty_directory_fails() {
        let (state, dir) = state().await;
        let empty = dir.path().join("empty");
        std::fs::create_dir(&empty).unwrap();
        assert!(publish(&state, &empty, true).await.is_err());
    }

    #[tokio::test]
    async fn install_without_grants_fails_then_succeeds() {
        let (state, _dir) = state().await;
        publish_app(&state).await;

        let err = install(&state, "u1", "app", None, false, true)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("read-files"));

        state
            .engine
            .permissions()
            .grant("app", "u1", None)
            .await
            .unwrap();
        install(&state, "u1", "app", None, false, true).await.unwrap();

        let records = state.engine.installer().installations("u1").await.unwrap();
        assert!(records.iter().all(|r| r.is_installed()));
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn uninstall_with_yes_cascades() {
        let (state, _dir) = state().await;
        publish_app(&state).await;
        state
            .engine
            .permissions()
            .grant("app", "u1", None)
            .await
            .unwrap();
        install(&state, "u1", "app", None, false, true).await.unwrap();

        assert!(uninstall(&state, "u1", "lib", false, false, true).await.is_err());
        uninstall(&state, "u1", "lib", true, true, true).await.unwrap();

        let records = state.engine.installer().installations("u1").await.unwrap();
        assert!(records.iter().all(|r| !r.is_installed()));
    }

    #[test]
    fn catalog_prints_json() {
        catalog(true).unwrap();
    }
}
