//! CLI permission subcommands: list, request, grant, revoke.

use anyhow::Result;
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use warden_core::permission::catalog;
use warden_types::permission::{PermissionGrant, PermissionKind, PermissionState};

use super::plugin::risk_cell;
use crate::state::AppState;

#[derive(Subcommand)]
pub enum PermissionCommand {
    /// Show every declared permission of a plugin and its grant state.
    List { plugin: String },

    /// Request every declared permission that is not already requested or granted.
    Request { plugin: String },

    /// Grant permissions (all declared kinds when none are given).
    Grant {
        plugin: String,
        kinds: Vec<PermissionKind>,
    },

    /// Revoke permissions (every grant when no kinds are given).
    Revoke {
        plugin: String,
        kinds: Vec<PermissionKind>,
    },
}

pub async fn run(state: &AppState, user: &str, action: PermissionCommand, json: bool) -> Result<()> {
    let service = state.engine.permissions();
    let (plugin, grants, verb) = match action {
        PermissionCommand::List { plugin } => {
            let grants = service.list(&plugin, user).await?;
            (plugin, grants, None)
        }
        PermissionCommand::Request { plugin } => {
            let grants = service.request(&plugin, user).await?;
            (plugin, grants, Some("Requested"))
        }
        PermissionCommand::Grant { plugin, kinds } => {
            let grants = service.grant(&plugin, user, as_filter(&kinds)).await?;
            (plugin, grants, Some("Granted"))
        }
        PermissionCommand::Revoke { plugin, kinds } => {
            let grants = service.revoke(&plugin, user, as_filter(&kinds)).await?;
            (plugin, grants, Some("Revoked"))
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&grants)?);
        return Ok(());
    }

    if let Some(verb) = verb {
        println!("  {} {verb} permissions for {}", style("✓").green().bold(), style(&plugin).cyan());
    }
    print_grants(&grants);
    Ok(())
}

/// An empty kind list means "all".
fn as_filter(kinds: &[PermissionKind]) -> Option<&[PermissionKind]> {
    if kinds.is_empty() { None } else { Some(kinds) }
}

fn print_grants(grants: &[PermissionGrant]) {
    if grants.is_empty() {
        println!();
        println!("  {} This plugin declares no permissions.", style("i").blue().bold());
        println!();
        return;
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Permission").fg(Color::White),
        Cell::new("Risk").fg(Color::White),
        Cell::new("State").fg(Color::White),
        Cell::new("Description").fg(Color::White),
    ]);

    for grant in grants {
        let entry = catalog::entry(grant.kind);
        let state_cell = match grant.state {
            PermissionState::Granted => Cell::new("● granted").fg(Color::Green),
            PermissionState::Requested => Cell::new("◌ requested").fg(Color::Yellow),
            PermissionState::Revoked => Cell::new("✗ revoked").fg(Color::Red),
            PermissionState::NotRequested => Cell::new("○ not requested").fg(Color::DarkGrey),
        };
        table.add_row(vec![
            Cell::new(grant.kind).fg(Color::Cyan),
            risk_cell(entry.risk),
            state_cell,
            Cell::new(entry.description),
        ]);
    }

    println!();
    println!("{table}");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::{publish_app, state};

    #[test]
    fn empty_kinds_mean_all() {
        assert!(as_filter(&[]).is_none());
        assert_eq!(
            as_filter(&[PermissionKind::ApiKeys]),
            Some(&[PermissionKind::ApiKeys][..])
        );
    }

    #[tokio::test]
    async fn grant_then_revoke_round() {
        let (state, _dir) = state().await;
        publish_app(&state).await;

        run(
            &state,
            "u1",
            PermissionCommand::Grant {
                plugin: "app".to_string(),
                kinds: vec![PermissionKind::ReadFiles],
            },
            true,
        )
        .await
        .unwrap();
        assert!(
            state
                .engine
                .permissions()
                .is_fully_satisfied("app", "u1")
                .await
                .unwrap()
        );

        run(
            &state,
            "u1",
            PermissionCommand::Revoke {
                plugin: "app".to_string(),
                kinds: Vec::new(),
            },
            true,
        )
        .await
        .unwrap();
        let grants = state.engine.permissions().list("app", "u1").await.unwrap();
        assert_eq!(grants[0].state, PermissionState::Revoked);
    }

    #[tokio::test]
    async fn granting_undeclared_kind_fails() {
        let (state, _dir) = state().await;
        publish_app(&state).await;
        let result = run(
            &state,
            "u1",
            PermissionCommand::Grant {
                plugin: "app".to_string(),
                kinds: vec![PermissionKind::ExecuteCommands],
            },
            true,
        )
        .await;
        assert!(result.is_err());
    }
}
