//! CLI command definitions and dispatch for the `wdn` binary.
//!
//! Uses clap derive macros for argument parsing. Plugin lifecycle commands are
//! top-level verbs (`wdn install scanner`); permissions and sandbox settings
//! are noun groups (`wdn permissions grant scanner read-files`).

pub mod permission;
pub mod plugin;
pub mod sandbox;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Resolve plugin dependencies and manage plugin permissions and sandboxes.
#[derive(Parser)]
#[command(name = "wdn", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// User whose installations are managed.
    #[arg(short, long, global = true, env = "WARDEN_USER", default_value = "local")]
    pub user: String,

    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for info, -vv for debug, -vvv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Publish a plugin manifest file (.toml or .json), or every manifest in a directory.
    Publish {
        /// Manifest file or directory.
        path: std::path::PathBuf,
    },

    /// List published manifests.
    Manifests {
        /// Only show versions of this plugin.
        id: Option<String>,
    },

    /// Show how a plugin would resolve against your installed plugins.
    #[command(disable_version_flag = true)]
    Resolve {
        plugin: String,

        /// Resolve a specific version instead of the latest.
        #[arg(long)]
        version: Option<semver::Version>,
    },

    /// Install a plugin and its dependencies.
    #[command(disable_version_flag = true)]
    Install {
        plugin: String,

        /// Install a specific version instead of the latest.
        #[arg(long)]
        version: Option<semver::Version>,

        /// Do not install missing dependencies; fail instead.
        #[arg(long)]
        no_deps: bool,
    },

    /// Move an installed plugin to another version.
    #[command(disable_version_flag = true)]
    Upgrade {
        plugin: String,
        version: semver::Version,
    },

    /// Uninstall a plugin.
    #[command(alias = "rm")]
    Uninstall {
        plugin: String,

        /// Also uninstall plugins that depend on it.
        #[arg(long)]
        cascade: bool,

        /// Skip the cascade confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// List your plugin installations.
    #[command(alias = "ls")]
    List,

    /// Manage permission grants (list, request, grant, revoke).
    #[command(alias = "perm")]
    Permissions {
        #[command(subcommand)]
        action: permission::PermissionCommand,
    },

    /// Show or change a plugin's sandbox.
    Sandbox {
        #[command(subcommand)]
        action: sandbox::SandboxCommand,
    },

    /// Show the permission catalog with risk tiers.
    Catalog,

    /// Start the REST API server.
    Serve {
        /// Port to listen on.
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Emit logs as JSON lines.
        #[arg(long)]
        log_json: bool,

        /// Export spans through OpenTelemetry (stdout exporter).
        #[arg(long)]
        otel: bool,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// Style a status word the way every listing shows it.
pub(crate) fn status_cell(status: warden_types::installation::InstallStatus) -> comfy_table::Cell {
    use comfy_table::{Cell, Color};
    use warden_types::installation::InstallStatus;

    match status {
        InstallStatus::Installed => Cell::new("● installed").fg(Color::Green),
        InstallStatus::Pending => Cell::new("◌ pending").fg(Color::Yellow),
        InstallStatus::Failed => Cell::new("✗ failed").fg(Color::Red),
        InstallStatus::Uninstalled => Cell::new("○ uninstalled").fg(Color::DarkGrey),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn install_flags_parse() {
        let cli = Cli::try_parse_from([
            "wdn", "-u", "alice", "install", "scanner", "--version", "2.1.0", "--no-deps",
        ])
        .unwrap();
        assert_eq!(cli.user, "alice");
        match cli.command {
            Commands::Install {
                plugin,
                version,
                no_deps,
            } => {
                assert_eq!(plugin, "scanner");
                assert_eq!(version, Some(semver::Version::new(2, 1, 0)));
                assert!(no_deps);
            }
            _ => panic!("expected install"),
        }
    }

    #[test]
    fn permission_kinds_parse() {
        let cli = Cli::try_parse_from([
            "wdn", "permissions", "grant", "scanner", "read-files", "network-access",
        ])
        .unwrap();
        match cli.command {
            Commands::Permissions {
                action: permission::PermissionCommand::Grant { plugin, kinds },
            } => {
                assert_eq!(plugin, "scanner");
                assert_eq!(kinds.len(), 2);
            }
            _ => panic!("expected permissions grant"),
        }
    }

    #[test]
    fn unknown_permission_kind_is_rejected() {
        assert!(Cli::try_parse_from(["wdn", "permissions", "grant", "p", "root-access"]).is_err());
    }

    #[test]
    fn sandbox_enable_and_disable_conflict() {
        assert!(
            Cli::try_parse_from(["wdn", "sandbox", "set", "p", "--enable", "--disable"]).is_err()
        );
    }
}
