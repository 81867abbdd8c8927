//! CLI sandbox subcommands: show and set.

use anyhow::Result;
use clap::{ArgGroup, Args, Subcommand};
use console::style;
use dialoguer::Confirm;

use warden_types::sandbox::{IsolationLevel, ResourceLimits, SandboxUpdate};

use crate::state::AppState;

#[derive(Subcommand)]
pub enum SandboxCommand {
    /// Show the stored sandbox config and the limits actually enforced.
    Show { plugin: String },

    /// Change isolation level, resource limits, or enable/disable the sandbox.
    Set(SetArgs),
}

#[derive(Args)]
#[command(group(ArgGroup::new("toggle").args(["enable", "disable"])))]
pub struct SetArgs {
    pub plugin: String,

    #[arg(long)]
    pub level: Option<IsolationLevel>,

    /// Memory limit in MB (clamped to the level's ceiling).
    #[arg(long)]
    pub memory_mb: Option<u32>,

    /// Execution time limit in milliseconds.
    #[arg(long)]
    pub time_ms: Option<u64>,

    /// File size limit in KB.
    #[arg(long)]
    pub file_kb: Option<u32>,

    #[arg(long)]
    pub enable: bool,

    /// Turn the sandbox off. Asks for confirmation unless --yes.
    #[arg(long)]
    pub disable: bool,

    #[arg(short, long)]
    pub yes: bool,
}

impl SetArgs {
    fn to_update(&self, confirm_disable: bool) -> SandboxUpdate {
        let limits = ResourceLimits {
            max_memory_mb: self.memory_mb,
            max_execution_time_ms: self.time_ms,
            max_file_size_kb: self.file_kb,
        };
        let enabled = match (self.enable, self.disable) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        SandboxUpdate {
            enabled,
            isolation_level: self.level,
            resource_limits: (limits != ResourceLimits::default()).then_some(limits),
            confirm_disable,
        }
    }
}

pub async fn run(state: &AppState, user: &str, action: SandboxCommand, json: bool) -> Result<()> {
    match action {
        SandboxCommand::Show { plugin } => show(state, user, &plugin, json).await,
        SandboxCommand::Set(args) => set(state, user, args, json).await,
    }
}

async fn show(state: &AppState, user: &str, plugin: &str, json: bool) -> Result<()> {
    let service = state.engine.sandbox();
    let config = service.get(plugin, user).await?;
    let effective = service.effective(plugin, user).await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "config": config,
                "effective": effective,
            }))?
        );
        return Ok(());
    }

    println!();
    println!("  {} {}", style("Sandbox for").bold(), style(plugin).cyan().bold());
    println!();
    let enabled = if config.enabled {
        style("enabled").green().to_string()
    } else {
        style("DISABLED").red().bold().to_string()
    };
    println!("  {:<16} {}", style("Status:").bold(), enabled);
    println!("  {:<16} {}", style("Isolation:").bold(), config.isolation_level);

    match effective.limits {
        Some(limits) => {
            let explicit = config.resource_limits;
            let mark = |set: bool| if set { "" } else { " (level default)" };
            println!(
                "  {:<16} {} MB{}",
                style("Memory:").bold(),
                limits.max_memory_mb,
                mark(explicit.max_memory_mb.is_some())
            );
            println!(
                "  {:<16} {} ms{}",
                style("Execution time:").bold(),
                limits.max_execution_time_ms,
                mark(explicit.max_execution_time_ms.is_some())
            );
            println!(
                "  {:<16} {} KB{}",
                style("File size:").bold(),
                limits.max_file_size_kb,
                mark(explicit.max_file_size_kb.is_some())
            );
        }
        None => {
            println!(
                "  {} No limits are enforced while the sandbox is disabled.",
                style("!").yellow().bold()
            );
        }
    }
    println!();
    Ok(())
}

async fn set(state: &AppState, user: &str, args: SetArgs, json: bool) -> Result<()> {
    let mut confirmed = args.yes;
    if args.disable && !confirmed && !json {
        confirmed = Confirm::new()
            .with_prompt(format!(
                "Disable the sandbox for '{}'? It will run without resource limits.",
                style(&args.plugin).red().bold()
            ))
            .default(false)
            .interact()?;

        if !confirmed {
            println!("  Cancelled.");
            return Ok(());
        }
    }

    let update = args.to_update(confirmed);
    let config = state
        .engine
        .sandbox()
        .update(&args.plugin, user, &update)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        println!(
            "  {} Sandbox for {} updated ({}, {})",
            style("✓").green().bold(),
            style(&args.plugin).cyan(),
            if config.enabled { "enabled" } else { "disabled" },
            config.isolation_level
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::{publish_app, state};

    fn args(plugin: &str) -> SetArgs {
        SetArgs {
            plugin: plugin.to_string(),
            level: None,
            memory_mb: None,
            time_ms: None,
            file_kb: None,
            enable: false,
            disable: false,
            yes: false,
        }
    }

    #[test]
    fn to_update_only_sets_given_fields() {
        let update = args("p").to_update(false);
        assert!(update.enabled.is_none());
        assert!(update.resource_limits.is_none());

        let mut a = args("p");
        a.memory_mb = Some(256);
        a.disable = true;
        let update = a.to_update(true);
        assert_eq!(update.enabled, Some(false));
        assert!(update.confirm_disable);
        assert_eq!(update.resource_limits.unwrap().max_memory_mb, Some(256));
    }

    #[tokio::test]
    async fn disable_in_json_mode_needs_yes() {
        let (state, _dir) = state().await;
        publish_app(&state).await;

        let mut a = args("app");
        a.disable = true;
        assert!(set(&state, "u1", a, true).await.is_err());

        let mut a = args("app");
        a.disable = true;
        a.yes = true;
        set(&state, "u1", a, true).await.unwrap();
        let effective = state.engine.sandbox().effective("app", "u1").await.unwrap();
        assert!(!effective.enforced);
    }

    #[tokio::test]
    async fn limits_are_clamped_to_level_ceiling() {
        let (state, _dir) = state().await;
        publish_app(&state).await;

        let mut a = args("app");
        a.level = Some(IsolationLevel::Strict);
        a.memory_mb = Some(4096);
        set(&state, "u1", a, true).await.unwrap();

        let effective = state.engine.sandbox().effective("app", "u1").await.unwrap();
        let ceiling = state.engine.config().isolation.strict.ceiling;
        assert_eq!(effective.limits.unwrap().max_memory_mb, ceiling.max_memory_mb);
    }
}
