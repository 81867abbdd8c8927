//! Warden CLI and REST API entry point.
//!
//! Binary name: `wdn`
//!
//! Parses CLI arguments, opens the engine over the SQLite database, then
//! dispatches to the command handler or starts the REST API server.

mod cli;
mod http;
mod state;

use clap::Parser;
use clap_complete::generate;
use warden_observe::{LogFormat, TracingOptions, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions don't need tracing or app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "wdn", &mut std::io::stdout());
        return Ok(());
    }

    let mut tracing_options = TracingOptions::for_verbosity(cli.verbose, cli.quiet);
    if let Commands::Serve { log_json, otel, .. } = &cli.command {
        if *log_json {
            tracing_options.format = LogFormat::Json;
        }
        tracing_options.otel = *otel;
        // A server logs its requests by default.
        if cli.verbose == 0 && !cli.quiet {
            tracing_options.default_directive = Some("info,tower_http=debug".to_string());
        }
    }
    init_tracing(&tracing_options).map_err(|e| anyhow::anyhow!("tracing setup failed: {e}"))?;

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let state = AppState::init().await?;
    let user = cli.user.as_str();
    let json = cli.json;

    match cli.command {
        Commands::Publish { path } => {
            cli::plugin::publish(&state, &path, json).await?;
        }

        Commands::Manifests { id } => {
            cli::plugin::list_manifests(&state, id.as_deref(), json).await?;
        }

        Commands::Resolve { plugin, version } => {
            cli::plugin::resolve(&state, user, &plugin, version.as_ref(), json).await?;
        }

        Commands::Install {
            plugin,
            version,
            no_deps,
        } => {
            cli::plugin::install(&state, user, &plugin, version, no_deps, json).await?;
        }

        Commands::Upgrade { plugin, version } => {
            cli::plugin::upgrade(&state, user, &plugin, &version, json).await?;
        }

        Commands::Uninstall {
            plugin,
            cascade,
            yes,
        } => {
            cli::plugin::uninstall(&state, user, &plugin, cascade, yes, json).await?;
        }

        Commands::List => {
            cli::plugin::list(&state, user, json).await?;
        }

        Commands::Permissions { action } => {
            cli::permission::run(&state, user, action, json).await?;
        }

        Commands::Sandbox { action } => {
            cli::sandbox::run(&state, user, action, json).await?;
        }

        Commands::Catalog => {
            cli::plugin::catalog(json)?;
        }

        Commands::Serve { port, host, .. } => {
            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;

            println!(
                "  {} Warden API listening on {}",
                console::style("⚡").bold(),
                console::style(format!("http://{addr}/api/v1")).cyan()
            );
            println!("  {}", console::style("Press Ctrl+C to stop").dim());

            let router = http::router::build_router(state);

            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            println!("\n  Server stopped.");
        }

        Commands::Completions { .. } => {}
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
