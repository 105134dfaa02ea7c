//! Agentry CLI and REST API binary.

mod agents;
mod cli;
mod http;
mod state;

use clap::Parser;
use clap_complete::generate;

use agentry_observe::{TracingOptions, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,agentry=debug",
        _ => "trace",
    };
    let otel = matches!(cli.command, Commands::Serve { otel: true, .. });
    init_tracing(&TracingOptions::new(filter).json(cli.log_json).otel(otel))
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "agentry", &mut std::io::stdout());
        return Ok(());
    }

    // Initialize application state (config, memory, orchestrator)
    let state = AppState::init().await?;
    let result = run(&state, cli).await;

    // Drain background work even when the command failed
    let stopped = state.shutdown().await;
    shutdown_tracing();
    result.and(stopped)
}

async fn run(state: &AppState, cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve { port, host, .. } => {
            let host = host.unwrap_or_else(|| state.config.server.host.clone());
            let port = port.unwrap_or(state.config.server.port);
            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;

            if !cli.quiet {
                println!(
                    "  {} Agentry API listening on {}",
                    console::style("⚡").bold(),
                    console::style(format!("http://{addr}")).cyan()
                );
                println!("  {}", console::style("Press Ctrl+C to stop").dim());
            }
            tracing::info!(%addr, data_dir = %state.data_dir.display(), "server started");

            let router = http::router::build_router(state.clone());
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            if !cli.quiet {
                println!("\n  Server stopped.");
            }
        }

        Commands::Agents => cli::agent::list_agents(state, cli.json)?,

        Commands::Actions { agent } => cli::agent::list_actions(state, &agent, cli.json)?,

        Commands::Dispatch {
            agent,
            action,
            process_id,
            input,
            mode,
        } => {
            cli::process::dispatch(state, agent, action, process_id, input, mode, cli.json).await?;
        }

        Commands::Status { agent, process_id } => {
            cli::process::status(state, &agent, &process_id, cli.json).await?;
        }

        Commands::List {
            agent,
            limit,
            skip,
            sort,
        } => {
            cli::process::list(state, &agent, limit, skip, sort, cli.json).await?;
        }

        Commands::Completions { .. } => unreachable!("handled above"),
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
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
