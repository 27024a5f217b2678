//! Convo CLI and REST API entry point.
//!
//! Binary name: `convo`
//!
//! Parses CLI arguments, initializes the database and services, then
//! either starts the REST API server or runs a maintenance command.

mod http;
mod state;

use clap::{Parser, Subcommand};

use convo_core::llm::InferenceClient;
use convo_core::session::SessionRepository;
use convo_infra::config::ServerSettings;
use state::AppState;

#[derive(Parser)]
#[command(name = "convo", version, about = "Session-aware relay for a text-generation backend")]
struct Cli {
    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Export spans via OpenTelemetry (stdout exporter)
    #[arg(long, global = true)]
    otel: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the REST API server
    Serve {
        /// Bind address (overrides CONVO_HOST)
        #[arg(long)]
        host: Option<String>,
        /// Bind port (overrides CONVO_PORT)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Remove sessions idle past the configured timeout
    Cleanup,
    /// Probe the database and upstream backend
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,convo=debug",
        _ => "trace",
    };
    convo_observe::tracing_setup::init_tracing(filter, cli.otel)
        .map_err(|e| anyhow::anyhow!("tracing init failed: {e}"))?;

    let settings = ServerSettings::from_env();
    let state = AppState::init(settings.clone()).await?;

    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or(settings.host);
            let port = port.unwrap_or(settings.port);
            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;

            println!(
                "  {} Convo relay listening on {}",
                console::style("⚡").bold(),
                console::style(format!("http://{addr}")).cyan()
            );
            println!(
                "  {} Upstream backend: {}",
                console::style("↪").bold(),
                console::style(&settings.relay.upstream_url).cyan()
            );
            println!("  {}", console::style("Press Ctrl+C to stop").dim());

            let router = http::router::build_router(state);

            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            convo_observe::tracing_setup::shutdown_tracing();
            println!("\n  Server stopped.");
        }

        Commands::Cleanup => {
            let removed = state.sessions.sweep_expired().await?;
            println!(
                "  {} Removed {} expired session{}",
                console::style("✓").green(),
                console::style(removed).bold(),
                if removed == 1 { "" } else { "s" }
            );
        }

        Commands::Status => {
            let database_ok = state.sessions.repo().ping().await.is_ok();
            let upstream_ok = state.client.healthy().await;
            let session_count = state.sessions.repo().count_sessions().await.unwrap_or(0);

            let check_mark = |ok: bool| {
                if ok {
                    format!("{}", console::style("✓").green())
                } else {
                    format!("{}", console::style("✗").red())
                }
            };
            println!();
            println!("  {} Database reachable", check_mark(database_ok));
            println!(
                "  {} Upstream backend at {}",
                check_mark(upstream_ok),
                settings.relay.upstream_url
            );
            println!("  {} stored sessions", console::style(session_count).bold());
            println!();
        }
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
