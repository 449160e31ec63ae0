//! # TaskRelay
//!
//! Accepts communication and calendar tasks over HTTP, stores them in
//! SQLite and dispatches them to Twilio, a WhatsApp gateway, Microsoft
//! Graph and Google Calendar once they are due.
//!
//! Usage:
//!   taskrelay run                        # HTTP gateway + dispatch worker
//!   taskrelay serve --port 8080          # HTTP gateway only
//!   taskrelay worker                     # Dispatch worker only
//!   taskrelay --config ./relay.toml run  # Explicit config file

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use taskrelay_core::config::RelayConfig;
use taskrelay_core::traits::Providers;
use taskrelay_gateway::AppState;
use taskrelay_scheduler::{DispatchWorker, HandlerRegistry, TaskDb};

#[derive(Parser)]
#[command(
    name = "taskrelay",
    version,
    about = "📨 TaskRelay — scheduled SMS, calls, WhatsApp, email and calendar events"
)]
struct Cli {
    /// Config file (default: ~/.taskrelay/config.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP gateway only
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run the dispatch worker only
    Worker,
    /// Run the gateway and the worker in one process
    Run {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
}

/// Resolves once ctrl-c has been received.
fn shutdown_signal(mut rx: watch::Receiver<bool>) -> impl Future<Output = ()> + Send + 'static {
    async move {
        let _ = rx.wait_for(|stop| *stop).await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "taskrelay=debug,tower_http=debug"
    } else {
        "taskrelay=info,tower_http=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let mut config = RelayConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Command::Serve { host, port } | Command::Run { host, port } = &cli.command {
        if let Some(host) = host {
            config.server.host = host.clone();
        }
        if let Some(port) = port {
            config.server.port = *port;
        }
    }
    tracing::debug!("config: {}", config.redacted());

    // Both entry points create the table on start.
    let db_path = config.database.sqlite_path()?;
    let db = Arc::new(TaskDb::open(&db_path)?);
    tracing::info!("💾 Task store: {}", db_path.display());

    let providers = taskrelay_channels::build_providers(&config)?;
    let configured = providers.summary();
    if configured.is_empty() {
        tracing::warn!("⚠️ No providers configured; tasks will stay pending");
    } else {
        tracing::info!("🔌 Providers: {}", configured.join(", "));
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("🛑 Shutdown requested");
            let _ = stop_tx.send(true);
        }
    });

    match cli.command {
        Command::Serve { .. } => {
            let state = AppState::new(db, providers, &config);
            taskrelay_gateway::start(
                &config.server.host,
                config.server.port,
                state,
                shutdown_signal(stop_rx),
            )
            .await?;
        }
        Command::Worker => {
            build_worker(db, &providers, &config)
                .run_until(shutdown_signal(stop_rx))
                .await;
        }
        Command::Run { .. } => {
            let worker = build_worker(db.clone(), &providers, &config);
            let state = AppState::new(db, providers, &config);
            let (served, ()) = tokio::join!(
                taskrelay_gateway::start(
                    &config.server.host,
                    config.server.port,
                    state,
                    shutdown_signal(stop_rx.clone()),
                ),
                worker.run_until(shutdown_signal(stop_rx)),
            );
            served?;
        }
    }
    Ok(())
}

fn build_worker(db: Arc<TaskDb>, providers: &Providers, config: &RelayConfig) -> DispatchWorker {
    let registry = HandlerRegistry::from_providers(providers);
    DispatchWorker::new(db, registry, &config.worker)
}
