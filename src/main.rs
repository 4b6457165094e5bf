mod api;
mod config;
mod error;
mod integrations;
mod k8s;
mod model;
mod reconcile;
mod recovery;
mod store;

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api::AppState;
use config::Settings;
use integrations::Integrations;
use reconcile::supervisor::Supervisor;
use store::Store;

#[derive(Parser, Debug)]
#[command(author, version, about = "Amazon ECS control-plane emulation on a local Kubernetes substrate", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the ECS-compatible HTTP server (default if no subcommand is given)
    Serve,
    /// Apply database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Required once per process before any kube-rs HTTPS connection is made.
    rustls::crypto::ring::default_provider()
        .install_default()
        .ok();

    let cli = Cli::parse();
    let settings = Settings::load()?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Migrate => run_migrate(&settings).await,
        Commands::Serve => run_serve(settings).await,
    }
}

async fn run_migrate(settings: &Settings) -> Result<()> {
    let store = Store::connect(&settings.database).await?;
    store.migrate().await?;
    info!("migrations applied");
    Ok(())
}

async fn run_serve(settings: Settings) -> Result<()> {
    let store = Store::connect(&settings.database).await?;
    store.migrate().await?;

    let integrations = Integrations::default();
    let supervisor = Arc::new(Supervisor::new(
        store.clone(),
        settings.reconciler.clone(),
        integrations.task_updater.clone(),
        CancellationToken::new(),
    ));

    if let Err(err) = recovery::recover(&store, &settings, &supervisor).await {
        tracing::error!(%err, "startup recovery failed; continuing with a clean reconciler set");
    }

    let state = AppState {
        store,
        aws: settings.aws.clone(),
        k3d: settings.k3d.clone(),
        reconcilers: supervisor.clone(),
    };

    let app = api::router(state);
    let listener = tokio::net::TcpListener::bind(&settings.server.bind_addr).await?;
    info!(addr = %settings.server.bind_addr, "kecs listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("http server shutdown complete; draining reconcilers");
    match Arc::try_unwrap(supervisor) {
        Ok(supervisor) => supervisor.shutdown().await,
        Err(_) => tracing::warn!("reconciler supervisor still referenced at shutdown; skipping drain"),
    }

    Ok(())
}

/// Waits for SIGINT or SIGTERM so in-flight requests and reconciler batches
/// get a chance to flush before the process exits.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received SIGINT, shutting down gracefully");
        },
        _ = terminate => {
            info!("received SIGTERM, shutting down gracefully");
        },
    }
}
