//! avad: runs Ava's background orchestrator and serves the admin API until
//! interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use ava_core::telemetry::{init_tracing, parse_level, LoggingOptions};
use ava_core::{Orchestrator, Settings};
use avad::AppState;

#[derive(Parser)]
#[command(name = "avad")]
#[command(about = "Ava daemon: background tasks and admin API")]
#[command(version = ava_core::VERSION)]
struct Args {
    /// TOML configuration file (overrides AVA_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the admin bind address
    #[arg(long)]
    host: Option<String>,

    /// Override the admin port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings =
        Settings::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(host) = args.host {
        settings.admin.host = host;
    }
    if let Some(port) = args.port {
        settings.admin.port = port;
    }
    settings
        .setup_directories()
        .context("Failed to create data directories")?;

    let log_path = init_tracing(&LoggingOptions {
        level: parse_level(&settings.log_level),
        json: settings.is_production(),
        log_dir: Some(settings.log_dir()),
    })
    .context("Failed to initialise logging")?;
    tracing::info!(
        version = ava_core::VERSION,
        env = %settings.env,
        log_file = ?log_path,
        "starting avad"
    );

    let orchestrator = Arc::new(Orchestrator::from_settings(&settings)?);
    orchestrator
        .start()
        .await
        .context("Failed to start orchestrator")?;

    let app = avad::router(AppState::from_settings(orchestrator.clone(), &settings));
    let addr = format!("{}:{}", settings.admin.host, settings.admin.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            orchestrator.shutdown().await;
            return Err(e).with_context(|| format!("Failed to bind {addr}"));
        }
    };
    tracing::info!(%addr, "admin api listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    tracing::info!("admin api stopped, shutting down orchestrator");
    orchestrator.shutdown().await;
    served.context("Admin server error")?;

    tracing::info!("avad stopped");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
        () = ctrl_c => tracing::info!("received Ctrl-C, starting graceful shutdown"),
        () = terminate => tracing::info!("received SIGTERM, starting graceful shutdown"),
    }
}
