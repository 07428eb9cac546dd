mod api;
mod config;
mod date_range;
mod media_store;
mod ordering;
mod recompute;
mod store;

use anyhow::{Context, Result};
use api::AppState;
use config::Config;
use media_store::MediaStore;
use recompute::Recomputer;
use std::sync::Arc;
use store::LaneStore;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting Memory Lanes service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    // Initialize components
    let store = Arc::new(
        LaneStore::new(&config.database)
            .await
            .context("Failed to initialize lane store")?,
    );

    // Run migrations if enabled
    if config.database.run_migrations {
        store
            .run_migrations()
            .await
            .context("Failed to run database migrations")?;
    }

    let media = Arc::new(
        MediaStore::new(&config.media)
            .await
            .context("Failed to initialize media store")?,
    );

    let recomputer = Recomputer::new(store.clone(), config.recompute.clone());

    // Create API state
    let api_state = AppState {
        store: store.clone(),
        media: media.clone(),
        recomputer,
        presigned_url_expiry: config.presigned_url_expiry(),
    };

    // Spawn API server task
    let api_config = config.api.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = api::start_api_server(api_state, &api_config).await {
            error!(error = %e, "API server error");
        }
    });

    info!("Memory Lanes service started successfully");

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutting down Memory Lanes service");

    // Abort tasks
    api_handle.abort();

    info!("Memory Lanes service stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
