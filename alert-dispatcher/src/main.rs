//! Alert dispatcher - webhook receiver and delivery workers in one process.
//!
//! This binary:
//! - Receives Sqreen security alert webhooks
//! - Verifies their signature and enqueues them
//! - Delivers them to the configured backends from a worker pool

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use alertd::web::{router, AppState};
use alertd::{BackendRegistry, Config, DispatchQueue, WorkerPool};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("dispatcher_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.port,
        backends = ?config.backends,
        worker_count = config.worker_count,
        queue_capacity = ?config.dispatch_queue_capacity,
        slack_token_configured = config.slack_api_token.is_some(),
        "config_loaded"
    );

    let secret = config
        .webhook_secret
        .clone()
        .context("SQREEN_WEBHOOK_SECRET must be set")?;

    // Build backends and start the workers
    let registry = BackendRegistry::from_config(&config)
        .await
        .context("Failed to configure backends")?;
    let registry = Arc::new(registry);

    let queue = DispatchQueue::with_capacity(config.dispatch_queue_capacity);
    let mut pool = WorkerPool::new(queue.clone(), config.worker_count);
    pool.start().context("Failed to start worker pool")?;

    // Build the router
    let state = AppState::new(secret, Arc::clone(&registry), queue);
    let app = router(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Let in-flight deliveries finish, then release backend resources
    pool.shutdown(config.shutdown_timeout()).await;
    registry.close_all().await;

    info!("dispatcher_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
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
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("web_server_shutting_down");
}
