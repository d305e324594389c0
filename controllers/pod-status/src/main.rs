//! Pod Status Server
//!
//! Serves the live status of the cluster's pods over HTTP and WebSocket.
//!
//! One watch session per namespace scope keeps a synced pod cache; REST
//! calls read its snapshot and WebSocket clients subscribe to its events.

mod config;
mod error;
mod routes;
mod state;
mod views;
mod websocket;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::state::AppState;
use cluster_client::KubeClusterClient;
use pod_watch::{WatchContext, WatchHub};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("A rustls crypto provider was already installed");
    }

    info!("Starting Pod Status Server");

    let config = ServerConfig::from_env()?;
    info!("Configuration:");
    info!("  Listen address: {}", config.listen_addr);
    info!("  Sync timeout: {:?}", config.watch.sync_timeout);
    info!("  Subscriber queue: {}", config.watch.subscriber_capacity);
    info!("  Idle session timeout: {:?}", config.watch.idle_timeout);
    info!("  Action policy: {:?}", config.action_policy);
    info!(
        "  Default namespace: {}",
        config.default_namespace.as_deref().unwrap_or("all namespaces")
    );
    if let Some(interval) = config.snapshot_interval {
        info!("  Snapshot resend: every {:?}", interval);
    }

    let client = KubeClusterClient::try_default().await?;
    let ctx = WatchContext::new(Arc::new(client), config.watch.clone());
    let hub = Arc::new(WatchHub::new(ctx));
    let reaper = hub.spawn_reaper();

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!("Listening on {}", config.listen_addr);

    let app = routes::router(AppState::new(Arc::clone(&hub), config));
    let shutdown_hub = Arc::clone(&hub);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // ends open pod streams so their connections can drain
            shutdown_hub.shutdown().await;
        })
        .await?;

    hub.shutdown().await;
    if let Err(e) = reaper.await {
        warn!("Idle session reaper failed: {}", e);
    }
    info!("Pod Status Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
