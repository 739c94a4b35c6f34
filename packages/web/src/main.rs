//! HTTP front end for the task event hub.
//!
//! Serves task streams as Server-Sent Events and exposes publish, broadcast
//! and stats endpoints, plus a simulated job for trying the hub out.

use api::EventHub;
use tracing_subscriber::EnvFilter;

mod demo;
mod routes;

const DEFAULT_BIND: &str = "0.0.0.0:8080";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let hub = api::init_hub().await?;

    let bind = std::env::var("HUB_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!("Event hub listening on http://{}", bind);

    axum::serve(listener, routes::router(hub.clone()))
        .with_graceful_shutdown(shutdown_signal(hub))
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Wait for Ctrl+C, then stop the hub so open streams end and the server
/// can drain.
async fn shutdown_signal(hub: EventHub) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down event hub...");
    if let Err(e) = hub.shutdown().await {
        tracing::warn!("Event hub shutdown failed: {}", e);
    }
}
