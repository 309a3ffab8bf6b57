//! Patchbay hub daemon.
//!
//! Runs one Patchbay instance behind the WebSocket server until ctrl-c.
//!
//! Environment variables:
//! - PATCHBAY_PORT: listening port (default 9632)
//! - PATCHBAY_SILENT: "1" to suppress the startup line
//! - RUST_LOG: tracing filter (default "info")

use std::sync::Arc;

use patchbay::core::DEFAULT_PORT;
use patchbay::server::{RelayServer, ServerConfig, ServerError};
use patchbay::service::{Event, Patchbay};
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let port = std::env::var("PATCHBAY_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let silent = std::env::var("PATCHBAY_SILENT").is_ok_and(|v| v == "1");

    let hub = Arc::new(Patchbay::new());
    tokio::spawn(watch_events(hub.subscribe()));

    let server = RelayServer::bind(ServerConfig::new(port).with_silent(silent), hub).await?;
    info!(addr = %server.local_addr(), "hub up, ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    server.shutdown().await
}

/// Surface service events in the daemon log.
async fn watch_events(mut events: broadcast::Receiver<Event>) {
    loop {
        match events.recv().await {
            Ok(Event::Registered { user }) => info!(%user, "peer registered"),
            Ok(Event::DecodeFailure { user, data, reason }) => {
                warn!(%user, bytes = data.len(), %reason, "undecodable frame");
            }
            Ok(Event::Ready { .. } | Event::Closed) => {}
            Err(broadcast::error::RecvError::Closed) => break,
            // Lagging only costs us log lines.
            Err(broadcast::error::RecvError::Lagged(_)) => {}
        }
    }
}
