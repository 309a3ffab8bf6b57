//! Patchbay - Server Surface
//!
//! Thin plumbing in front of the service core: an axum router exposing
//!
//! - `GET /` -- static informational page
//! - `GET /introduction/{user_name}` -- WebSocket, introduction protocol
//! - `GET /connection/{user_name}/{target_name}/{document_id}` -- WebSocket,
//!   rendezvous then opaque relay
//!
//! The server holds no protocol state of its own; every socket is driven
//! into the shared [`Patchbay`] instance it was bound with.

mod config;
mod ws;

pub use config::ServerConfig;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::response::Html;
use axum::routing::get;
use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::service::{Event, Patchbay};

/// Errors that can occur in the relay server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind the listening socket.
    #[error("bind failed: {0}")]
    BindFailed(std::io::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A running WebSocket front for one [`Patchbay`] instance.
///
/// # Example
///
/// ```ignore
/// let hub = Arc::new(Patchbay::new());
/// let server = RelayServer::bind(ServerConfig::default(), hub).await?;
/// println!("listening on {}", server.local_addr());
/// // ...
/// server.shutdown().await?;
/// ```
pub struct RelayServer {
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    served: Option<JoinHandle<()>>,
}

impl RelayServer {
    /// Bind the configured port and start serving.
    ///
    /// Emits [`Event::Ready`] on the hub once listening; the serving task
    /// emits [`Event::Closed`] when it stops.
    pub async fn bind(config: ServerConfig, hub: Arc<Patchbay>) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], config.port)))
            .await
            .map_err(ServerError::BindFailed)?;
        let local_addr = listener.local_addr()?;

        let app = Router::new()
            .route("/", get(root_page))
            .route("/introduction/{user_name}", get(ws::introduction_handler))
            .route(
                "/connection/{user_name}/{target_name}/{document_id}",
                get(ws::connection_handler),
            )
            .with_state(hub.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task_hub = hub.clone();
        let served = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            if let Err(err) = serve.await {
                debug!(%err, "serve loop ended with error");
            }
            task_hub.emit(Event::Closed);
        });

        if !config.silent {
            info!(addr = %local_addr, "patchbay listening");
        }
        hub.emit(Event::Ready { addr: local_addr });

        Ok(Self {
            local_addr,
            shutdown_tx: Some(shutdown_tx),
            served: Some(served),
        })
    }

    /// The address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Gracefully shut down and wait until serving has stopped.
    ///
    /// In-flight connections are allowed to drain first.
    pub async fn shutdown(mut self) -> Result<(), ServerError> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(served) = self.served.take() {
            let _ = served.await;
        }
        Ok(())
    }
}

impl Drop for RelayServer {
    fn drop(&mut self) {
        // Stop serving if shutdown() was never called.
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn root_page() -> Html<&'static str> {
    Html(ROOT_PAGE)
}

const ROOT_PAGE: &str = "<!DOCTYPE html>\n<html>\n<head><title>patchbay</title></head>\n<body>\n<h1>patchbay</h1>\n<p>A rendezvous and relay service for peer-to-peer document synchronization.</p>\n<ul>\n<li><code>/introduction/{user_name}</code> &mdash; announce interests, receive introductions</li>\n<li><code>/connection/{user_name}/{target_name}/{document_id}</code> &mdash; rendezvous with a named peer</li>\n</ul>\n</body>\n</html>\n";
