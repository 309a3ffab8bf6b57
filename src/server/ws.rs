//! WebSocket endpoint handlers.
//!
//! Each accepted socket gets one writer task draining its link's command
//! channel, while the upgrade future itself becomes the reader loop that
//! feeds frames into the service. The service owns the connection's whole
//! lifecycle through exactly three calls: attach/open, per-frame, detach/close.

use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::core::UserName;
use crate::service::{Patchbay, SpliceKey};
use crate::transport::{Link, LinkCmd};

/// `GET /introduction/{user_name}`: register and speak the protocol.
pub(super) async fn introduction_handler(
    ws: WebSocketUpgrade,
    Path(user_name): Path<String>,
    State(hub): State<Arc<Patchbay>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| introduction_socket(socket, UserName::from(user_name), hub))
}

async fn introduction_socket(socket: WebSocket, user: UserName, hub: Arc<Patchbay>) {
    let (sink, mut stream) = socket.split();
    let (link, commands) = Link::channel(hub.next_conn_id());
    let conn = link.id();

    tokio::spawn(drive_writer(commands, sink));
    hub.attach_peer(user.clone(), link).await;
    debug!(%user, %conn, "introduction socket open");

    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(message) => message,
            Err(err) => {
                debug!(%user, %conn, %err, "introduction socket error");
                break;
            }
        };
        match message {
            WsMessage::Binary(data) => hub.peer_frame(&user, &data).await,
            WsMessage::Text(text) => {
                // The protocol is binary-framed.
                trace!(%user, len = text.len(), "text frame ignored");
            }
            WsMessage::Ping(_) | WsMessage::Pong(_) => {}
            WsMessage::Close(_) => break,
        }
    }

    hub.detach_peer(&user, conn).await;
    debug!(%user, %conn, "introduction socket closed");
}

/// `GET /connection/{user_name}/{target_name}/{document_id}`: rendezvous,
/// then opaque relay.
pub(super) async fn connection_handler(
    ws: WebSocketUpgrade,
    Path((user_name, target_name, document_id)): Path<(String, String, String)>,
    State(hub): State<Arc<Patchbay>>,
) -> impl IntoResponse {
    let key = SpliceKey::new(user_name, target_name, document_id);
    ws.on_upgrade(move |socket| connection_socket(socket, key, hub))
}

async fn connection_socket(socket: WebSocket, key: SpliceKey, hub: Arc<Patchbay>) {
    let (sink, mut stream) = socket.split();
    let (link, commands) = Link::channel(hub.next_conn_id());
    let conn = link.id();

    tokio::spawn(drive_writer(commands, sink));
    hub.open_splice(key.clone(), link).await;
    debug!(%key, %conn, "connection socket open");

    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(message) => message,
            Err(err) => {
                debug!(%key, %conn, %err, "connection socket error");
                break;
            }
        };
        // Spliced traffic is opaque: payload bytes pass through whether the
        // peer framed them as binary or text.
        match message {
            WsMessage::Binary(data) => hub.splice_frame(&key, conn, data.to_vec()).await,
            WsMessage::Text(text) => {
                hub.splice_frame(&key, conn, text.as_bytes().to_vec()).await;
            }
            WsMessage::Ping(_) | WsMessage::Pong(_) => {}
            WsMessage::Close(_) => break,
        }
    }

    hub.close_splice(&key, conn).await;
    debug!(%key, %conn, "connection socket closed");
}

/// Drain one link's command channel into its socket. Exits when the link's
/// senders are gone, the socket errors, or the service asks for a shutdown.
async fn drive_writer(
    mut commands: mpsc::UnboundedReceiver<LinkCmd>,
    mut sink: SplitSink<WebSocket, WsMessage>,
) {
    while let Some(command) = commands.recv().await {
        match command {
            LinkCmd::Frame(frame) => {
                if sink.send(WsMessage::Binary(frame.into())).await.is_err() {
                    // The reader loop sees the same closed socket and runs
                    // the cleanup path; nothing to do here.
                    break;
                }
            }
            LinkCmd::Shutdown => {
                let _ = sink.send(WsMessage::Close(None)).await;
                let _ = sink.close().await;
                break;
            }
        }
    }
}
