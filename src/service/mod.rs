//! Patchbay - Service Core
//!
//! The state-machine logic behind both endpoints:
//!
//! - **Peer directory & matching engine** ([`PeerDirectory`]): who is
//!   connected, what they are interested in, and who gets introduced to whom
//! - **Connection rendezvous** ([`HoldingTable`]): parks the first side of a
//!   connection request, buffering its traffic until the counterpart arrives
//! - **Socket relay** ([`RelayTable`]): verbatim bidirectional forwarding
//!   between matched connections
//!
//! [`Patchbay`] owns all three tables behind one lock and is the only type
//! the transport plumbing talks to. It is an explicit, lifecycle-scoped
//! container: create as many independent instances as you like (tests do),
//! and pass one around as `Arc<Patchbay>`.

mod directory;
mod relay;
mod rendezvous;

pub use directory::PeerDirectory;
pub use relay::RelayTable;
pub use rendezvous::{HoldingTable, SpliceKey};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{broadcast, RwLock};
use tracing::{debug, trace};

use crate::core::{UserName, EVENT_CHANNEL_CAPACITY};
use crate::protocol::{Message, WireError};
use crate::transport::{ConnId, Link};

/// Observable lifecycle events.
///
/// Collaborators may watch these through [`Patchbay::subscribe`]; nothing
/// they do with them alters service behavior.
#[derive(Debug, Clone)]
pub enum Event {
    /// The server has started listening.
    Ready {
        /// The bound address.
        addr: SocketAddr,
    },

    /// The server has finished shutting down.
    Closed,

    /// A peer completed registration on the introduction endpoint.
    Registered {
        /// The peer's name.
        user: UserName,
    },

    /// An incoming frame failed to decode. The connection stays open and no
    /// protocol state changed.
    DecodeFailure {
        /// The peer whose frame failed.
        user: UserName,
        /// The raw bytes, for diagnostics.
        data: Vec<u8>,
        /// What the codec objected to.
        reason: WireError,
    },
}

/// All tables live together so any operation that touches more than one --
/// the match, a disconnect -- is atomic under a single write guard.
#[derive(Debug, Default)]
struct State {
    directory: PeerDirectory,
    holding: HoldingTable,
    relay: RelayTable,
}

/// The rendezvous/relay service container.
///
/// One instance is one service: all peer, interest, holding and relay state
/// is scoped to it, and dropping it drops that state. Nothing here persists.
#[derive(Debug)]
pub struct Patchbay {
    state: RwLock<State>,
    events: broadcast::Sender<Event>,
    next_conn: AtomicU64,
}

impl Default for Patchbay {
    fn default() -> Self {
        Self::new()
    }
}

impl Patchbay {
    /// Create a fresh service instance with empty tables.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: RwLock::new(State::default()),
            events,
            next_conn: AtomicU64::new(1),
        }
    }

    /// Subscribe to lifecycle events from this instance.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Allocate a connection id. Ids are unique per instance and never
    /// reused.
    pub fn next_conn_id(&self) -> ConnId {
        ConnId::new(self.next_conn.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn emit(&self, event: Event) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    // -------------------------------------------------------------------
    // Introduction endpoint
    // -------------------------------------------------------------------

    /// A peer connected on the introduction endpoint: register it and
    /// announce the registration.
    pub async fn attach_peer(&self, user: UserName, link: Link) {
        self.state.write().await.directory.register(user.clone(), link);
        self.emit(Event::Registered { user });
    }

    /// A frame arrived from a registered peer: decode and dispatch it.
    ///
    /// Heartbeats only prove liveness. Join mutates interests and re-runs
    /// matching; Leave only mutates interests. An undecodable frame raises
    /// [`Event::DecodeFailure`] and changes nothing; an unknown kind (and a
    /// client echoing `Introduction` back) is a forward-compatible no-op.
    pub async fn peer_frame(&self, user: &UserName, data: &[u8]) {
        match Message::decode(data) {
            Ok(Message::Heartbeat) => trace!(%user, "heartbeat"),
            Ok(Message::Join { documents }) => {
                self.state.write().await.directory.apply_join(user, documents);
            }
            Ok(Message::Leave { documents }) => {
                self.state.write().await.directory.apply_leave(user, &documents);
            }
            Ok(Message::Introduction { .. }) => {
                trace!(%user, "introduction from client ignored");
            }
            Err(WireError::UnknownKind(kind)) => {
                trace!(%user, kind, "unknown message kind ignored");
            }
            Err(reason) => {
                debug!(%user, %reason, "frame failed to decode");
                self.emit(Event::DecodeFailure {
                    user: user.clone(),
                    data: data.to_vec(),
                    reason,
                });
            }
        }
    }

    /// A peer's introduction connection closed: remove it from the directory
    /// and delete its interests, unless a reconnect already replaced it.
    pub async fn detach_peer(&self, user: &UserName, conn: ConnId) {
        self.state.write().await.directory.unregister(user, conn);
    }

    // -------------------------------------------------------------------
    // Connection endpoint
    // -------------------------------------------------------------------

    /// A connection request arrived: complete a waiting match or park it.
    ///
    /// On a match, the counterpart's buffered frames are flushed to the
    /// requester in arrival order before the pairing is installed, all under
    /// one write guard -- the relay can only start after the backlog is
    /// queued, and the claimed entry is gone before anyone else can see it.
    pub async fn open_splice(&self, key: SpliceKey, link: Link) {
        let mut state = self.state.write().await;
        match state.holding.claim_reciprocal(&key) {
            Some((earlier, queued)) => {
                debug!(%key, buffered = queued.len(), "splice completed");
                for frame in queued {
                    if link.send(frame).is_err() {
                        debug!(%key, "buffered frame dropped, requester link closed");
                    }
                }
                state.relay.pair(&earlier, &link);
            }
            None => state.holding.park(key, link),
        }
    }

    /// A frame arrived on a connection-endpoint socket: forward it through
    /// the pipe if matched, buffer it if still holding, drop it otherwise.
    pub async fn splice_frame(&self, key: &SpliceKey, conn: ConnId, frame: Vec<u8>) {
        let mut state = self.state.write().await;
        if let Some(peer) = state.relay.peer(conn) {
            if peer.send(frame).is_err() {
                debug!(%key, "relayed frame dropped, peer link closed");
            }
        } else if !state.holding.buffer(key, conn, frame) {
            trace!(%key, %conn, "frame for inactive splice dropped");
        }
    }

    /// A connection-endpoint socket closed: discard its held entry, or tear
    /// down its pipe and close the counterpart so nothing stays half-open.
    pub async fn close_splice(&self, key: &SpliceKey, conn: ConnId) {
        let mut state = self.state.write().await;
        state.holding.release(key, conn);
        if let Some(peer) = state.relay.unpair(conn) {
            peer.shutdown();
        }
    }

    // -------------------------------------------------------------------
    // Instance lifecycle
    // -------------------------------------------------------------------

    /// Reset every table. For in-process restarts (tests): state from a
    /// previous run must not produce stale matches in the next one.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.directory.clear();
        state.holding.clear();
        state.relay.clear();
    }

    /// Number of registered peers.
    pub async fn peer_count(&self) -> usize {
        self.state.read().await.directory.peer_count()
    }

    /// Number of connection requests waiting for a counterpart.
    pub async fn holding_count(&self) -> usize {
        self.state.read().await.holding.len()
    }

    /// Number of piped connections (two per active pipe).
    pub async fn piped_count(&self) -> usize {
        self.state.read().await.relay.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DocumentId;
    use crate::protocol::Message;

    fn join_frame(ids: &[&str]) -> Vec<u8> {
        Message::Join {
            documents: ids.iter().map(|id| DocumentId::from(*id)).collect(),
        }
        .encode()
        .unwrap()
    }

    #[tokio::test]
    async fn test_decode_failure_raises_event_and_keeps_state() {
        let hub = Patchbay::new();
        let mut events = hub.subscribe();

        let (link, _rx) = Link::channel(hub.next_conn_id());
        hub.attach_peer("alice".into(), link).await;
        let _ = events.try_recv(); // Registered

        // Join with a truncated id list.
        let mut bad = join_frame(&["doc1"]);
        bad.truncate(bad.len() - 1);
        hub.peer_frame(&"alice".into(), &bad).await;

        match events.try_recv().unwrap() {
            Event::DecodeFailure { user, data, reason } => {
                assert_eq!(user, "alice".into());
                assert_eq!(data, bad);
                assert!(matches!(reason, WireError::TooShort { .. }));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        // The peer is still registered and can still join.
        assert_eq!(hub.peer_count().await, 1);
        hub.peer_frame(&"alice".into(), &join_frame(&["doc1"])).await;
    }

    #[tokio::test]
    async fn test_heartbeat_and_unknown_kind_are_silent() {
        let hub = Patchbay::new();
        let mut events = hub.subscribe();

        let (link, _rx) = Link::channel(hub.next_conn_id());
        hub.attach_peer("alice".into(), link).await;
        let _ = events.try_recv(); // Registered

        hub.peer_frame(&"alice".into(), &Message::Heartbeat.encode().unwrap())
            .await;
        hub.peer_frame(&"alice".into(), &[0x42]).await; // unknown kind

        assert!(events.try_recv().is_err());
        assert_eq!(hub.peer_count().await, 1);
    }

    #[tokio::test]
    async fn test_clear_resets_all_tables() {
        let hub = Patchbay::new();

        let (intro, _intro_rx) = Link::channel(hub.next_conn_id());
        hub.attach_peer("alice".into(), intro).await;

        let (conn, _conn_rx) = Link::channel(hub.next_conn_id());
        hub.open_splice(SpliceKey::new("alice", "bob", "doc1"), conn).await;

        assert_eq!(hub.peer_count().await, 1);
        assert_eq!(hub.holding_count().await, 1);

        hub.clear().await;

        assert_eq!(hub.peer_count().await, 0);
        assert_eq!(hub.holding_count().await, 0);
        assert_eq!(hub.piped_count().await, 0);
    }
}
