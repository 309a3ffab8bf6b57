//! # Patchbay
//!
//! A rendezvous and relay service for peer-to-peer document synchronization.
//!
//! Peers connect to the **introduction endpoint** and announce interest in one
//! or more document ids. Whenever two connected peers share an interest, each
//! receives an [`Introduction`](protocol::Message::Introduction) naming the
//! other and the common document ids. Introduced peers may then connect to the
//! **connection endpoint**; Patchbay holds the first request until its
//! counterpart arrives, buffering any early traffic, and then splices the two
//! connections into a single bidirectional pipe carrying the peers' own
//! protocol untouched.
//!
//! Everything is single-process and in-memory: no authentication, no
//! persistence, no delivery guarantees beyond best-effort in-process
//! buffering.
//!
//! ## Modules
//!
//! - [`core`]: Identifier types and fixed constants (always included)
//! - [`protocol`]: Binary codec for the introduction-side message union
//! - [`transport`]: The connection abstraction the core logic depends on
//! - [`service`]: Peer directory, matching engine, rendezvous and relay
//! - [`server`]: WebSocket endpoints (requires the `server` feature)
//!
//! ## Example Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use patchbay::server::{RelayServer, ServerConfig};
//! use patchbay::service::{Event, Patchbay};
//!
//! let hub = Arc::new(Patchbay::new());
//! let mut events = hub.subscribe();
//!
//! let server = RelayServer::bind(ServerConfig::default(), hub).await?;
//! println!("listening on {}", server.local_addr());
//!
//! while let Ok(event) = events.recv().await {
//!     if let Event::Registered { user } = event {
//!         println!("peer registered: {user}");
//!     }
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Wire codec for the introduction protocol
pub mod protocol;

// Transport boundary: the link abstraction
pub mod transport;

// Matching / rendezvous / relay state machines
pub mod service;

// WebSocket server surface (feature-gated)
#[cfg(feature = "server")]
#[cfg_attr(docsrs, doc(cfg(feature = "server")))]
pub mod server;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::{DocumentId, UserName};
    pub use crate::protocol::{Message, WireError};
    pub use crate::service::{Event, Patchbay};
    pub use crate::transport::{ConnId, Link, LinkClosed};

    #[cfg(feature = "server")]
    pub use crate::server::{RelayServer, ServerConfig, ServerError};
}

// Re-export commonly used items at crate root
pub use crate::core::{DocumentId, UserName};
pub use protocol::Message;
pub use service::{Event, Patchbay};

#[cfg(feature = "server")]
pub use server::{RelayServer, ServerConfig};
