//! Patchbay - Introduction Protocol
//!
//! Binary codec for the message union spoken on the introduction endpoint:
//! - `Heartbeat`: liveness ping, no payload
//! - `Join` / `Leave`: interest announcements carrying document id lists
//! - `Introduction`: server-to-client notice of an overlapping peer
//!
//! Traffic on the connection endpoint never passes through this codec; once
//! two connections are spliced the relay forwards raw frames untouched.

mod message;

pub use message::*;
