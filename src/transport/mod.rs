//! Patchbay - Transport Boundary
//!
//! The core logic never touches a socket. Each connection is represented by a
//! [`Link`]: a stable connection id plus the send half of an unbounded channel
//! drained by that connection's writer task. Message arrival and close are
//! delivered *into* the core by whatever drives the connection (the WebSocket
//! reader loop in the `server` module, or a test harness), so the core depends
//! only on this abstraction.

mod link;

pub use link::*;
