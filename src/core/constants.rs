//! Fixed protocol and service constants.
//!
//! These values are part of the wire contract and MUST NOT be changed.

// =============================================================================
// MESSAGE KINDS
// =============================================================================

/// Liveness ping, no payload.
pub const KIND_HEARTBEAT: u8 = 0x00;

/// Announce interest in a list of document ids.
pub const KIND_JOIN: u8 = 0x01;

/// Withdraw interest in a list of document ids.
pub const KIND_LEAVE: u8 = 0x02;

/// Server-to-client notice of a peer with overlapping interests.
pub const KIND_INTRODUCTION: u8 = 0x03;

// =============================================================================
// WIRE LIMITS
// =============================================================================

/// Names and document ids are length-prefixed with a u16.
pub const MAX_STRING_LEN: usize = u16::MAX as usize;

/// Id lists are count-prefixed with a u16.
pub const MAX_LIST_LEN: usize = u16::MAX as usize;

// =============================================================================
// SERVICE DEFAULTS
// =============================================================================

/// Default listening port for the WebSocket endpoints.
pub const DEFAULT_PORT: u16 = 9632;

/// Capacity of the lifecycle event broadcast channel.
///
/// Slow subscribers that fall further behind than this lose events
/// (`broadcast::error::RecvError::Lagged`), never the service itself.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;
