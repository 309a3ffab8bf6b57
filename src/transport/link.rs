//! Per-connection link handle.

use std::fmt;

use thiserror::Error;
use tokio::sync::mpsc;

/// Stable identifier for one transport connection.
///
/// Allocated by the service, never reused within a process. Cleanup paths use
/// it to tell whether the table entry they are about to remove still belongs
/// to the connection that is closing, or to a replacement that arrived since.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(u64);

impl ConnId {
    /// Create a connection id from a raw counter value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// The raw counter value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Outbound directive for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCmd {
    /// Send one frame verbatim.
    Frame(Vec<u8>),

    /// Close the connection after in-flight frames are flushed.
    Shutdown,
}

/// Send half of the transport boundary for one live connection.
///
/// Sends are non-blocking pushes into an unbounded channel (unbounded so the
/// core never blocks while holding its state lock). A send to a connection
/// whose writer task has gone away returns [`LinkClosed`]; callers discard
/// the frame and log, nothing propagates.
#[derive(Debug, Clone)]
pub struct Link {
    id: ConnId,
    tx: mpsc::UnboundedSender<LinkCmd>,
}

impl Link {
    /// Wrap an existing command channel.
    pub fn new(id: ConnId, tx: mpsc::UnboundedSender<LinkCmd>) -> Self {
        Self { id, tx }
    }

    /// Create a link together with the receive half its writer task drains.
    pub fn channel(id: ConnId) -> (Self, mpsc::UnboundedReceiver<LinkCmd>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { id, tx }, rx)
    }

    /// The connection id this link belongs to.
    pub fn id(&self) -> ConnId {
        self.id
    }

    /// Whether the connection's writer task is still draining commands.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Queue one frame for sending.
    pub fn send(&self, frame: Vec<u8>) -> Result<(), LinkClosed> {
        self.tx.send(LinkCmd::Frame(frame)).map_err(|_| LinkClosed)
    }

    /// Ask the connection to close. Best-effort: a link that is already
    /// closed is already what we wanted.
    pub fn shutdown(&self) {
        let _ = self.tx.send(LinkCmd::Shutdown);
    }
}

/// The connection behind a link is gone; the frame was discarded.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("link closed")]
pub struct LinkClosed;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_reaches_receiver_in_order() {
        let (link, mut rx) = Link::channel(ConnId::new(1));
        link.send(vec![1]).unwrap();
        link.send(vec![2]).unwrap();

        assert_eq!(rx.try_recv().unwrap(), LinkCmd::Frame(vec![1]));
        assert_eq!(rx.try_recv().unwrap(), LinkCmd::Frame(vec![2]));
    }

    #[test]
    fn test_send_after_receiver_dropped() {
        let (link, rx) = Link::channel(ConnId::new(2));
        assert!(link.is_open());

        drop(rx);
        assert!(!link.is_open());
        assert_eq!(link.send(vec![0]), Err(LinkClosed));
    }

    #[test]
    fn test_shutdown_is_a_command() {
        let (link, mut rx) = Link::channel(ConnId::new(3));
        link.shutdown();
        assert_eq!(rx.try_recv().unwrap(), LinkCmd::Shutdown);

        // Shutdown on a dead link is a no-op, not a panic.
        drop(rx);
        link.shutdown();
    }
}
