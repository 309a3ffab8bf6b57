//! Socket relay: pairings between spliced connections.
//!
//! Once two connection requests have matched, each side's frames are
//! forwarded verbatim to the other until either side closes. The relay never
//! looks inside a frame; whatever protocol the peers speak after the splice
//! passes through untouched.

use std::collections::HashMap;

use tracing::trace;

use crate::transport::{ConnId, Link};

/// Active pipe pairings. Each piped connection maps to its counterpart's
/// link, in both directions.
#[derive(Debug, Default)]
pub struct RelayTable {
    pipes: HashMap<ConnId, Link>,
}

impl RelayTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the two-way pairing between matched connections.
    pub fn pair(&mut self, a: &Link, b: &Link) {
        trace!(a = %a.id(), b = %b.id(), "relay paired");
        self.pipes.insert(a.id(), b.clone());
        self.pipes.insert(b.id(), a.clone());
    }

    /// The counterpart of `conn`, if `conn` is piped.
    pub fn peer(&self, conn: ConnId) -> Option<&Link> {
        self.pipes.get(&conn)
    }

    /// Whether `conn` is currently piped.
    pub fn is_piped(&self, conn: ConnId) -> bool {
        self.pipes.contains_key(&conn)
    }

    /// Tear down the pairing for `conn`, returning the counterpart's link so
    /// the caller can close it: a pipe never stays half-open.
    pub fn unpair(&mut self, conn: ConnId) -> Option<Link> {
        let peer = self.pipes.remove(&conn)?;
        self.pipes.remove(&peer.id());
        trace!(closed = %conn, peer = %peer.id(), "relay unpaired");
        Some(peer)
    }

    /// Number of piped connections (two per active pipe).
    pub fn len(&self) -> usize {
        self.pipes.len()
    }

    /// Whether no pipe is active.
    pub fn is_empty(&self) -> bool {
        self.pipes.is_empty()
    }

    /// Drop every pairing.
    pub fn clear(&mut self) {
        self.pipes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(id: u64) -> Link {
        Link::channel(ConnId::new(id)).0
    }

    #[test]
    fn test_pair_routes_both_directions() {
        let mut relay = RelayTable::new();
        let (a, b) = (link(1), link(2));
        relay.pair(&a, &b);

        assert_eq!(relay.peer(ConnId::new(1)).unwrap().id(), ConnId::new(2));
        assert_eq!(relay.peer(ConnId::new(2)).unwrap().id(), ConnId::new(1));
    }

    #[test]
    fn test_unpair_removes_both_directions() {
        let mut relay = RelayTable::new();
        let (a, b) = (link(1), link(2));
        relay.pair(&a, &b);

        let peer = relay.unpair(ConnId::new(1)).unwrap();
        assert_eq!(peer.id(), ConnId::new(2));
        assert!(relay.is_empty());

        // The counterpart closing afterwards finds nothing left to do.
        assert!(relay.unpair(ConnId::new(2)).is_none());
    }

    #[test]
    fn test_unknown_connection_is_not_piped() {
        let relay = RelayTable::new();
        assert!(!relay.is_piped(ConnId::new(7)));
        assert!(relay.peer(ConnId::new(7)).is_none());
    }
}
