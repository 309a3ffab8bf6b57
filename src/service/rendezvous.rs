//! Connection rendezvous: the holding table.
//!
//! Each directed connection request is keyed by (requester, target,
//! document). A request whose reciprocal key is already parked completes the
//! match; otherwise it parks itself. States per unordered pair run
//! Idle -> Holding -> Piped -> Closed, and never backwards: once a pair has
//! been piped or closed, a later request for the same key starts a fresh
//! rendezvous from Idle.

use std::collections::HashMap;
use std::fmt;

use tracing::trace;

use crate::core::{DocumentId, UserName};
use crate::transport::{ConnId, Link};

/// Key for one directed connection request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpliceKey {
    /// The peer making the request.
    pub requester: UserName,
    /// The peer it wants to reach.
    pub target: UserName,
    /// The document both sides named.
    pub document: DocumentId,
}

impl SpliceKey {
    /// Build a key from its three parts.
    pub fn new(
        requester: impl Into<UserName>,
        target: impl Into<UserName>,
        document: impl Into<DocumentId>,
    ) -> Self {
        Self {
            requester: requester.into(),
            target: target.into(),
            document: document.into(),
        }
    }

    /// The key the counterpart request files under.
    pub fn reciprocal(&self) -> Self {
        Self {
            requester: self.target.clone(),
            target: self.requester.clone(),
            document: self.document.clone(),
        }
    }
}

impl fmt::Display for SpliceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}/{}", self.requester, self.target, self.document)
    }
}

/// One parked request: the requester's link and the frames it has sent while
/// waiting for the counterpart.
#[derive(Debug)]
struct HoldingEntry {
    link: Link,
    queue: Vec<Vec<u8>>,
}

/// Requests waiting for their reciprocal to arrive.
///
/// There is no timeout: an unmatched entry waits until its connection
/// closes, at which point [`release`](HoldingTable::release) discards it.
#[derive(Debug, Default)]
pub struct HoldingTable {
    entries: HashMap<SpliceKey, HoldingEntry>,
}

impl HoldingTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Complete the match for `key` if its reciprocal is parked: the entry is
    /// removed and its link and buffered frames (in arrival order) returned.
    /// Removal and detection are one operation, so the same entry can never
    /// satisfy two matches.
    pub fn claim_reciprocal(&mut self, key: &SpliceKey) -> Option<(Link, Vec<Vec<u8>>)> {
        let entry = self.entries.remove(&key.reciprocal())?;
        trace!(%key, buffered = entry.queue.len(), "reciprocal request claimed");
        Some((entry.link, entry.queue))
    }

    /// Park a request under `key` with an empty buffer, overwriting any
    /// previous entry for the same key.
    pub fn park(&mut self, key: SpliceKey, link: Link) {
        trace!(%key, conn = %link.id(), "request parked");
        self.entries.insert(
            key,
            HoldingEntry {
                link,
                queue: Vec::new(),
            },
        );
    }

    /// Append a frame to the buffer of the entry at `key`, provided it still
    /// belongs to connection `conn`. Returns whether the frame was buffered.
    pub fn buffer(&mut self, key: &SpliceKey, conn: ConnId, frame: Vec<u8>) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) if entry.link.id() == conn => {
                entry.queue.push(frame);
                true
            }
            _ => false,
        }
    }

    /// Discard the entry at `key` if it still belongs to connection `conn`.
    /// Returns whether an entry was removed.
    pub fn release(&mut self, key: &SpliceKey, conn: ConnId) -> bool {
        match self.entries.get(key) {
            Some(entry) if entry.link.id() == conn => {
                self.entries.remove(key);
                trace!(%key, "held request released");
                true
            }
            _ => false,
        }
    }

    /// Number of parked requests.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no request is parked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every parked request.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(id: u64) -> Link {
        Link::channel(ConnId::new(id)).0
    }

    fn key_ab() -> SpliceKey {
        SpliceKey::new("alice", "bob", "doc1")
    }

    #[test]
    fn test_reciprocal_swaps_sides_only() {
        let key = key_ab();
        let rec = key.reciprocal();
        assert_eq!(rec, SpliceKey::new("bob", "alice", "doc1"));
        assert_eq!(rec.reciprocal(), key);
    }

    #[test]
    fn test_claim_removes_the_parked_entry() {
        let mut table = HoldingTable::new();
        table.park(key_ab(), link(1));

        let claimed = table.claim_reciprocal(&key_ab().reciprocal());
        assert!(claimed.is_some());
        assert!(table.is_empty());

        // A second claim finds nothing: no double-matching.
        assert!(table.claim_reciprocal(&key_ab().reciprocal()).is_none());
    }

    #[test]
    fn test_claim_requires_the_reciprocal_key() {
        let mut table = HoldingTable::new();
        table.park(key_ab(), link(1));

        // Same key as parked, not the reciprocal: no match.
        assert!(table.claim_reciprocal(&key_ab()).is_none());
        // Different document: no match.
        let other_doc = SpliceKey::new("bob", "alice", "doc2");
        assert!(table.claim_reciprocal(&other_doc).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_buffer_preserves_arrival_order() {
        let mut table = HoldingTable::new();
        table.park(key_ab(), link(1));

        assert!(table.buffer(&key_ab(), ConnId::new(1), vec![1]));
        assert!(table.buffer(&key_ab(), ConnId::new(1), vec![2]));
        assert!(table.buffer(&key_ab(), ConnId::new(1), vec![3]));

        let (_link, queue) = table.claim_reciprocal(&key_ab().reciprocal()).unwrap();
        assert_eq!(queue, vec![vec![1], vec![2], vec![3]]);
    }

    #[test]
    fn test_buffer_ignores_stale_connection() {
        let mut table = HoldingTable::new();
        table.park(key_ab(), link(1));
        table.park(key_ab(), link(2)); // overwrite by a newer request

        assert!(!table.buffer(&key_ab(), ConnId::new(1), vec![9]));
        assert!(table.buffer(&key_ab(), ConnId::new(2), vec![1]));
    }

    #[test]
    fn test_release_respects_ownership() {
        let mut table = HoldingTable::new();
        table.park(key_ab(), link(1));
        table.park(key_ab(), link(2));

        // The overwritten connection closing must not evict its successor.
        assert!(!table.release(&key_ab(), ConnId::new(1)));
        assert_eq!(table.len(), 1);

        assert!(table.release(&key_ab(), ConnId::new(2)));
        assert!(table.is_empty());
    }
}
