//! Peer directory, interest tracking, and the introduction matching engine.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, trace};

use crate::core::{DocumentId, UserName};
use crate::protocol::Message;
use crate::transport::{ConnId, Link};

/// Connected peers and their declared interests.
///
/// Exclusively owns the name-to-link mapping. A name that reconnects replaces
/// its directory entry; the stale connection's close cannot evict the
/// replacement because removal is guarded by connection id.
#[derive(Debug, Default)]
pub struct PeerDirectory {
    peers: HashMap<UserName, Link>,
    interests: HashMap<UserName, BTreeSet<DocumentId>>,
}

impl PeerDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or overwrite the entry for `user`. Initializes no interests; a
    /// replaced connection's interests do not carry over (replacement never
    /// merges).
    pub fn register(&mut self, user: UserName, link: Link) {
        let replaced = self.peers.insert(user.clone(), link).is_some();
        if replaced {
            self.interests.remove(&user);
        }
        debug!(%user, replaced, "peer registered");
    }

    /// Remove `user` and delete its interest set, provided the entry still
    /// belongs to connection `conn`. Returns whether anything was removed.
    pub fn unregister(&mut self, user: &UserName, conn: ConnId) -> bool {
        match self.peers.get(user) {
            Some(link) if link.id() == conn => {
                self.peers.remove(user);
                self.interests.remove(user);
                debug!(%user, "peer unregistered");
                true
            }
            _ => false,
        }
    }

    /// Whether `user` currently has a live directory entry.
    pub fn is_registered(&self, user: &UserName) -> bool {
        self.peers.contains_key(user)
    }

    /// Number of registered peers.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// The documents `user` is currently interested in, if any.
    pub fn interests_of(&self, user: &UserName) -> Option<&BTreeSet<DocumentId>> {
        self.interests.get(user)
    }

    /// Union `ids` into `user`'s interest set, then re-run matching: for
    /// every other registered peer with a non-empty intersection, send an
    /// `Introduction` to both sides.
    ///
    /// Matching is re-evaluated in full on every join, so a repeated join
    /// re-sends introductions for overlaps already announced. Consumers are
    /// duplicate-tolerant by contract.
    pub fn apply_join(&mut self, user: &UserName, ids: Vec<DocumentId>) {
        let Some(my_link) = self.peers.get(user) else {
            debug!(%user, "join from unregistered peer ignored");
            return;
        };
        let my_link = my_link.clone();

        let mine = self.interests.entry(user.clone()).or_default();
        mine.extend(ids);
        let mine = mine.clone();
        trace!(%user, interests = mine.len(), "interests updated");

        for (other, other_link) in &self.peers {
            if other == user {
                continue;
            }
            let Some(theirs) = self.interests.get(other) else {
                continue;
            };
            let common: Vec<DocumentId> = mine.intersection(theirs).cloned().collect();
            if common.is_empty() {
                continue;
            }
            debug!(%user, peer = %other, overlap = common.len(), "interests overlap");
            send_introduction(&my_link, other, &common);
            send_introduction(other_link, user, &common);
        }
    }

    /// Remove exactly the listed ids from `user`'s interest set, leaving the
    /// rest untouched. Never triggers matching: a peer narrowing interest
    /// does not need a fresh introduction.
    pub fn apply_leave(&mut self, user: &UserName, ids: &[DocumentId]) {
        if let Some(set) = self.interests.get_mut(user) {
            for id in ids {
                set.remove(id);
            }
            trace!(%user, interests = set.len(), "interests narrowed");
        }
    }

    /// Drop every peer and interest set.
    pub fn clear(&mut self) {
        self.peers.clear();
        self.interests.clear();
    }
}

/// Queue an `Introduction` naming `peer` onto `link`. A closed link or an
/// unencodable id list costs the recipient this one notice, nothing more.
fn send_introduction(link: &Link, peer: &UserName, common: &[DocumentId]) {
    let message = Message::Introduction {
        user: peer.clone(),
        documents: common.to_vec(),
    };
    match message.encode() {
        Ok(frame) => {
            if link.send(frame).is_err() {
                debug!(%peer, conn = %link.id(), "introduction dropped, link closed");
            }
        }
        Err(err) => debug!(%peer, %err, "introduction dropped, not encodable"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LinkCmd;
    use tokio::sync::mpsc;

    fn docs(ids: &[&str]) -> Vec<DocumentId> {
        ids.iter().map(|id| DocumentId::from(*id)).collect()
    }

    fn peer(id: u64) -> (Link, mpsc::UnboundedReceiver<LinkCmd>) {
        Link::channel(ConnId::new(id))
    }

    fn drain_introductions(rx: &mut mpsc::UnboundedReceiver<LinkCmd>) -> Vec<(UserName, Vec<DocumentId>)> {
        let mut out = Vec::new();
        while let Ok(cmd) = rx.try_recv() {
            let LinkCmd::Frame(frame) = cmd else { continue };
            if let Ok(Message::Introduction { user, documents }) = Message::decode(&frame) {
                out.push((user, documents));
            }
        }
        out
    }

    #[test]
    fn test_overlap_introduces_both_sides() {
        let mut dir = PeerDirectory::new();
        let (link_a, mut rx_a) = peer(1);
        let (link_b, mut rx_b) = peer(2);
        dir.register("alice".into(), link_a);
        dir.register("bob".into(), link_b);

        dir.apply_join(&"alice".into(), docs(&["doc1"]));
        assert!(drain_introductions(&mut rx_a).is_empty());

        dir.apply_join(&"bob".into(), docs(&["doc1", "doc2"]));

        let to_alice = drain_introductions(&mut rx_a);
        assert_eq!(to_alice, vec![("bob".into(), docs(&["doc1"]))]);
        let to_bob = drain_introductions(&mut rx_b);
        assert_eq!(to_bob, vec![("alice".into(), docs(&["doc1"]))]);
    }

    #[test]
    fn test_join_is_deduplicating() {
        let mut dir = PeerDirectory::new();
        let (link, _rx) = peer(1);
        dir.register("alice".into(), link);

        dir.apply_join(&"alice".into(), docs(&["doc1", "doc1"]));
        dir.apply_join(&"alice".into(), docs(&["doc1"]));

        let set = dir.interests_of(&"alice".into()).unwrap();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_rejoin_reintroduces() {
        let mut dir = PeerDirectory::new();
        let (link_a, mut rx_a) = peer(1);
        let (link_b, mut rx_b) = peer(2);
        dir.register("alice".into(), link_a);
        dir.register("bob".into(), link_b);

        dir.apply_join(&"alice".into(), docs(&["doc1"]));
        dir.apply_join(&"bob".into(), docs(&["doc1"]));
        dir.apply_join(&"bob".into(), docs(&["doc1"]));

        // Bob's redundant join re-sends the same introduction to both sides.
        assert_eq!(drain_introductions(&mut rx_a).len(), 2);
        assert_eq!(drain_introductions(&mut rx_b).len(), 2);
    }

    #[test]
    fn test_leave_removes_exactly_listed_and_stays_quiet() {
        let mut dir = PeerDirectory::new();
        let (link_a, mut rx_a) = peer(1);
        let (link_b, mut rx_b) = peer(2);
        dir.register("alice".into(), link_a);
        dir.register("bob".into(), link_b);
        dir.apply_join(&"alice".into(), docs(&["doc1", "doc2", "doc3"]));
        dir.apply_join(&"bob".into(), docs(&["doc1"]));
        drain_introductions(&mut rx_a);
        drain_introductions(&mut rx_b);

        dir.apply_leave(&"alice".into(), &docs(&["doc1", "doc3"]));

        let set = dir.interests_of(&"alice".into()).unwrap();
        assert_eq!(set.iter().cloned().collect::<Vec<_>>(), docs(&["doc2"]));
        assert!(drain_introductions(&mut rx_a).is_empty());
        assert!(drain_introductions(&mut rx_b).is_empty());
    }

    #[test]
    fn test_unregister_deletes_interests_and_stops_matching() {
        let mut dir = PeerDirectory::new();
        let (link_a, _rx_a) = peer(1);
        let (link_b, mut rx_b) = peer(2);
        dir.register("alice".into(), link_a);
        dir.register("bob".into(), link_b);
        dir.apply_join(&"alice".into(), docs(&["doc1"]));

        assert!(dir.unregister(&"alice".into(), ConnId::new(1)));
        assert!(dir.interests_of(&"alice".into()).is_none());

        dir.apply_join(&"bob".into(), docs(&["doc1"]));
        assert!(drain_introductions(&mut rx_b).is_empty());
    }

    #[test]
    fn test_stale_unregister_cannot_evict_replacement() {
        let mut dir = PeerDirectory::new();
        let (old_link, _old_rx) = peer(1);
        let (new_link, _new_rx) = peer(2);
        dir.register("alice".into(), old_link);
        dir.register("alice".into(), new_link);

        // The replaced connection's close arrives late.
        assert!(!dir.unregister(&"alice".into(), ConnId::new(1)));
        assert!(dir.is_registered(&"alice".into()));

        assert!(dir.unregister(&"alice".into(), ConnId::new(2)));
        assert!(!dir.is_registered(&"alice".into()));
    }

    #[test]
    fn test_reconnect_starts_with_fresh_interests() {
        let mut dir = PeerDirectory::new();
        let (old_link, _old_rx) = peer(1);
        dir.register("alice".into(), old_link);
        dir.apply_join(&"alice".into(), docs(&["doc1"]));

        let (new_link, _new_rx) = peer(2);
        dir.register("alice".into(), new_link);

        assert!(dir.interests_of(&"alice".into()).is_none());
    }

    #[test]
    fn test_join_without_registration_is_ignored() {
        let mut dir = PeerDirectory::new();
        dir.apply_join(&"ghost".into(), docs(&["doc1"]));
        assert!(dir.interests_of(&"ghost".into()).is_none());
    }
}
