//! Peer Directory
//!
//! The single source of truth for which peers are online. Every structural
//! change happens under the write lock, which is then downgraded into a
//! [`Roster`]. While a roster is alive no other peer can join or leave, so
//! the presence events announcing one change are all written before the
//! next change begins.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard};

use crate::error::RelayError;
use crate::peer::Peer;
use crate::protocol::PeerId;

type PeerMap = HashMap<PeerId, Arc<Peer>>;

#[derive(Debug, Default)]
pub struct PeerDirectory {
    peers: RwLock<PeerMap>,
}

/// The directory as it stood right after one membership change, held under
/// the read lock until dropped.
///
/// Writers are blocked for as long as a roster lives, so keep it only while
/// announcing the change it came from.
pub struct Roster<'a> {
    others: Vec<Arc<Peer>>,
    _guard: RwLockReadGuard<'a, PeerMap>,
}

impl Roster<'_> {
    /// Every listed peer except the one whose change produced this roster.
    pub fn others(&self) -> &[Arc<Peer>] {
        &self.others
    }
}

impl std::fmt::Debug for Roster<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Roster").field("others", &self.others).finish()
    }
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `peer` unless its id is already taken.
    ///
    /// On success the returned roster lists exactly who must learn about the
    /// newcomer, and no departure can be processed until it is dropped.
    pub async fn insert_if_absent(&self, peer: Arc<Peer>) -> Result<Roster<'_>, RelayError> {
        let mut peers = self.peers.write().await;
        if peers.contains_key(peer.id()) {
            return Err(RelayError::DuplicateIdentity(peer.id().clone()));
        }
        let others = peers.values().cloned().collect();
        peers.insert(peer.id().clone(), peer);
        Ok(Roster {
            others,
            _guard: peers.downgrade(),
        })
    }

    /// Remove `peer` if it is still the registered holder of its id.
    ///
    /// Returns the remaining peers when this call performed the removal and
    /// `None` when it was already gone, so repeated teardown is a no-op.
    pub async fn remove(&self, peer: &Arc<Peer>) -> Option<Roster<'_>> {
        let mut peers = self.peers.write().await;
        match peers.get(peer.id()) {
            Some(current) if Arc::ptr_eq(current, peer) => {
                peers.remove(peer.id());
                let others = peers.values().cloned().collect();
                Some(Roster {
                    others,
                    _guard: peers.downgrade(),
                })
            }
            _ => None,
        }
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Peer>> {
        self.peers.read().await.get(id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.peers.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.peers.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::test_support::test_peer;
    use std::time::Duration;

    #[tokio::test]
    async fn insert_returns_previous_roster() {
        let dir = PeerDirectory::new();
        let (alice, _rx_a) = test_peer("alice");
        let (bob, _rx_b) = test_peer("bob");

        {
            let roster = dir.insert_if_absent(alice.clone()).await.unwrap();
            assert!(roster.others().is_empty());
        }
        {
            let roster = dir.insert_if_absent(bob).await.unwrap();
            assert_eq!(roster.others().len(), 1);
            assert!(Arc::ptr_eq(&roster.others()[0], &alice));
        }

        assert!(dir.contains("alice").await);
        assert!(dir.contains("bob").await);
        assert_eq!(dir.len().await, 2);
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected_and_original_kept() {
        let dir = PeerDirectory::new();
        let (first, _rx1) = test_peer("alice");
        let (second, _rx2) = test_peer("alice");

        dir.insert_if_absent(first.clone()).await.unwrap();
        let err = dir.insert_if_absent(second).await.err().unwrap();
        assert_eq!(err, RelayError::DuplicateIdentity(PeerId::from("alice")));

        let current = dir.get("alice").await.unwrap();
        assert!(Arc::ptr_eq(&current, &first));
        assert_eq!(dir.len().await, 1);
    }

    #[tokio::test]
    async fn concurrent_same_id_admits_exactly_one() {
        let dir = Arc::new(PeerDirectory::new());
        let mut tasks = Vec::new();
        let mut receivers = Vec::new();
        for _ in 0..16 {
            let (peer, rx) = test_peer("alice");
            receivers.push(rx);
            let dir = dir.clone();
            tasks.push(tokio::spawn(async move {
                dir.insert_if_absent(peer).await.map(|_| ())
            }));
        }

        let mut admitted = 0;
        let mut rejected = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(()) => admitted += 1,
                Err(RelayError::DuplicateIdentity(_)) => rejected += 1,
                Err(e) => panic!("Unexpected error: {}", e),
            }
        }
        assert_eq!(admitted, 1);
        assert_eq!(rejected, 15);
        assert_eq!(dir.len().await, 1);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let dir = PeerDirectory::new();
        let (alice, _rx_a) = test_peer("alice");
        let (bob, _rx_b) = test_peer("bob");
        dir.insert_if_absent(alice.clone()).await.unwrap();
        dir.insert_if_absent(bob.clone()).await.unwrap();

        {
            let roster = dir.remove(&alice).await.unwrap();
            assert_eq!(roster.others().len(), 1);
            assert!(Arc::ptr_eq(&roster.others()[0], &bob));
        }

        assert!(dir.remove(&alice).await.is_none());
        assert!(!dir.contains("alice").await);
        assert_eq!(dir.len().await, 1);
    }

    #[tokio::test]
    async fn stale_remove_leaves_newer_holder_alone() {
        let dir = PeerDirectory::new();
        let (old, _rx_old) = test_peer("alice");
        let (new, _rx_new) = test_peer("alice");

        dir.insert_if_absent(old.clone()).await.unwrap();
        dir.remove(&old).await.unwrap();
        dir.insert_if_absent(new.clone()).await.unwrap();

        assert!(dir.remove(&old).await.is_none());
        let current = dir.get("alice").await.unwrap();
        assert!(Arc::ptr_eq(&current, &new));
    }

    #[tokio::test]
    async fn held_roster_blocks_membership_changes() {
        let dir = Arc::new(PeerDirectory::new());
        let (alice, _rx_a) = test_peer("alice");
        let (bob, _rx_b) = test_peer("bob");

        let roster = dir.insert_if_absent(alice.clone()).await.unwrap();

        let pending = {
            let dir = dir.clone();
            tokio::spawn(async move { dir.insert_if_absent(bob).await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!pending.is_finished());

        drop(roster);
        pending.await.unwrap().unwrap();
        assert_eq!(dir.len().await, 2);
    }
}
