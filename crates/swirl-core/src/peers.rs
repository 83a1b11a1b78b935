//! Cluster membership: peers and versioned peer sets

use crate::canonical::normalize_peers;
use crate::crypto::{derive_peer_id, domain_hash, DOMAIN_PEERSET};
use crate::error::{Error, Result};
use crate::types::*;
use serde::{Deserialize, Serialize};

/// A cluster participant
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Peer {
    /// Identifier derived from `pub_key`
    pub id: PeerId,
    /// Ed25519 public key
    pub pub_key: Bytes32,
    /// Transport address
    pub net_addr: String,
    /// Human readable name
    pub moniker: String,
}

impl Peer {
    pub fn new(pub_key: Bytes32, net_addr: impl Into<String>, moniker: impl Into<String>) -> Self {
        Self {
            id: derive_peer_id(&pub_key),
            pub_key,
            net_addr: net_addr.into(),
            moniker: moniker.into(),
        }
    }

    /// Check that `id` matches the public key
    pub fn validate(&self) -> Result<()> {
        if derive_peer_id(&self.pub_key) != self.id {
            return Err(Error::InvalidPublicKey(format!(
                "peer id {} does not match public key",
                self.id
            )));
        }
        Ok(())
    }
}

/// Immutable snapshot of cluster membership.
///
/// Peers are kept sorted by id so two sets with the same members hash identically.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PeerSet {
    peers: Vec<Peer>,
}

impl PeerSet {
    pub fn new(mut peers: Vec<Peer>) -> Self {
        normalize_peers(&mut peers);
        Self { peers }
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    pub fn into_peers(self) -> Vec<Peer> {
        self.peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.peers.iter().map(|p| p.id)
    }

    pub fn contains(&self, id: PeerId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: PeerId) -> Option<&Peer> {
        self.peers
            .binary_search_by_key(&id, |p| p.id)
            .ok()
            .map(|i| &self.peers[i])
    }

    pub fn get_by_pub_key(&self, pub_key: &Bytes32) -> Option<&Peer> {
        self.get(derive_peer_id(pub_key))
            .filter(|p| &p.pub_key == pub_key)
    }

    /// Number of members strictly greater than two thirds: `2n/3 + 1`
    pub fn super_majority(&self) -> usize {
        2 * self.peers.len() / 3 + 1
    }

    /// Minimum number of members guaranteed to include one honest member: `ceil(n/3)`
    pub fn trust_count(&self) -> usize {
        (self.peers.len() + 2) / 3
    }

    /// New set with `peer` added
    pub fn with_new_peer(&self, peer: Peer) -> Result<Self> {
        peer.validate()?;
        if self.contains(peer.id) {
            return Err(Error::DuplicatePeer(peer.id.0));
        }
        let mut peers = self.peers.clone();
        peers.push(peer);
        Ok(Self::new(peers))
    }

    /// New set with `peer` removed
    pub fn with_removed_peer(&self, id: PeerId) -> Result<Self> {
        if !self.contains(id) {
            return Err(Error::UnknownPeer(id.0));
        }
        let peers = self.peers.iter().filter(|p| p.id != id).cloned().collect();
        Ok(Self::new(peers))
    }

    /// `H = BLAKE3("peerset" || canonical_bytes(peers))`
    pub fn hash(&self) -> Result<Bytes32> {
        domain_hash(DOMAIN_PEERSET, &self.peers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    fn peers(n: u8) -> Vec<Peer> {
        (0..n)
            .map(|i| {
                let key = KeyPair::from_seed(&[i + 1; 32]);
                Peer::new(key.public_key(), format!("addr{}", i), format!("node{}", i))
            })
            .collect()
    }

    #[test]
    fn test_thresholds() {
        let cases = [(1, 1, 1), (2, 2, 1), (3, 3, 1), (4, 3, 2), (5, 4, 2), (7, 5, 3)];
        for (n, sm, tc) in cases {
            let set = PeerSet::new(peers(n));
            assert_eq!(set.super_majority(), sm, "super majority of {}", n);
            assert_eq!(set.trust_count(), tc, "trust count of {}", n);
        }
    }

    #[test]
    fn test_order_independent_hash() {
        let mut p = peers(4);
        let a = PeerSet::new(p.clone());
        p.reverse();
        let b = PeerSet::new(p);
        assert_eq!(a, b);
        assert_eq!(a.hash().unwrap(), b.hash().unwrap());
    }

    #[test]
    fn test_add_remove() {
        let all = peers(4);
        let set = PeerSet::new(all[..3].to_vec());

        let bigger = set.with_new_peer(all[3].clone()).unwrap();
        assert_eq!(bigger.len(), 4);
        assert!(bigger.contains(all[3].id));
        // original untouched
        assert_eq!(set.len(), 3);

        assert!(matches!(
            bigger.with_new_peer(all[3].clone()),
            Err(Error::DuplicatePeer(_))
        ));

        let smaller = bigger.with_removed_peer(all[0].id).unwrap();
        assert_eq!(smaller.len(), 3);
        assert!(!smaller.contains(all[0].id));
        assert!(matches!(
            smaller.with_removed_peer(all[0].id),
            Err(Error::UnknownPeer(_))
        ));
    }

    #[test]
    fn test_forged_peer_rejected() {
        let mut forged = peers(1).remove(0);
        forged.id = PeerId(forged.id.0.wrapping_add(1));
        assert!(PeerSet::default().with_new_peer(forged).is_err());
    }

    #[test]
    fn test_lookup_by_pub_key() {
        let p = peers(3);
        let set = PeerSet::new(p.clone());
        assert_eq!(set.get_by_pub_key(&p[1].pub_key), Some(&p[1]));
        assert!(set.get_by_pub_key(&[0; 32]).is_none());
    }
}
