//! Canonical encoding for hashed and signed objects
//!
//! All hashed/signed objects use postcard serialization with strict constraints:
//! - Maps are `BTreeMap` so iteration order is deterministic
//! - Field order is Rust struct field order
//! - Peer lists are sorted by `PeerId` and deduped

use crate::error::Result;
use crate::peers::Peer;
use serde::Serialize;

/// Serialize a value to canonical bytes using postcard.
///
/// This is the normative encoding for all hashing and signing operations.
pub fn canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(postcard::to_allocvec(value)?)
}

/// Sort peers by id and drop duplicate ids (first occurrence wins).
pub fn normalize_peers(peers: &mut Vec<Peer>) {
    peers.sort_by_key(|p| p.id);
    peers.dedup_by_key(|p| p.id);
}

/// Check that a peer list is strictly sorted by id.
pub fn peers_sorted(peers: &[Peer]) -> bool {
    peers.windows(2).all(|w| w[0].id < w[1].id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    #[test]
    fn test_canonical_bytes_deterministic() {
        let key = KeyPair::from_seed(&[7; 32]);
        let peer = Peer::new(key.public_key(), "127.0.0.1:1337", "alice");

        let bytes1 = canonical_bytes(&peer).unwrap();
        let bytes2 = canonical_bytes(&peer).unwrap();
        assert_eq!(bytes1, bytes2);
    }

    #[test]
    fn test_normalize_peers() {
        let a = Peer::new(KeyPair::from_seed(&[1; 32]).public_key(), "a", "a");
        let b = Peer::new(KeyPair::from_seed(&[2; 32]).public_key(), "b", "b");

        let mut peers = vec![b.clone(), a.clone(), b.clone()];
        assert!(!peers_sorted(&peers));

        normalize_peers(&mut peers);
        assert_eq!(peers.len(), 2);
        assert!(peers_sorted(&peers));
    }
}
