//! Frames: deterministic snapshots of the events received in one round

use crate::crypto::{domain_hash, DOMAIN_FRAME};
use crate::error::Result;
use crate::event::Event;
use crate::peers::{Peer, PeerSet};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An event together with the consensus metadata needed to resume from it
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FrameEvent {
    pub event: Event,
    pub round: u64,
    pub witness: bool,
    /// Creator -> highest index of that creator's events this event descends from
    pub last_ancestors: BTreeMap<PeerId, u64>,
    pub round_received: Option<u64>,
    pub consensus_timestamp: Option<u64>,
}

/// All events with a given round-received, plus the membership in effect
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Frame {
    /// Round received of `events`
    pub round: u64,
    /// Peer set effective at `round`
    pub peers: Vec<Peer>,
    /// Per creator, its last event received before `round`, sorted by creator
    pub roots: Vec<FrameEvent>,
    /// Events received in `round`, in consensus order
    pub events: Vec<FrameEvent>,
    /// Full peer set history: effective round -> peers
    pub peer_sets: BTreeMap<u64, Vec<Peer>>,
    /// Consensus timestamp of the last event
    pub timestamp: u64,
}

impl Frame {
    /// `H = BLAKE3("frame" || canonical_bytes(frame))`
    pub fn hash(&self) -> Result<Bytes32> {
        domain_hash(DOMAIN_FRAME, self)
    }

    pub fn peer_set(&self) -> PeerSet {
        PeerSet::new(self.peers.clone())
    }

    /// Whether `id` belongs to any peer set of the history
    pub fn mentions(&self, id: PeerId) -> bool {
        self.peer_sets
            .values()
            .any(|peers| peers.iter().any(|p| p.id == id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    fn frame(round: u64) -> Frame {
        let key = KeyPair::from_seed(&[5; 32]);
        let peer = Peer::new(key.public_key(), "127.0.0.1:1", "alice");
        let mut peer_sets = BTreeMap::new();
        peer_sets.insert(0, vec![peer.clone()]);
        Frame {
            round,
            peers: vec![peer],
            roots: vec![],
            events: vec![],
            peer_sets,
            timestamp: 0,
        }
    }

    #[test]
    fn test_frame_hash_covers_round() {
        assert_eq!(frame(1).hash().unwrap(), frame(1).hash().unwrap());
        assert_ne!(frame(1).hash().unwrap(), frame(2).hash().unwrap());
    }

    #[test]
    fn test_mentions() {
        let f = frame(1);
        assert!(f.mentions(f.peers[0].id));
        assert!(!f.mentions(PeerId(0)));
    }
}
