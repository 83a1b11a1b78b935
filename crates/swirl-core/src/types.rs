//! Identifier types for the swirl hashgraph
//!
//! All types here are designed for deterministic serialization via postcard.
//! Field order matters for canonical encoding.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 32-byte fixed-size array used for hashes and public keys.
pub type Bytes32 = [u8; 32];

/// Event identifier: BLAKE3("event" || canonical_bytes(EventBody))
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventHash(pub Bytes32);

impl EventHash {
    /// Short hex prefix used in logs
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Display for EventHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Peer identifier, derived from the peer's public key (see `crypto::derive_peer_id`)
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u32);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Highest event index known per creator.
///
/// A creator missing from the map means no event of that creator is known.
pub type KnownEvents = std::collections::BTreeMap<PeerId, u64>;
