//! Gossip events and their wire projection

use crate::block::BlockSignature;
use crate::crypto::{derive_peer_id, domain_hash, KeyPair, DOMAIN_EVENT};
use crate::error::{Error, Result};
use crate::transaction::InternalTransaction;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Immutable, signed content of an event
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventBody {
    /// Application transactions, opaque to the engine
    pub transactions: Vec<Vec<u8>>,
    /// Membership changes
    pub internal_transactions: Vec<InternalTransaction>,
    /// Creator's signatures over committed blocks
    pub block_signatures: Vec<BlockSignature>,
    /// Creator's previous event (None for its first event)
    pub self_parent: Option<EventHash>,
    /// Event of another creator received through gossip
    pub other_parent: Option<EventHash>,
    /// Creator's public key
    pub creator: Bytes32,
    /// Position in the creator's own history, starting at 0
    pub index: u64,
    /// Creator-claimed creation time (unix nanos)
    pub timestamp: u64,
}

/// Signed unit of gossip
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    pub body: EventBody,
    /// Ed25519 signature over `hash()`
    pub signature: Vec<u8>,
}

/// Current time in unix nanos
pub fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

impl Event {
    /// Create an unsigned event stamped with the current time
    pub fn new(
        transactions: Vec<Vec<u8>>,
        internal_transactions: Vec<InternalTransaction>,
        block_signatures: Vec<BlockSignature>,
        parents: (Option<EventHash>, Option<EventHash>),
        creator: Bytes32,
        index: u64,
    ) -> Self {
        Self {
            body: EventBody {
                transactions,
                internal_transactions,
                block_signatures,
                self_parent: parents.0,
                other_parent: parents.1,
                creator,
                index,
                timestamp: now_nanos(),
            },
            signature: Vec::new(),
        }
    }

    /// `H = BLAKE3("event" || canonical_bytes(body))`
    pub fn hash(&self) -> Result<EventHash> {
        Ok(EventHash(domain_hash(DOMAIN_EVENT, &self.body)?))
    }

    pub fn creator_id(&self) -> PeerId {
        derive_peer_id(&self.body.creator)
    }

    pub fn index(&self) -> u64 {
        self.body.index
    }

    pub fn self_parent(&self) -> Option<EventHash> {
        self.body.self_parent
    }

    pub fn other_parent(&self) -> Option<EventHash> {
        self.body.other_parent
    }

    /// Carries transactions that must reach consensus
    pub fn is_loaded(&self) -> bool {
        !self.body.transactions.is_empty() || !self.body.internal_transactions.is_empty()
    }

    /// Sign with the creator's key; fails if `key` is not the creator's
    pub fn sign(&mut self, key: &KeyPair) -> Result<()> {
        if key.public_key() != self.body.creator {
            return Err(Error::InvalidPublicKey("signer is not the event creator".into()));
        }
        let hash = self.hash()?;
        self.signature = key.sign(&hash.0);
        Ok(())
    }

    /// Verify the creator's signature, and the signatures of carried
    /// internal transactions and block signatures' validator field
    pub fn verify(&self) -> Result<()> {
        let hash = self.hash()?;
        KeyPair::verify(&self.body.creator, &hash.0, &self.signature)?;
        for itx in &self.body.internal_transactions {
            itx.verify()?;
        }
        if self
            .body
            .block_signatures
            .iter()
            .any(|bs| bs.validator != self.body.creator)
        {
            return Err(Error::InvalidSignature);
        }
        Ok(())
    }

    /// Transport projection
    pub fn to_wire(&self) -> WireEvent {
        WireEvent {
            body: WireBody {
                transactions: self.body.transactions.clone(),
                internal_transactions: self.body.internal_transactions.clone(),
                block_signatures: self.body.block_signatures.clone(),
                self_parent: self.body.self_parent,
                other_parent: self.body.other_parent,
                creator_id: self.creator_id(),
                index: self.body.index,
                timestamp: self.body.timestamp,
            },
            signature: self.signature.clone(),
        }
    }
}

/// Wire body: the event body with the creator referenced by id
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WireBody {
    pub transactions: Vec<Vec<u8>>,
    pub internal_transactions: Vec<InternalTransaction>,
    pub block_signatures: Vec<BlockSignature>,
    pub self_parent: Option<EventHash>,
    pub other_parent: Option<EventHash>,
    pub creator_id: PeerId,
    pub index: u64,
    pub timestamp: u64,
}

/// Transport-serializable projection of an `Event`
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WireEvent {
    pub body: WireBody,
    pub signature: Vec<u8>,
}

impl WireEvent {
    /// Rebuild the event given the creator's public key.
    pub fn into_event(self, creator: Bytes32) -> Result<Event> {
        if derive_peer_id(&creator) != self.body.creator_id {
            return Err(Error::InvalidPublicKey(format!(
                "public key does not belong to creator {}",
                self.body.creator_id
            )));
        }
        Ok(Event {
            body: EventBody {
                transactions: self.body.transactions,
                internal_transactions: self.body.internal_transactions,
                block_signatures: self.body.block_signatures,
                self_parent: self.body.self_parent,
                other_parent: self.body.other_parent,
                creator,
                index: self.body.index,
                timestamp: self.body.timestamp,
            },
            signature: self.signature,
        })
    }
}
