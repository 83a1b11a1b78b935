//! Blocks: ordered, signed batches of transactions derived from frames

use crate::crypto::{derive_peer_id, domain_hash, KeyPair, DOMAIN_BLOCK};
use crate::error::Result;
use crate::peers::PeerSet;
use crate::transaction::{InternalTransaction, InternalTransactionReceipt};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Content covered by validator signatures
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockBody {
    pub index: u64,
    pub round_received: u64,
    /// Consensus timestamp of the frame (unix nanos)
    pub timestamp: u64,
    /// Application state hash after applying this block
    pub state_hash: Bytes32,
    pub frame_hash: Bytes32,
    pub peers_hash: Bytes32,
    pub transactions: Vec<Vec<u8>>,
    pub internal_transactions: Vec<InternalTransaction>,
    pub internal_transaction_receipts: Vec<InternalTransactionReceipt>,
}

/// A validator's signature over a block body
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockSignature {
    /// Validator public key
    pub validator: Bytes32,
    /// Block index
    pub index: u64,
    pub signature: Vec<u8>,
}

impl BlockSignature {
    pub fn validator_id(&self) -> PeerId {
        derive_peer_id(&self.validator)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    pub body: BlockBody,
    /// Validator id -> signature over `body.hash()`
    pub signatures: BTreeMap<PeerId, Vec<u8>>,
}

impl BlockBody {
    /// `H = BLAKE3("block" || canonical_bytes(body))`
    pub fn hash(&self) -> Result<Bytes32> {
        domain_hash(DOMAIN_BLOCK, self)
    }
}

impl Block {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index: u64,
        round_received: u64,
        timestamp: u64,
        frame_hash: Bytes32,
        peers_hash: Bytes32,
        transactions: Vec<Vec<u8>>,
        internal_transactions: Vec<InternalTransaction>,
        internal_transaction_receipts: Vec<InternalTransactionReceipt>,
    ) -> Self {
        Self {
            body: BlockBody {
                index,
                round_received,
                timestamp,
                state_hash: [0; 32],
                frame_hash,
                peers_hash,
                transactions,
                internal_transactions,
                internal_transaction_receipts,
            },
            signatures: BTreeMap::new(),
        }
    }

    pub fn index(&self) -> u64 {
        self.body.index
    }

    pub fn round_received(&self) -> u64 {
        self.body.round_received
    }

    pub fn transactions(&self) -> &[Vec<u8>] {
        &self.body.transactions
    }

    /// Sign the block body
    pub fn sign(&self, key: &KeyPair) -> Result<BlockSignature> {
        let hash = self.body.hash()?;
        Ok(BlockSignature {
            validator: key.public_key(),
            index: self.body.index,
            signature: key.sign(&hash),
        })
    }

    /// Verify a signature against this block
    pub fn verify_signature(&self, sig: &BlockSignature) -> Result<()> {
        let hash = self.body.hash()?;
        KeyPair::verify(&sig.validator, &hash, &sig.signature)
    }

    /// Record a signature (callers verify first)
    pub fn set_signature(&mut self, sig: BlockSignature) {
        self.signatures.insert(sig.validator_id(), sig.signature);
    }

    /// Number of signatures from members of `peers` that verify
    pub fn valid_signature_count(&self, peers: &PeerSet) -> Result<usize> {
        let hash = self.body.hash()?;
        Ok(self
            .signatures
            .iter()
            .filter(|(id, sig)| {
                peers
                    .get(**id)
                    .map(|p| KeyPair::verify(&p.pub_key, &hash, sig).is_ok())
                    .unwrap_or(false)
            })
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peers::Peer;

    fn block() -> Block {
        Block::new(0, 3, 1, [1; 32], [2; 32], vec![b"tx".to_vec()], vec![], vec![])
    }

    #[test]
    fn test_signature_roundtrip() {
        let key = KeyPair::from_seed(&[1; 32]);
        let mut b = block();
        let sig = b.sign(&key).unwrap();
        assert!(b.verify_signature(&sig).is_ok());

        b.set_signature(sig);
        let peers = PeerSet::new(vec![Peer::new(key.public_key(), "a", "a")]);
        assert_eq!(b.valid_signature_count(&peers).unwrap(), 1);
    }

    #[test]
    fn test_state_hash_is_signed() {
        let key = KeyPair::from_seed(&[1; 32]);
        let mut b = block();
        let sig = b.sign(&key).unwrap();
        b.body.state_hash = [9; 32];
        assert!(b.verify_signature(&sig).is_err());
    }

    #[test]
    fn test_outsider_signatures_not_counted() {
        let member = KeyPair::from_seed(&[1; 32]);
        let outsider = KeyPair::from_seed(&[2; 32]);
        let mut b = block();
        let sig = b.sign(&outsider).unwrap();
        b.set_signature(sig);
        let peers = PeerSet::new(vec![Peer::new(member.public_key(), "a", "a")]);
        assert_eq!(b.valid_signature_count(&peers).unwrap(), 0);
    }
}
