//! Internal (membership) transactions
//!
//! Membership changes travel inside events like application transactions and
//! take effect only once they reach consensus.

use crate::crypto::{domain_hash, KeyPair, DOMAIN_ITX};
use crate::error::{Error, Result};
use crate::peers::Peer;
use crate::types::*;
use serde::{Deserialize, Serialize};

/// Kind of membership change
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TransactionKind {
    PeerAdd = 0,
    PeerRemove = 1,
}

/// Signed content of an internal transaction
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct InternalTransactionBody {
    pub kind: TransactionKind,
    pub peer: Peer,
}

/// Membership change, signed by the peer being added or removed
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct InternalTransaction {
    pub body: InternalTransactionBody,
    /// Ed25519 signature over `hash()`
    pub signature: Vec<u8>,
}

impl InternalTransaction {
    /// Create and sign a membership change for `peer`
    pub fn new(kind: TransactionKind, peer: Peer, key: &KeyPair) -> Result<Self> {
        let body = InternalTransactionBody { kind, peer };
        let hash = domain_hash(DOMAIN_ITX, &body)?;
        let signature = key.sign(&hash);
        Ok(Self { body, signature })
    }

    /// `H = BLAKE3("itx" || canonical_bytes(body))`
    pub fn hash(&self) -> Result<Bytes32> {
        domain_hash(DOMAIN_ITX, &self.body)
    }

    /// Check the peer identity and that the subject peer signed the change
    pub fn verify(&self) -> Result<()> {
        self.body.peer.validate()?;
        let hash = self.hash()?;
        KeyPair::verify(&self.body.peer.pub_key, &hash, &self.signature)
            .map_err(|_| Error::InvalidSignature)
    }
}

/// Outcome of an internal transaction once it reached consensus
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct InternalTransactionReceipt {
    pub transaction: InternalTransaction,
    pub accepted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let key = KeyPair::from_seed(&[3; 32]);
        let peer = Peer::new(key.public_key(), "127.0.0.1:4242", "monika");
        let itx = InternalTransaction::new(TransactionKind::PeerAdd, peer, &key).unwrap();
        assert!(itx.verify().is_ok());
    }

    #[test]
    fn test_signed_by_someone_else() {
        let key = KeyPair::from_seed(&[3; 32]);
        let intruder = KeyPair::from_seed(&[4; 32]);
        let peer = Peer::new(key.public_key(), "127.0.0.1:4242", "monika");
        let itx = InternalTransaction::new(TransactionKind::PeerRemove, peer, &intruder).unwrap();
        assert!(matches!(itx.verify(), Err(Error::InvalidSignature)));
    }

    #[test]
    fn test_kind_changes_hash() {
        let key = KeyPair::from_seed(&[3; 32]);
        let peer = Peer::new(key.public_key(), "127.0.0.1:4242", "monika");
        let add = InternalTransaction::new(TransactionKind::PeerAdd, peer.clone(), &key).unwrap();
        let remove = InternalTransaction::new(TransactionKind::PeerRemove, peer, &key).unwrap();
        assert_ne!(add.hash().unwrap(), remove.hash().unwrap());
    }
}
