//! Hash derivations and signing keys for swirl
//!
//! All hash derivations use BLAKE3 with domain separation prefixes.
//! Signatures are Ed25519 over the derived hash bytes.

use crate::canonical::canonical_bytes;
use crate::error::{Error, Result};
use crate::types::*;
use blake3::Hasher;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::Serialize;

// =============================================================================
// DOMAIN SEPARATION PREFIXES
// =============================================================================

/// Domain prefix for PeerId derivation
pub const DOMAIN_PEER: &[u8] = b"peer";
/// Domain prefix for EventHash derivation
pub const DOMAIN_EVENT: &[u8] = b"event";
/// Domain prefix for internal transaction hashes
pub const DOMAIN_ITX: &[u8] = b"itx";
/// Domain prefix for block body hashes
pub const DOMAIN_BLOCK: &[u8] = b"block";
/// Domain prefix for frame hashes
pub const DOMAIN_FRAME: &[u8] = b"frame";
/// Domain prefix for peer set hashes
pub const DOMAIN_PEERSET: &[u8] = b"peerset";
/// Domain prefix for application state chaining
pub const DOMAIN_STATE: &[u8] = b"state";

// =============================================================================
// DERIVATIONS
// =============================================================================

/// Derive a PeerId from a public key.
///
/// `PeerId = u32_be(BLAKE3("peer" || pubkey)[..4])`
pub fn derive_peer_id(pub_key: &Bytes32) -> PeerId {
    let mut hasher = Hasher::new();
    hasher.update(DOMAIN_PEER);
    hasher.update(pub_key);
    let digest = hasher.finalize();
    let b = digest.as_bytes();
    PeerId(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

/// Hash any serializable value under a domain prefix.
///
/// `H = BLAKE3(domain || canonical_bytes(value))`
pub fn domain_hash<T: Serialize>(domain: &[u8], value: &T) -> Result<Bytes32> {
    let bytes = canonical_bytes(value)?;
    let mut hasher = Hasher::new();
    hasher.update(domain);
    hasher.update(&bytes);
    Ok(*hasher.finalize().as_bytes())
}

/// Chain an application state hash with a batch of transactions.
///
/// `S' = BLAKE3("state" || S || BLAKE3(canonical_bytes(txs)))`
pub fn chain_state_hash(previous: &Bytes32, transactions: &[Vec<u8>]) -> Result<Bytes32> {
    let txs_hash = blake3::hash(&canonical_bytes(&transactions)?);
    let mut hasher = Hasher::new();
    hasher.update(DOMAIN_STATE);
    hasher.update(previous);
    hasher.update(txs_hash.as_bytes());
    Ok(*hasher.finalize().as_bytes())
}

/// XOR `other` into `acc`, extending `acc` with zeros when shorter.
pub fn xor_into(acc: &mut Vec<u8>, other: &[u8]) {
    if acc.len() < other.len() {
        acc.resize(other.len(), 0);
    }
    for (a, b) in acc.iter_mut().zip(other) {
        *a ^= b;
    }
}

// =============================================================================
// KEYS
// =============================================================================

/// Ed25519 keypair for signing events, blocks and internal transactions
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    /// Create from seed bytes (for deterministic testing)
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        Self { signing_key }
    }

    /// Secret seed bytes (for persisting the key)
    pub fn seed(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Get the public key bytes
    pub fn public_key(&self) -> Bytes32 {
        self.signing_key.verifying_key().to_bytes()
    }

    /// PeerId derived from the public key
    pub fn peer_id(&self) -> PeerId {
        derive_peer_id(&self.public_key())
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message).to_bytes().to_vec()
    }

    /// Verify a signature
    pub fn verify(public_key: &Bytes32, message: &[u8], signature: &[u8]) -> Result<()> {
        let verifying_key = VerifyingKey::from_bytes(public_key)
            .map_err(|e| Error::InvalidPublicKey(e.to_string()))?;
        let bytes: [u8; 64] = signature.try_into().map_err(|_| Error::InvalidSignature)?;
        let sig = Signature::from_bytes(&bytes);
        verifying_key
            .verify(message, &sig)
            .map_err(|_| Error::InvalidSignature)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyPair({})", hex::encode(&self.public_key()[..8]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_derivation() {
        let key = KeyPair::from_seed(&[1; 32]);

        // Should be deterministic
        assert_eq!(key.peer_id(), derive_peer_id(&key.public_key()));
        assert_eq!(key.peer_id(), KeyPair::from_seed(&[1; 32]).peer_id());

        // Different key = different id
        assert_ne!(key.peer_id(), KeyPair::from_seed(&[2; 32]).peer_id());
    }

    #[test]
    fn test_sign_verify() {
        let key = KeyPair::generate();
        let sig = key.sign(b"hello");

        assert!(KeyPair::verify(&key.public_key(), b"hello", &sig).is_ok());
        assert!(KeyPair::verify(&key.public_key(), b"hullo", &sig).is_err());

        let other = KeyPair::generate();
        assert!(KeyPair::verify(&other.public_key(), b"hello", &sig).is_err());
    }

    #[test]
    fn test_truncated_signature_rejected() {
        let key = KeyPair::generate();
        let sig = key.sign(b"hello");
        assert!(matches!(
            KeyPair::verify(&key.public_key(), b"hello", &sig[..63]),
            Err(Error::InvalidSignature)
        ));
    }

    #[test]
    fn test_state_chaining() {
        let genesis = [0u8; 32];
        let s1 = chain_state_hash(&genesis, &[b"a".to_vec()]).unwrap();
        let s2 = chain_state_hash(&genesis, &[b"a".to_vec()]).unwrap();
        assert_eq!(s1, s2);

        let s3 = chain_state_hash(&genesis, &[b"b".to_vec()]).unwrap();
        assert_ne!(s1, s3);
    }

    #[test]
    fn test_xor_into() {
        let mut acc = vec![0b1010];
        xor_into(&mut acc, &[0b0110, 0xff]);
        assert_eq!(acc, vec![0b1100, 0xff]);
    }
}
