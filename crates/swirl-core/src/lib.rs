//! swirl core library
//!
//! This crate provides the data model, canonical encoding, and cryptographic
//! primitives shared by the swirl hashgraph node and its transports.
//!
//! # Modules
//!
//! - [`types`]: Identifiers (EventHash, PeerId, KnownEvents)
//! - [`peers`]: Peers and immutable, versioned peer sets
//! - [`event`]: Signed gossip events and their wire projection
//! - [`transaction`]: Internal (membership) transactions
//! - [`block`]: Signed blocks of ordered transactions
//! - [`frame`]: Per-round consensus snapshots
//! - [`canonical`]: Deterministic serialization for hashing/signing
//! - [`crypto`]: Hash derivations and Ed25519 keys
//! - [`error`]: Error types

pub mod block;
pub mod canonical;
pub mod crypto;
pub mod error;
pub mod event;
pub mod frame;
pub mod peers;
pub mod transaction;
pub mod types;

#[cfg(test)]
mod test_vectors;

pub use block::{Block, BlockBody, BlockSignature};
pub use crypto::KeyPair;
pub use error::{Error, Result};
pub use event::{Event, EventBody, WireBody, WireEvent};
pub use frame::{Frame, FrameEvent};
pub use peers::{Peer, PeerSet};
pub use transaction::{
    InternalTransaction, InternalTransactionBody, InternalTransactionReceipt, TransactionKind,
};
pub use types::*;
