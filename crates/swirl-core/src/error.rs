//! Error types for swirl

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// swirl core error types
#[derive(Debug, Error)]
pub enum Error {
    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] postcard::Error),

    /// Hash mismatch (computed != transmitted)
    #[error("hash mismatch: computed {computed} != transmitted {transmitted}")]
    HashMismatch { computed: String, transmitted: String },

    /// Invalid signature
    #[error("invalid signature")]
    InvalidSignature,

    /// Invalid public key
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Peer not part of the peer set
    #[error("unknown peer: {0}")]
    UnknownPeer(u32),

    /// Peer already part of the peer set
    #[error("duplicate peer: {0}")]
    DuplicatePeer(u32),
}
