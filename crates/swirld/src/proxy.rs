//! Application boundary
//!
//! The node hands every block to the application in order and records the
//! state hash the application returns. Snapshots let a peer that is far
//! behind restore the application state at an anchor block instead of
//! replaying history.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use swirl_core::crypto::chain_state_hash;
use swirl_core::{Block, Bytes32};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("No snapshot for block {0}")]
    NoSnapshot(u64),
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),
    #[error("Core error: {0}")]
    Core(#[from] swirl_core::Error),
}

pub trait AppProxy: Send + Sync {
    /// Apply the block's transactions; returns the resulting state hash
    fn commit_block(&self, block: &Block) -> Result<Bytes32, ProxyError>;

    /// Opaque application state as of `block_index`
    fn get_snapshot(&self, block_index: u64) -> Result<Vec<u8>, ProxyError>;

    /// Replace the application state; returns the restored state hash
    fn restore(&self, snapshot: &[u8]) -> Result<Bytes32, ProxyError>;
}

#[derive(Default)]
struct InmemState {
    state_hash: Bytes32,
    transactions: Vec<Vec<u8>>,
    blocks: Vec<Block>,
    snapshots: BTreeMap<u64, Bytes32>,
}

/// Application that chains a hash over every committed transaction.
/// Its snapshot is the state hash itself.
#[derive(Default)]
pub struct InmemAppProxy {
    state: Mutex<InmemState>,
}

impl InmemAppProxy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state_hash(&self) -> Bytes32 {
        self.state.lock().state_hash
    }

    /// Transactions committed since start or the last restore
    pub fn committed_transactions(&self) -> Vec<Vec<u8>> {
        self.state.lock().transactions.clone()
    }

    pub fn committed_blocks(&self) -> Vec<Block> {
        self.state.lock().blocks.clone()
    }
}

impl AppProxy for InmemAppProxy {
    fn commit_block(&self, block: &Block) -> Result<Bytes32, ProxyError> {
        let mut state = self.state.lock();
        let state_hash = chain_state_hash(&state.state_hash, block.transactions())?;
        state.state_hash = state_hash;
        state.transactions.extend(block.transactions().iter().cloned());
        state.blocks.push(block.clone());
        state.snapshots.insert(block.index(), state_hash);
        debug!(block = block.index(), state = %hex::encode(&state_hash[..6]), "committed block");
        Ok(state_hash)
    }

    fn get_snapshot(&self, block_index: u64) -> Result<Vec<u8>, ProxyError> {
        self.state
            .lock()
            .snapshots
            .get(&block_index)
            .map(|hash| hash.to_vec())
            .ok_or(ProxyError::NoSnapshot(block_index))
    }

    fn restore(&self, snapshot: &[u8]) -> Result<Bytes32, ProxyError> {
        let state_hash: Bytes32 = snapshot.try_into().map_err(|_| {
            ProxyError::InvalidSnapshot(format!("expected 32 bytes, got {}", snapshot.len()))
        })?;
        let mut state = self.state.lock();
        *state = InmemState {
            state_hash,
            ..Default::default()
        };
        Ok(state_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(index: u64, txs: &[&str]) -> Block {
        Block::new(
            index,
            index + 1,
            0,
            [0; 32],
            [0; 32],
            txs.iter().map(|t| t.as_bytes().to_vec()).collect(),
            vec![],
            vec![],
        )
    }

    #[test]
    fn test_commit_chains_state() {
        let a = InmemAppProxy::new();
        let b = InmemAppProxy::new();
        let h1 = a.commit_block(&block(0, &["x", "y"])).unwrap();
        let h2 = a.commit_block(&block(1, &["z"])).unwrap();
        assert_ne!(h1, h2);

        // same blocks, same state
        b.commit_block(&block(0, &["x", "y"])).unwrap();
        assert_eq!(b.commit_block(&block(1, &["z"])).unwrap(), h2);
        assert_eq!(a.committed_transactions().len(), 3);
    }

    #[test]
    fn test_snapshot_restore() {
        let a = InmemAppProxy::new();
        let h1 = a.commit_block(&block(0, &["x"])).unwrap();
        a.commit_block(&block(1, &["y"])).unwrap();

        let snapshot = a.get_snapshot(0).unwrap();
        let b = InmemAppProxy::new();
        assert_eq!(b.restore(&snapshot).unwrap(), h1);

        // continuing from the snapshot reaches the same state
        assert_eq!(
            b.commit_block(&block(1, &["y"])).unwrap(),
            a.state_hash()
        );
        assert!(matches!(a.get_snapshot(7), Err(ProxyError::NoSnapshot(7))));
        assert!(matches!(b.restore(&[1, 2]), Err(ProxyError::InvalidSnapshot(_))));
    }
}
