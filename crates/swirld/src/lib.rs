//! swirld - hashgraph consensus node
//!
//! This crate provides:
//! - The hashgraph engine: rounds, fame, ordering, blocks and frames
//! - Event stores (in-memory and sled)
//! - The node: gossip over Sync/EagerSync, fast-forward catch-up and
//!   dynamic membership through Join and Leave
//! - The application boundary blocks are committed to

pub mod config;
pub mod core;
pub mod hashgraph;
pub mod membership;
pub mod node;
pub mod proxy;
pub mod state;
pub mod storage;
pub mod sync;

pub use config::Config;
pub use hashgraph::{Hashgraph, HashgraphError};
pub use node::{Node, NodeConfig, NodeError, NodeStats};
pub use proxy::{AppProxy, InmemAppProxy};
pub use state::NodeState;
pub use storage::{InmemStore, SledStore, Store};
