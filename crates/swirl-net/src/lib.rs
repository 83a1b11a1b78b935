//! Networking for the swirl hashgraph
//!
//! This crate provides:
//! - Sync protocol messages (Sync, EagerSync, FastForward, Join)
//! - Length-prefixed packet framing
//! - The `Transport` abstraction with in-memory and TCP implementations

pub mod framing;
pub mod inmem;
pub mod messages;
pub mod tcp;
pub mod transport;

pub use framing::{Packet, PacketCodec, PacketType};
pub use inmem::{InmemNetwork, InmemTransport};
pub use messages::*;
pub use tcp::TcpTransport;
pub use transport::{Responder, Rpc, Transport, TransportError};
