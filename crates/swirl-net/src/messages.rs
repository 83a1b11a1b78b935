//! Sync protocol messages
//!
//! Field-level contracts for the request/response exchanges peers use to
//! propagate events, catch up and change membership.

use crate::framing::{Packet, PacketType};
use serde::{Deserialize, Serialize};
use swirl_core::{
    Block, Frame, FrameEvent, InternalTransaction, KnownEvents, Peer, PeerId, WireEvent,
};

/// Pull request: "here is what I know, send me what I am missing"
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SyncRequest {
    pub from_id: PeerId,
    pub known: KnownEvents,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SyncResponse {
    pub from_id: PeerId,
    /// The responder truncated `events`; the requester should sync again
    pub sync_limit: bool,
    /// Missing events in topological order
    pub events: Vec<WireEvent>,
    /// Responder's known map, used by the requester to push back
    pub known: KnownEvents,
}

/// Push request: events the receiver is expected to lack
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EagerSyncRequest {
    pub from_id: PeerId,
    pub events: Vec<WireEvent>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EagerSyncResponse {
    pub from_id: PeerId,
    pub success: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FastForwardRequest {
    pub from_id: PeerId,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FastForwardResponse {
    pub from_id: PeerId,
    /// Latest block with enough signatures
    pub block: Block,
    /// Frame the block was built from
    pub frame: Frame,
    /// Application snapshot at `block`
    pub snapshot: Vec<u8>,
    /// Events above the frame (and their parents below it) with metadata
    pub horizon: Vec<FrameEvent>,
}

/// Request to be added to the peer set
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct JoinRequest {
    pub internal_transaction: InternalTransaction,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct JoinResponse {
    pub from_id: PeerId,
    pub accepted: bool,
    /// Round at which the peer set including the joiner takes effect
    pub accepted_round: u64,
    /// Peer set including the joiner
    pub peers: Vec<Peer>,
}

/// Any inbound request
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum Command {
    Sync(SyncRequest),
    EagerSync(EagerSyncRequest),
    FastForward(FastForwardRequest),
    Join(JoinRequest),
}

/// Any response
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum CommandResponse {
    Sync(SyncResponse),
    EagerSync(EagerSyncResponse),
    FastForward(Box<FastForwardResponse>),
    Join(JoinResponse),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Sync(_) => "sync",
            Command::EagerSync(_) => "eager_sync",
            Command::FastForward(_) => "fast_forward",
            Command::Join(_) => "join",
        }
    }

    pub fn to_packet(&self) -> Result<Packet, postcard::Error> {
        let (packet_type, payload) = match self {
            Command::Sync(r) => (PacketType::SyncRequest, postcard::to_allocvec(r)?),
            Command::EagerSync(r) => (PacketType::EagerSyncRequest, postcard::to_allocvec(r)?),
            Command::FastForward(r) => (PacketType::FastForwardRequest, postcard::to_allocvec(r)?),
            Command::Join(r) => (PacketType::JoinRequest, postcard::to_allocvec(r)?),
        };
        Ok(Packet::new(packet_type, payload))
    }

    /// Decode a request packet; `None` for response or error packets
    pub fn from_packet(packet: &Packet) -> Result<Option<Self>, postcard::Error> {
        let p = &packet.payload;
        Ok(match packet.packet_type {
            PacketType::SyncRequest => Some(Command::Sync(postcard::from_bytes(p)?)),
            PacketType::EagerSyncRequest => Some(Command::EagerSync(postcard::from_bytes(p)?)),
            PacketType::FastForwardRequest => Some(Command::FastForward(postcard::from_bytes(p)?)),
            PacketType::JoinRequest => Some(Command::Join(postcard::from_bytes(p)?)),
            _ => None,
        })
    }
}

impl CommandResponse {
    pub fn to_packet(&self) -> Result<Packet, postcard::Error> {
        let (packet_type, payload) = match self {
            CommandResponse::Sync(r) => (PacketType::SyncResponse, postcard::to_allocvec(r)?),
            CommandResponse::EagerSync(r) => {
                (PacketType::EagerSyncResponse, postcard::to_allocvec(r)?)
            }
            CommandResponse::FastForward(r) => {
                (PacketType::FastForwardResponse, postcard::to_allocvec(r.as_ref())?)
            }
            CommandResponse::Join(r) => (PacketType::JoinResponse, postcard::to_allocvec(r)?),
        };
        Ok(Packet::new(packet_type, payload))
    }

    /// Decode a response packet. Error packets decode to `Err(message)`.
    pub fn from_packet(packet: &Packet) -> Result<Result<Self, String>, postcard::Error> {
        let p = &packet.payload;
        Ok(Ok(match packet.packet_type {
            PacketType::SyncResponse => CommandResponse::Sync(postcard::from_bytes(p)?),
            PacketType::EagerSyncResponse => CommandResponse::EagerSync(postcard::from_bytes(p)?),
            PacketType::FastForwardResponse => {
                CommandResponse::FastForward(Box::new(postcard::from_bytes(p)?))
            }
            PacketType::JoinResponse => CommandResponse::Join(postcard::from_bytes(p)?),
            _ => {
                let message: String = postcard::from_bytes(p)?;
                return Ok(Err(message));
            }
        }))
    }
}

/// Error packet carrying a responder-side failure message
pub fn error_packet(message: &str) -> Result<Packet, postcard::Error> {
    Ok(Packet::new(PacketType::Error, postcard::to_allocvec(message)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_request_packet_types() {
        let mut known = BTreeMap::new();
        known.insert(PeerId(7), 3);
        let cmd = Command::Sync(SyncRequest { from_id: PeerId(1), known });

        let packet = cmd.to_packet().unwrap();
        assert_eq!(packet.packet_type, PacketType::SyncRequest);
        assert_eq!(Command::from_packet(&packet).unwrap(), Some(cmd));
    }

    #[test]
    fn test_response_is_not_a_command() {
        let resp = CommandResponse::EagerSync(EagerSyncResponse {
            from_id: PeerId(2),
            success: true,
        });
        let packet = resp.to_packet().unwrap();
        assert_eq!(Command::from_packet(&packet).unwrap(), None);
        assert_eq!(CommandResponse::from_packet(&packet).unwrap(), Ok(resp));
    }

    #[test]
    fn test_error_packet() {
        let packet = error_packet("too late").unwrap();
        assert_eq!(
            CommandResponse::from_packet(&packet).unwrap(),
            Err("too late".to_string())
        );
    }
}
