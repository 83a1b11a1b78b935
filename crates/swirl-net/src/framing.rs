//! Packet framing for the TCP transport
//!
//! Provides length-prefixed framing tagged with the packet type.

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Maximum packet size (64 MB, fast-forward responses carry whole frames)
const MAX_PACKET_SIZE: usize = 64 * 1024 * 1024;

/// Framing errors
#[derive(Debug, Error)]
pub enum PacketError {
    #[error("Packet too large: {0} bytes (max {MAX_PACKET_SIZE})")]
    TooLarge(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unknown packet type: {0}")]
    UnknownType(u8),
}

/// A framed message
#[derive(Clone, Debug)]
pub struct Packet {
    /// Packet type
    pub packet_type: PacketType,
    /// Payload bytes (postcard encoded message)
    pub payload: Vec<u8>,
}

/// Packet types
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PacketType {
    /// Responder failed to handle the request
    Error = 1,
    SyncRequest = 10,
    SyncResponse = 11,
    EagerSyncRequest = 12,
    EagerSyncResponse = 13,
    FastForwardRequest = 14,
    FastForwardResponse = 15,
    JoinRequest = 16,
    JoinResponse = 17,
}

impl TryFrom<u8> for PacketType {
    type Error = PacketError;

    fn try_from(value: u8) -> Result<Self, PacketError> {
        match value {
            1 => Ok(Self::Error),
            10 => Ok(Self::SyncRequest),
            11 => Ok(Self::SyncResponse),
            12 => Ok(Self::EagerSyncRequest),
            13 => Ok(Self::EagerSyncResponse),
            14 => Ok(Self::FastForwardRequest),
            15 => Ok(Self::FastForwardResponse),
            16 => Ok(Self::JoinRequest),
            17 => Ok(Self::JoinResponse),
            _ => Err(PacketError::UnknownType(value)),
        }
    }
}

/// Codec for length-prefixed packets
///
/// Wire format:
/// - 4 bytes: length (big-endian, includes type byte)
/// - 1 byte: packet type
/// - N bytes: payload
#[derive(Default)]
pub struct PacketCodec;

impl PacketCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = PacketError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Need at least 5 bytes (4 length + 1 type)
        if src.len() < 5 {
            return Ok(None);
        }

        let length = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;

        if length > MAX_PACKET_SIZE {
            return Err(PacketError::TooLarge(length));
        }
        if length == 0 {
            return Err(PacketError::UnknownType(0));
        }

        // Need full packet
        if src.len() < 4 + length {
            src.reserve(4 + length - src.len());
            return Ok(None);
        }

        src.advance(4);
        let packet_type = PacketType::try_from(src[0])?;
        src.advance(1);

        let payload = src.split_to(length - 1).to_vec();

        Ok(Some(Packet { packet_type, payload }))
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = PacketError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let length = 1 + item.payload.len();
        if length > MAX_PACKET_SIZE {
            return Err(PacketError::TooLarge(length));
        }

        dst.reserve(4 + length);
        dst.put_u32(length as u32);
        dst.put_u8(item.packet_type as u8);
        dst.put_slice(&item.payload);

        Ok(())
    }
}

impl Packet {
    pub fn new(packet_type: PacketType, payload: Vec<u8>) -> Self {
        Self { packet_type, payload }
    }
}
