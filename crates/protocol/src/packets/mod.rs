//! Datagram layouts for the freeroam protocol.
//!
//! This module contains both client->server parsing and server->client
//! packet building.

mod client;
mod server;

pub use client::*;
pub use server::*;

/// Length of a connection handshake datagram.
pub const HANDSHAKE_LEN: usize = 58;
/// Marker byte identifying a handshake.
pub const HANDSHAKE_MARKER: u8 = 0x06;
/// Offset of the marker byte inside a handshake.
pub const HANDSHAKE_MARKER_OFFSET: usize = 2;

/// Offset of the echoed server sequence in a steady-state datagram.
pub const ECHOED_SEQ_OFFSET: usize = 8;
/// Offset where the subpacket body starts.
pub const BODY_OFFSET: usize = 16;
/// Trailing bytes after the subpacket body.
pub const TRAILER_LEN: usize = 5;

/// Subpacket types carried in TLV entries.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubpacketKind {
    /// Opaque channel info, stored and relayed verbatim.
    ChannelInfo = 0x00,
    /// Player info with the persona name and id.
    PlayerInfo = 0x01,
    /// Bit-packed vehicle state.
    VehicleState = 0x12,
}

impl SubpacketKind {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x00 => Some(Self::ChannelInfo),
            0x01 => Some(Self::PlayerInfo),
            0x12 => Some(Self::VehicleState),
            _ => None,
        }
    }
}

/// Packet types for server -> client datagrams.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerPacketType {
    /// Reply to a handshake.
    HandshakeAck = 0x01,
    /// Steady-state slot update.
    SlotUpdate = 0x02,
}
