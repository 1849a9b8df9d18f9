//! Server -> Client packet building.

use super::{ServerPacketType, SubpacketKind};
use crate::{BinaryWriter, ProtocolError};

/// Fixed trailer of the handshake ack.
const HANDSHAKE_ACK_TRAILER: [u8; 4] = [0x49, 0x26, 0x03, 0x01];
/// Bytes following the header of a slot update.
const SLOT_HEADER_TRAILER: [u8; 3] = [0xff, 0xff, 0x00];
/// Bytes closing a slot update.
const SLOT_PACKET_TRAILER: [u8; 4] = [0x01, 0x01, 0x01, 0x01];

const SLOT_START: u8 = 0x00;
const SLOT_END: u8 = 0xff;
const EMPTY_SLOT: [u8; 2] = [0xff, 0xff];
const UNCHANGED_SLOT: [u8; 2] = [SLOT_START, SLOT_END];

/// Build the reply to a handshake.
pub fn build_handshake_ack(w: &mut BinaryWriter, seq: u16, server_time: u16, client_time: u16) {
    w.put_u16(seq);
    w.put_u8(ServerPacketType::HandshakeAck as u8);
    w.put_u16(server_time);
    w.put_u16(client_time);
    w.put_slice(&HANDSHAKE_ACK_TRAILER);
}

/// One slot of a slot update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotEntry<'a> {
    /// No player bound.
    Empty,
    /// Bound player, nothing new to send.
    Unchanged,
    /// Vehicle state only.
    Delta { vehicle: &'a [u8], time: u16 },
    /// Identity blobs plus vehicle state.
    Full {
        channel_info: &'a [u8],
        player_info: &'a [u8],
        vehicle: &'a [u8],
        time: u16,
    },
}

/// Header fields of a slot update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotHeader {
    pub seq: u16,
    pub server_time: u16,
    pub client_time: u16,
}

/// Build a slot update (0x02) with one entry per slot.
pub fn build_slot_update<'a>(
    w: &mut BinaryWriter,
    header: SlotHeader,
    entries: impl IntoIterator<Item = SlotEntry<'a>>,
) -> Result<(), ProtocolError> {
    w.put_u16(header.seq);
    w.put_u8(ServerPacketType::SlotUpdate as u8);
    w.put_u16(header.server_time);
    w.put_u16(header.client_time);
    w.put_u16(header.seq);
    w.put_slice(&SLOT_HEADER_TRAILER);

    for entry in entries {
        write_slot_entry(w, entry)?;
    }

    w.put_slice(&SLOT_PACKET_TRAILER);
    Ok(())
}

fn write_slot_entry(w: &mut BinaryWriter, entry: SlotEntry<'_>) -> Result<(), ProtocolError> {
    match entry {
        SlotEntry::Empty => w.put_slice(&EMPTY_SLOT),
        SlotEntry::Unchanged => w.put_slice(&UNCHANGED_SLOT),
        SlotEntry::Delta { vehicle, time } => {
            w.put_u8(SLOT_START);
            put_vehicle_subpacket(w, vehicle, time)?;
            w.put_u8(SLOT_END);
        }
        SlotEntry::Full {
            channel_info,
            player_info,
            vehicle,
            time,
        } => {
            w.put_u8(SLOT_START);
            put_subpacket(w, SubpacketKind::ChannelInfo, channel_info)?;
            put_subpacket(w, SubpacketKind::PlayerInfo, player_info)?;
            put_vehicle_subpacket(w, vehicle, time)?;
            w.put_u8(SLOT_END);
        }
    }
    Ok(())
}

/// Write a TLV entry. Payloads are limited to 255 bytes by the length byte.
pub fn put_subpacket(
    w: &mut BinaryWriter,
    kind: SubpacketKind,
    payload: &[u8],
) -> Result<(), ProtocolError> {
    let len = u8::try_from(payload.len()).map_err(|_| ProtocolError::PayloadTooLong(payload.len()))?;
    w.put_u8(kind as u8);
    w.put_u8(len);
    w.put_slice(payload);
    Ok(())
}

/// Write a relayed vehicle state with its leading time replaced by `time`.
fn put_vehicle_subpacket(w: &mut BinaryWriter, blob: &[u8], time: u16) -> Result<(), ProtocolError> {
    if blob.len() < 2 {
        return put_subpacket(w, SubpacketKind::VehicleState, blob);
    }
    let len = u8::try_from(blob.len()).map_err(|_| ProtocolError::PayloadTooLong(blob.len()))?;
    w.put_u8(SubpacketKind::VehicleState as u8);
    w.put_u8(len);
    w.put_u16(time);
    w.put_slice(&blob[2..]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_ack() {
        let mut w = BinaryWriter::new();
        build_handshake_ack(&mut w, 0, 0x0102, 0xBEEF);
        assert_eq!(
            w.as_slice(),
            &[0x00, 0x00, 0x01, 0x01, 0x02, 0xBE, 0xEF, 0x49, 0x26, 0x03, 0x01]
        );
    }

    #[test]
    fn test_slot_update_layout() {
        let header = SlotHeader {
            seq: 7,
            server_time: 0x1000,
            client_time: 0x2000,
        };
        let vehicle = [0xAA, 0xBB, 0x01, 0x02];
        let entries = [
            SlotEntry::Empty,
            SlotEntry::Unchanged,
            SlotEntry::Delta {
                vehicle: &vehicle,
                time: 0x0A0B,
            },
            SlotEntry::Full {
                channel_info: &[0x05],
                player_info: &[0x06, 0x07],
                vehicle: &vehicle,
                time: 0x0C0D,
            },
        ];

        let mut w = BinaryWriter::new();
        build_slot_update(&mut w, header, entries).unwrap();

        let expected: Vec<u8> = [
            &[0x00, 0x07, 0x02, 0x10, 0x00, 0x20, 0x00, 0x00, 0x07, 0xff, 0xff, 0x00][..],
            &[0xff, 0xff],
            &[0x00, 0xff],
            &[0x00, 0x12, 0x04, 0x0A, 0x0B, 0x01, 0x02, 0xff],
            &[0x00, 0x00, 0x01, 0x05, 0x01, 0x02, 0x06, 0x07],
            &[0x12, 0x04, 0x0C, 0x0D, 0x01, 0x02, 0xff],
            &[0x01, 0x01, 0x01, 0x01],
        ]
        .concat();
        assert_eq!(w.as_slice(), &expected[..]);
    }

    #[test]
    fn test_payload_too_long() {
        let mut w = BinaryWriter::new();
        let big = vec![0u8; 256];
        assert!(matches!(
            put_subpacket(&mut w, SubpacketKind::ChannelInfo, &big),
            Err(ProtocolError::PayloadTooLong(256))
        ));
    }
}
