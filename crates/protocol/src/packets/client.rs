//! Client -> Server datagram parsing.

use bytes::Bytes;

use super::{
    BODY_OFFSET, ECHOED_SEQ_OFFSET, HANDSHAKE_LEN, HANDSHAKE_MARKER, HANDSHAKE_MARKER_OFFSET,
    SubpacketKind, TRAILER_LEN,
};
use crate::{BinaryReader, ProtocolError};

/// Offset of the client's initial tick inside a handshake.
const HANDSHAKE_TICK_OFFSET: usize = 52;

/// A new-connection handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
    /// The client's tick counter at connection time, echoed in every reply.
    pub client_tick: u16,
}

impl Handshake {
    /// Whether `data` is a handshake datagram.
    pub fn matches(data: &[u8]) -> bool {
        data.len() == HANDSHAKE_LEN && data[HANDSHAKE_MARKER_OFFSET] == HANDSHAKE_MARKER
    }

    /// Parse a handshake, returning `None` for any other datagram.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if !Self::matches(data) {
            return None;
        }
        let tick = &data[HANDSHAKE_TICK_OFFSET..HANDSHAKE_TICK_OFFSET + 2];
        Some(Self {
            client_tick: u16::from_be_bytes([tick[0], tick[1]]),
        })
    }
}

/// One TLV entry of a steady-state datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subpacket {
    pub kind: u8,
    pub payload: Bytes,
}

impl Subpacket {
    pub fn known_kind(&self) -> Option<SubpacketKind> {
        SubpacketKind::from_u8(self.kind)
    }
}

/// A parsed steady-state datagram.
#[derive(Debug, Clone)]
pub struct ClientDatagram {
    /// The client's sequence number.
    pub seq: u16,
    /// The last server sequence the client has seen.
    pub echoed_seq: u16,
    pub subpackets: Vec<Subpacket>,
}

impl ClientDatagram {
    /// Parse a steady-state datagram.
    ///
    /// The subpacket body sits between the fixed header and a 5-byte
    /// trailer. A TLV entry that claims more bytes than remain fails the
    /// whole datagram.
    pub fn parse(data: Bytes) -> Result<Self, ProtocolError> {
        if data.len() < BODY_OFFSET + TRAILER_LEN {
            return Err(ProtocolError::ShortDatagram(data.len()));
        }

        let seq = u16::from_be_bytes([data[0], data[1]]);
        let echoed_seq = u16::from_be_bytes([data[ECHOED_SEQ_OFFSET], data[ECHOED_SEQ_OFFSET + 1]]);

        let body = data.slice(BODY_OFFSET..data.len() - TRAILER_LEN);
        let mut reader = BinaryReader::new(body);
        let mut subpackets = Vec::new();

        while let Some(kind) = reader.try_get_u8() {
            let len = reader.try_get_u8().ok_or(ProtocolError::TruncatedSubpacket {
                kind,
                wanted: 1,
                available: 0,
            })? as usize;
            let available = reader.remaining();
            let payload = reader
                .try_take(len)
                .ok_or(ProtocolError::TruncatedSubpacket {
                    kind,
                    wanted: len,
                    available,
                })?;
            subpackets.push(Subpacket { kind, payload });
        }

        Ok(Self {
            seq,
            echoed_seq,
            subpackets,
        })
    }
}

/// Fields extracted from a player-info blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerInfo {
    pub persona_name: String,
    /// Only present when the blob is long enough to carry it.
    pub persona_id: Option<u32>,
}

impl PlayerInfo {
    const NAME_OFFSET: usize = 1;
    const NAME_WIDTH: usize = 32;
    const PERSONA_ID_OFFSET: usize = 41;

    pub fn parse(blob: &[u8]) -> Result<Self, ProtocolError> {
        let name_end = Self::NAME_OFFSET + Self::NAME_WIDTH;
        if blob.len() < name_end {
            return Err(ProtocolError::TruncatedSubpacket {
                kind: SubpacketKind::PlayerInfo as u8,
                wanted: name_end,
                available: blob.len(),
            });
        }

        let mut reader = BinaryReader::new(Bytes::copy_from_slice(blob));
        reader.skip(Self::NAME_OFFSET);
        let persona_name = reader.get_fixed_string(Self::NAME_WIDTH);
        reader.skip(Self::PERSONA_ID_OFFSET - name_end);
        let persona_id = reader.try_get_u32_le();

        Ok(Self {
            persona_name,
            persona_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handshake_bytes(tick: u16) -> Vec<u8> {
        let mut data = vec![0u8; HANDSHAKE_LEN];
        data[HANDSHAKE_MARKER_OFFSET] = HANDSHAKE_MARKER;
        data[52..54].copy_from_slice(&tick.to_be_bytes());
        data
    }

    fn datagram(seq: u16, echoed: u16, body: &[u8]) -> Bytes {
        let mut data = vec![0u8; BODY_OFFSET];
        data[0..2].copy_from_slice(&seq.to_be_bytes());
        data[8..10].copy_from_slice(&echoed.to_be_bytes());
        data.extend_from_slice(body);
        data.extend_from_slice(&[0u8; TRAILER_LEN]);
        Bytes::from(data)
    }

    #[test]
    fn test_handshake() {
        let data = handshake_bytes(0xBEEF);
        assert_eq!(Handshake::parse(&data), Some(Handshake { client_tick: 0xBEEF }));

        let mut wrong_marker = data.clone();
        wrong_marker[2] = 0x07;
        assert_eq!(Handshake::parse(&wrong_marker), None);
        assert_eq!(Handshake::parse(&data[..57]), None);
    }

    #[test]
    fn test_parse_subpackets() {
        let body = [0x00, 0x02, 0xAA, 0xBB, 0x12, 0x01, 0xCC, 0x7F, 0x00];
        let dgram = ClientDatagram::parse(datagram(9, 4, &body)).unwrap();
        assert_eq!(dgram.seq, 9);
        assert_eq!(dgram.echoed_seq, 4);
        assert_eq!(dgram.subpackets.len(), 3);
        assert_eq!(dgram.subpackets[0].known_kind(), Some(SubpacketKind::ChannelInfo));
        assert_eq!(&dgram.subpackets[0].payload[..], &[0xAA, 0xBB]);
        assert_eq!(dgram.subpackets[1].known_kind(), Some(SubpacketKind::VehicleState));
        assert_eq!(dgram.subpackets[2].known_kind(), None);
        assert!(dgram.subpackets[2].payload.is_empty());
    }

    #[test]
    fn test_empty_body() {
        let dgram = ClientDatagram::parse(datagram(1, 0, &[])).unwrap();
        assert!(dgram.subpackets.is_empty());
    }

    #[test]
    fn test_short_datagram() {
        let err = ClientDatagram::parse(Bytes::from_static(&[0u8; 20])).unwrap_err();
        assert!(matches!(err, ProtocolError::ShortDatagram(20)));
    }

    #[test]
    fn test_truncated_subpacket() {
        let err = ClientDatagram::parse(datagram(1, 0, &[0x01, 0x10, 0x00])).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::TruncatedSubpacket {
                kind: 0x01,
                wanted: 16,
                available: 1
            }
        ));
    }

    #[test]
    fn test_player_info() {
        let mut blob = vec![0u8; 45];
        blob[1..7].copy_from_slice(b"Nikki\0");
        blob[7] = b'x';
        blob[41..45].copy_from_slice(&1234u32.to_le_bytes());
        let info = PlayerInfo::parse(&blob).unwrap();
        assert_eq!(info.persona_name, "Nikki");
        assert_eq!(info.persona_id, Some(1234));

        let info = PlayerInfo::parse(&blob[..40]).unwrap();
        assert_eq!(info.persona_id, None);

        assert!(PlayerInfo::parse(&blob[..20]).is_err());
    }
}
