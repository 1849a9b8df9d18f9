//! Client session state.

use bytes::Bytes;
use protocol::{Position, VehicleState};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::interest::SlotTable;

/// Last accepted vehicle state of a client.
#[derive(Debug, Clone)]
pub struct VehicleSnapshot {
    /// Raw payload, relayed to other clients.
    pub blob: Bytes,
    pub state: VehicleState,
}

/// A connected game client.
#[derive(Debug)]
pub struct Client {
    /// Unique client ID.
    pub id: u32,
    /// Remote address.
    pub addr: SocketAddr,
    /// When the handshake arrived; server time counts from here.
    pub started_at: Instant,
    /// Last datagram of any kind.
    pub last_seen: Instant,
    /// Client tick from the handshake, echoed in every reply.
    pub client_tick: u16,
    /// Next outgoing sequence.
    seq: u16,
    /// Sequence of the last datagram handled.
    pub last_packet_seq: u16,
    /// Milliseconds between the last two datagrams.
    pub ping_ms: u32,
    pub channel_info: Option<Bytes>,
    pub player_info: Option<Bytes>,
    pub persona_name: String,
    pub vehicle: Option<VehicleSnapshot>,
    /// Bumped whenever anything relayed to other clients changes.
    pub revision: u64,
    /// Grid cell the client was last bucketed into.
    pub cell: Option<usize>,
    pub slots: SlotTable,
}

impl Client {
    pub fn new(id: u32, addr: SocketAddr, client_tick: u16, slot_count: usize, now: Instant) -> Self {
        Self {
            id,
            addr,
            started_at: now,
            last_seen: now,
            client_tick,
            seq: 0,
            last_packet_seq: 0,
            ping_ms: 0,
            channel_info: None,
            player_info: None,
            persona_name: String::new(),
            vehicle: None,
            revision: 0,
            cell: None,
            slots: SlotTable::new(slot_count),
        }
    }

    /// Take the next outgoing sequence number.
    pub fn next_seq(&mut self) -> u16 {
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);
        seq
    }

    /// Milliseconds since the handshake, truncated to 16 bits.
    pub fn server_time(&self, now: Instant) -> u16 {
        now.saturating_duration_since(self.started_at).as_millis() as u16
    }

    /// Record a datagram arriving at `now`.
    pub fn touch(&mut self, now: Instant) {
        self.ping_ms = now
            .saturating_duration_since(self.last_seen)
            .as_millis()
            .min(u32::MAX as u128) as u32;
        self.last_seen = now;
    }

    pub fn is_active(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) < timeout
    }

    /// Channel info, player info and a decoded position are all present.
    pub fn is_ready(&self) -> bool {
        self.channel_info.is_some() && self.player_info.is_some() && self.vehicle.is_some()
    }

    /// World position on the X/Y plane.
    pub fn position(&self) -> Option<Position> {
        self.vehicle.as_ref().map(|v| v.state.position().truncate())
    }

    pub fn set_channel_info(&mut self, blob: Bytes) {
        if self.channel_info.as_ref() != Some(&blob) {
            self.channel_info = Some(blob);
            self.revision += 1;
        }
    }

    pub fn set_player_info(&mut self, blob: Bytes, persona_name: String) {
        if self.player_info.as_ref() != Some(&blob) {
            self.player_info = Some(blob);
            self.persona_name = persona_name;
            self.revision += 1;
        }
    }

    /// Store a new vehicle state. The revision only moves when the payload
    /// differs past its leading time field.
    pub fn set_vehicle(&mut self, blob: Bytes, state: VehicleState) {
        let changed = match &self.vehicle {
            Some(prev) => prev.blob.get(2..) != blob.get(2..),
            None => true,
        };
        if changed {
            self.revision += 1;
        }
        self.vehicle = Some(VehicleSnapshot { blob, state });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::carstate::{Angles, AirState, Kinematics, Profile};

    fn state() -> VehicleState {
        VehicleState {
            sim_time: 0,
            flags: 0,
            profile: Profile::Air(AirState {
                kinematics: Kinematics::default(),
                angles: Angles::default(),
            }),
        }
    }

    #[test]
    fn test_sequence_wraps() {
        let now = Instant::now();
        let mut client = Client::new(1, "127.0.0.1:1000".parse().unwrap(), 5, 14, now);
        client.seq = u16::MAX;
        assert_eq!(client.next_seq(), u16::MAX);
        assert_eq!(client.next_seq(), 0);
    }

    #[test]
    fn test_ready_and_revision() {
        let now = Instant::now();
        let mut client = Client::new(1, "127.0.0.1:1000".parse().unwrap(), 5, 14, now);
        assert!(!client.is_ready());

        client.set_channel_info(Bytes::from_static(&[1, 2]));
        client.set_player_info(Bytes::from_static(&[3]), "Nikki".into());
        assert!(!client.is_ready());
        client.set_vehicle(Bytes::from_static(&[0, 1, 9, 9]), state());
        assert!(client.is_ready());
        assert_eq!(client.revision, 3);

        // Only the leading time differs.
        client.set_vehicle(Bytes::from_static(&[7, 7, 9, 9]), state());
        assert_eq!(client.revision, 3);
        client.set_vehicle(Bytes::from_static(&[7, 7, 9, 8]), state());
        assert_eq!(client.revision, 4);
        client.set_channel_info(Bytes::from_static(&[1, 2]));
        assert_eq!(client.revision, 4);
    }

    #[test]
    fn test_ping_and_activity() {
        let now = Instant::now();
        let mut client = Client::new(1, "127.0.0.1:1000".parse().unwrap(), 5, 14, now);
        client.touch(now + Duration::from_millis(40));
        assert_eq!(client.ping_ms, 40);
        assert_eq!(client.server_time(now + Duration::from_millis(1500)), 1500);

        let timeout = Duration::from_secs(5);
        assert!(client.is_active(now + Duration::from_secs(5), timeout));
        assert!(!client.is_active(now + Duration::from_millis(5040), timeout));
    }
}
