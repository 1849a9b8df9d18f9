//! Client registry and the per-datagram / per-tick logic that runs under the
//! registry lock.

use bytes::{Bytes, BytesMut};
use protocol::packets::{
    ClientDatagram, Handshake, PlayerInfo, SlotEntry, SlotHeader, SubpacketKind,
    build_handshake_ack, build_slot_update,
};
use protocol::{BinaryWriter, DecodeOptions, ProtocolError, VehicleState};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use super::client::Client;
use crate::config::Config;
use crate::interest::{
    Candidate, SlotTable, Transmission, TransmissionPolicy, plan_transmissions, select_nearest,
};
use crate::pool::BufferPool;
use crate::spatial::{CellOccupancy, WorldGrid, map_to_grid};

/// Why a datagram was not applied.
#[derive(Debug, Error)]
pub enum DropReason {
    #[error("unknown peer")]
    UnknownPeer,
    #[error("malformed datagram: {0}")]
    Malformed(#[from] ProtocolError),
}

/// Result of handling one inbound datagram.
#[derive(Debug)]
pub enum PacketOutcome {
    /// A handshake created a new client.
    Registered(u32),
    /// A steady-state datagram was applied.
    Handled(u32),
    /// The client failed the persona allow-list and was removed.
    Kicked(u32),
    Dropped(DropReason),
}

/// A datagram ready to go out.
#[derive(Debug)]
pub struct Outbound {
    pub addr: SocketAddr,
    pub payload: BytesMut,
}

/// Datagrams to send after releasing the registry lock.
#[derive(Debug, Default)]
pub struct PendingSends {
    pub datagrams: Vec<Outbound>,
}

impl PendingSends {
    pub fn len(&self) -> usize {
        self.datagrams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datagrams.is_empty()
    }
}

/// Counters from one maintenance tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickSummary {
    pub evicted: usize,
    pub moved: usize,
    pub lookup_misses: usize,
    pub recomputed: usize,
}

/// Settings copied out of [`Config`] that the registry consults per datagram.
#[derive(Debug, Clone)]
struct Settings {
    inactivity_timeout: Duration,
    allowed_personas: Option<Vec<u32>>,
    visibility_radius: f64,
    max_visible_players: usize,
    spatial_index: bool,
    policy: TransmissionPolicy,
    decode: DecodeOptions,
}

/// Where a client landed during re-bucketing.
enum Bucket {
    NotReady,
    OffGrid,
    Stayed,
    Moved,
}

/// Everything parsed out of a steady-state datagram before it is applied.
struct ParsedUpdate {
    seq: u16,
    echoed_seq: u16,
    channel_info: Option<Bytes>,
    player_info: Option<(Bytes, PlayerInfo)>,
    vehicle: Option<(Bytes, VehicleState)>,
}

/// The client registry plus grid occupancy, guarded by one lock.
pub struct ServerState {
    settings: Settings,
    pub clients: HashMap<u32, Client>,
    addrs: HashMap<SocketAddr, u32>,
    next_client_id: u32,
    grid: WorldGrid,
    occupancy: CellOccupancy,
    pool: Arc<BufferPool>,
    pub tick_count: u64,
}

impl ServerState {
    pub fn new(config: &Config, pool: Arc<BufferPool>) -> Self {
        let grid = WorldGrid::new(config.grid.width, config.grid.height, config.grid.cell_radius);
        let occupancy = CellOccupancy::new(grid.num_cells());
        Self {
            settings: Settings {
                inactivity_timeout: config.server.inactivity_timeout(),
                allowed_personas: config.server.allowed_personas.clone(),
                visibility_radius: config.interest.visibility_radius,
                max_visible_players: config.interest.max_visible_players,
                spatial_index: config.interest.spatial_index,
                policy: TransmissionPolicy {
                    full_budget: config.interest.full_budget,
                    ack_retry_threshold: config.interest.ack_retry_threshold,
                },
                decode: config.protocol.decode_options(),
            },
            clients: HashMap::new(),
            addrs: HashMap::new(),
            next_client_id: 1,
            grid,
            occupancy,
            pool,
            tick_count: 0,
        }
    }

    pub fn client(&self, id: u32) -> Option<&Client> {
        self.clients.get(&id)
    }

    pub fn client_by_addr(&self, addr: &SocketAddr) -> Option<&Client> {
        self.addrs.get(addr).and_then(|id| self.clients.get(id))
    }

    /// Handle one inbound datagram.
    pub fn handle_datagram(
        &mut self,
        addr: SocketAddr,
        data: Bytes,
        now: Instant,
        out: &mut PendingSends,
    ) -> PacketOutcome {
        if let Some(handshake) = Handshake::parse(&data) {
            return self.register(addr, handshake, now, out);
        }

        let Some(&id) = self.addrs.get(&addr) else {
            return PacketOutcome::Dropped(DropReason::UnknownPeer);
        };
        if let Some(client) = self.clients.get_mut(&id) {
            client.touch(now);
        }

        let update = match self.parse_update(data) {
            Ok(update) => update,
            Err(e) => return PacketOutcome::Dropped(e.into()),
        };

        if let Some((_, info)) = &update.player_info {
            if !self.persona_allowed(info) {
                warn!(
                    "Kicking {}: persona {:?} not allowed",
                    addr, info.persona_id
                );
                self.remove_client(id);
                return PacketOutcome::Kicked(id);
            }
        }

        let ready = {
            let Some(client) = self.clients.get_mut(&id) else {
                return PacketOutcome::Dropped(DropReason::UnknownPeer);
            };
            apply_update(client, update);
            client.is_ready()
        };

        if ready {
            if let Some(outbound) = self.render_slots(id, now) {
                out.datagrams.push(outbound);
            }
        }
        PacketOutcome::Handled(id)
    }

    fn register(
        &mut self,
        addr: SocketAddr,
        handshake: Handshake,
        now: Instant,
        out: &mut PendingSends,
    ) -> PacketOutcome {
        if let Some(old) = self.addrs.get(&addr).copied() {
            debug!("Replacing session {} for {}", old, addr);
            self.remove_client(old);
        }

        let id = self.next_client_id;
        self.next_client_id = self.next_client_id.wrapping_add(1).max(1);

        let mut client = Client::new(
            id,
            addr,
            handshake.client_tick,
            self.settings.max_visible_players,
            now,
        );
        let mut w = BinaryWriter::from_buf(self.pool.take());
        let seq = client.next_seq();
        build_handshake_ack(&mut w, seq, client.server_time(now), client.client_tick);
        out.datagrams.push(Outbound {
            addr,
            payload: w.into_inner(),
        });

        info!("New client {} from {}", id, addr);
        self.clients.insert(id, client);
        self.addrs.insert(addr, id);
        PacketOutcome::Registered(id)
    }

    /// Parse the datagram and every known subpacket in it without touching
    /// any client state.
    fn parse_update(&self, data: Bytes) -> Result<ParsedUpdate, ProtocolError> {
        let datagram = ClientDatagram::parse(data)?;
        let mut update = ParsedUpdate {
            seq: datagram.seq,
            echoed_seq: datagram.echoed_seq,
            channel_info: None,
            player_info: None,
            vehicle: None,
        };

        for sub in datagram.subpackets {
            match sub.known_kind() {
                Some(SubpacketKind::ChannelInfo) => update.channel_info = Some(sub.payload),
                Some(SubpacketKind::PlayerInfo) => {
                    let info = PlayerInfo::parse(&sub.payload)?;
                    update.player_info = Some((sub.payload, info));
                }
                Some(SubpacketKind::VehicleState) => {
                    let state = VehicleState::decode(&sub.payload, self.settings.decode)?;
                    update.vehicle = Some((sub.payload, state));
                }
                None => trace!("Ignoring subpacket {:#04x}", sub.kind),
            }
        }
        Ok(update)
    }

    fn persona_allowed(&self, info: &PlayerInfo) -> bool {
        match (&self.settings.allowed_personas, info.persona_id) {
            (None, _) => true,
            (Some(allowed), Some(id)) => allowed.contains(&id),
            (Some(_), None) => false,
        }
    }

    /// Drop a client from the registry and grid.
    pub fn remove_client(&mut self, id: u32) -> Option<Client> {
        let client = self.clients.remove(&id)?;
        if self.addrs.get(&client.addr) == Some(&id) {
            self.addrs.remove(&client.addr);
        }
        if let Some(cell) = client.cell {
            self.occupancy.remove(id, cell);
        }
        Some(client)
    }

    /// Build the slot update for a viewer, advancing its slot state.
    pub fn render_slots(&mut self, viewer_id: u32, now: Instant) -> Option<Outbound> {
        let (addr, header, mut slots) = {
            let viewer = self.clients.get_mut(&viewer_id)?;
            let header = SlotHeader {
                seq: viewer.next_seq(),
                server_time: viewer.server_time(now),
                client_time: viewer.client_tick,
            };
            let slots = std::mem::replace(&mut viewer.slots, SlotTable::new(0));
            (viewer.addr, header, slots)
        };

        let clients = &self.clients;
        let plan = plan_transmissions(&mut slots, header.seq, self.settings.policy, |player| {
            clients
                .get(&player)
                .filter(|c| c.is_ready())
                .map(|c| c.revision)
        });

        let entries = plan
            .iter()
            .map(|t| slot_entry(clients, *t, header.server_time));
        let mut w = BinaryWriter::from_buf(self.pool.take());
        let result = build_slot_update(&mut w, header, entries);

        if let Some(viewer) = self.clients.get_mut(&viewer_id) {
            viewer.slots = slots;
        }

        match result {
            Ok(()) => Some(Outbound {
                addr,
                payload: w.into_inner(),
            }),
            Err(e) => {
                warn!("Failed to build slot update for {}: {}", addr, e);
                self.pool.put(w.into_inner());
                None
            }
        }
    }

    /// Run one maintenance tick: evict idle clients, re-bucket ready ones
    /// into grid cells, then recompute and send every viewer's slots.
    pub fn maintain(&mut self, now: Instant, out: &mut PendingSends) -> TickSummary {
        self.tick_count += 1;
        let mut summary = TickSummary::default();

        let idle: Vec<u32> = self
            .clients
            .values()
            .filter(|c| !c.is_active(now, self.settings.inactivity_timeout))
            .map(|c| c.id)
            .collect();
        for id in idle {
            if let Some(client) = self.remove_client(id) {
                info!("Removing inactive client {} ({})", id, client.addr);
                summary.evicted += 1;
            }
        }

        let mut ids: Vec<u32> = self.clients.keys().copied().collect();
        ids.sort_unstable();

        let mut located = Vec::with_capacity(ids.len());
        for &id in &ids {
            match self.rebucket(id) {
                Bucket::Moved => {
                    summary.moved += 1;
                    located.push(id);
                }
                Bucket::Stayed => located.push(id),
                Bucket::OffGrid => {
                    summary.lookup_misses += 1;
                    // Without the index every ready player is a candidate.
                    if !self.settings.spatial_index {
                        located.push(id);
                    }
                }
                Bucket::NotReady => {}
            }
        }

        for id in located {
            self.recompute_slots(id);
            summary.recomputed += 1;
            if let Some(outbound) = self.render_slots(id, now) {
                out.datagrams.push(outbound);
            }
        }

        summary
    }

    /// Put a ready client into the cell under its position.
    fn rebucket(&mut self, id: u32) -> Bucket {
        let Some(client) = self.clients.get_mut(&id) else {
            return Bucket::NotReady;
        };
        let Some(vehicle) = client.vehicle.as_ref().filter(|_| client.is_ready()) else {
            return Bucket::NotReady;
        };
        let pos = vehicle.state.position();
        let mapped = map_to_grid(pos);

        let Some(cell) = self.grid.find_cell(mapped.x, mapped.y) else {
            warn!(
                "Could not find cell for client {} at ({:.1}, {:.1}) [map: ({:.1}, {:.1})]",
                id, pos.x, pos.y, mapped.x, mapped.y
            );
            return Bucket::OffGrid;
        };

        if client.cell == Some(cell.id) {
            return Bucket::Stayed;
        }
        debug!("Client {} is now in cell {}", id, cell.id);
        self.occupancy.relocate(id, client.cell, cell.id);
        client.cell = Some(cell.id);
        Bucket::Moved
    }

    /// Move a viewer's slot bindings one step toward its nearest players.
    pub fn recompute_slots(&mut self, viewer_id: u32) {
        let Some(viewer) = self.clients.get(&viewer_id) else {
            return;
        };
        let Some(origin) = viewer.position() else {
            return;
        };

        let candidate = |id: u32| {
            let c = self.clients.get(&id)?;
            if id == viewer_id || !c.is_ready() {
                return None;
            }
            Some(Candidate {
                id,
                position: c.position()?,
            })
        };

        let target = match (self.settings.spatial_index, viewer.cell) {
            (true, Some(cell)) => select_nearest(
                origin,
                self.occupancy.occupants(cell).filter_map(candidate),
                self.settings.visibility_radius,
                self.settings.max_visible_players,
            ),
            (true, None) => return,
            (false, _) => select_nearest(
                origin,
                self.clients.keys().copied().filter_map(candidate),
                self.settings.visibility_radius,
                self.settings.max_visible_players,
            ),
        };

        if let Some(viewer) = self.clients.get_mut(&viewer_id) {
            viewer.slots.retarget(&target);
        }
    }
}

/// Apply a parsed datagram to its client.
fn apply_update(client: &mut Client, update: ParsedUpdate) {
    if update.seq == u16::MAX {
        client.last_packet_seq = 0;
    }
    client.slots.acknowledge(update.echoed_seq);

    if let Some(blob) = update.channel_info {
        client.set_channel_info(blob);
    }
    if let Some((blob, info)) = update.player_info {
        client.set_player_info(blob, info.persona_name);
    }
    if let Some((blob, state)) = update.vehicle {
        if update.seq >= client.last_packet_seq {
            client.set_vehicle(blob, state);
        } else {
            trace!(
                "Stale vehicle state from {} ({} < {})",
                client.id, update.seq, client.last_packet_seq
            );
        }
    }
    client.last_packet_seq = update.seq;
}

fn slot_entry(clients: &HashMap<u32, Client>, transmission: Transmission, server_time: u16) -> SlotEntry<'_> {
    let (player, full) = match transmission {
        Transmission::Empty => return SlotEntry::Empty,
        Transmission::Unchanged => return SlotEntry::Unchanged,
        Transmission::Delta(player) => (player, false),
        Transmission::Full(player) => (player, true),
    };
    let Some(client) = clients.get(&player) else {
        return SlotEntry::Empty;
    };
    let (Some(channel_info), Some(player_info), Some(vehicle)) =
        (&client.channel_info, &client.player_info, &client.vehicle)
    else {
        return SlotEntry::Empty;
    };

    let time = server_time.wrapping_sub(client.ping_ms as u16);
    if full {
        SlotEntry::Full {
            channel_info: &channel_info[..],
            player_info: &player_info[..],
            vehicle: &vehicle.blob[..],
            time,
        }
    } else {
        SlotEntry::Delta {
            vehicle: &vehicle.blob[..],
            time,
        }
    }
}
