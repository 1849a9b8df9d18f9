//! UDP relay server: receive loop and maintenance loop over one shared
//! registry.

use crate::config::Config;
use crate::pool::BufferPool;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::RwLock;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, trace, warn};

pub mod client;
pub mod state;

pub use client::{Client, VehicleSnapshot};
pub use state::{DropReason, Outbound, PacketOutcome, PendingSends, ServerState, TickSummary};

/// Registry shared between the loops and the spectator feed.
pub type SharedState = Arc<RwLock<ServerState>>;

/// Largest datagram accepted.
const RECV_BUFFER_LEN: usize = 2048;

/// A bound relay server, ready to run.
pub struct Server {
    socket: Arc<UdpSocket>,
    state: SharedState,
    pool: Arc<BufferPool>,
    tick_interval: Duration,
}

impl Server {
    /// Bind the UDP socket and build the registry.
    pub async fn bind(config: &Config) -> anyhow::Result<Self> {
        let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
        let socket = UdpSocket::bind(addr).await?;
        info!("Listening on udp://{}", socket.local_addr()?);

        let pool = Arc::new(BufferPool::default());
        let state = Arc::new(RwLock::new(ServerState::new(config, Arc::clone(&pool))));

        Ok(Self {
            socket: Arc::new(socket),
            state,
            pool,
            tick_interval: config.server.tick_interval(),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn state(&self) -> SharedState {
        Arc::clone(&self.state)
    }

    /// Start the maintenance loop and run the receive loop until the task is
    /// dropped.
    pub async fn run(self) -> anyhow::Result<()> {
        let maintenance = tokio::spawn(run_maintenance_loop(
            Arc::clone(&self.state),
            Arc::clone(&self.socket),
            Arc::clone(&self.pool),
            self.tick_interval,
        ));

        let result = run_receive_loop(self.state, self.socket, self.pool).await;
        maintenance.abort();
        result
    }
}

/// Run the relay server.
pub async fn run(config: Config) -> anyhow::Result<()> {
    Server::bind(&config).await?.run().await
}

async fn run_receive_loop(
    state: SharedState,
    socket: Arc<UdpSocket>,
    pool: Arc<BufferPool>,
) -> anyhow::Result<()> {
    let mut buf = vec![0u8; RECV_BUFFER_LEN];

    loop {
        let (len, addr) = match socket.recv_from(&mut buf).await {
            Ok(v) => v,
            Err(e) => {
                error!("UDP receive error: {}", e);
                continue;
            }
        };
        let data = Bytes::copy_from_slice(&buf[..len]);

        let mut pending = PendingSends::default();
        let outcome = {
            let mut state = state.write().await;
            state.handle_datagram(addr, data, Instant::now().into_std(), &mut pending)
        }; // Write lock released here

        match &outcome {
            PacketOutcome::Dropped(DropReason::UnknownPeer) => {
                trace!("Dropped {} bytes from unknown peer {}", len, addr)
            }
            PacketOutcome::Dropped(reason) => debug!("Dropped datagram from {}: {}", addr, reason),
            _ => {}
        }

        send_pending(&socket, &pool, pending).await;
    }
}

async fn run_maintenance_loop(
    state: SharedState,
    socket: Arc<UdpSocket>,
    pool: Arc<BufferPool>,
    tick_interval: Duration,
) {
    let start = Instant::now() + tick_interval;
    let mut ticker = interval_at(start, tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let mut pending = PendingSends::default();
        let summary = {
            let mut state = state.write().await;
            let summary = state.maintain(Instant::now().into_std(), &mut pending);
            if summary.evicted > 0 || summary.moved > 0 {
                debug!(
                    "Tick #{}: {} clients, {} evicted, {} moved cell",
                    state.tick_count,
                    state.clients.len(),
                    summary.evicted,
                    summary.moved
                );
            }
            summary
        }; // Write lock released here

        if summary.lookup_misses > 0 {
            debug!("{} clients off the grid this tick", summary.lookup_misses);
        }
        send_pending(&socket, &pool, pending).await;
    }
}

/// Send collected datagrams and return their buffers to the pool.
async fn send_pending(socket: &UdpSocket, pool: &BufferPool, pending: PendingSends) {
    for Outbound { addr, payload } in pending.datagrams {
        if let Err(e) = socket.send_to(&payload, addr).await {
            warn!("Failed to send {} bytes to {}: {}", payload.len(), addr, e);
        }
        pool.put(payload);
    }
}
