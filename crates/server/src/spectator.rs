//! Live map feed: a periodic JSON snapshot of every ready player, pushed to
//! WebSocket subscribers.

use crate::config::SpectatorConfig;
use crate::server::{ServerState, SharedState};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::{MissedTickBehavior, interval};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{debug, error, info, warn};

/// One player on the map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpectatorEntry {
    pub name: String,
    pub x: i64,
    pub y: i64,
    pub rotation: i64,
}

/// Rounded position and heading of every ready client, ordered by id.
pub fn snapshot(state: &ServerState) -> Vec<SpectatorEntry> {
    let mut ids: Vec<u32> = state.clients.keys().copied().collect();
    ids.sort_unstable();

    ids.into_iter()
        .filter_map(|id| state.client(id))
        .filter(|c| c.is_ready())
        .filter_map(|c| {
            let vehicle = c.vehicle.as_ref()?;
            let pos = vehicle.state.position();
            Some(SpectatorEntry {
                name: c.persona_name.clone(),
                x: pos.x.round() as i64,
                y: pos.y.round() as i64,
                rotation: vehicle.state.rotation_degrees().round() as i64,
            })
        })
        .collect()
}

/// Accept the upgrade only when the `Origin` header matches exactly.
fn check_origin(req: &Request, allowed_origin: &str) -> Result<(), ErrorResponse> {
    let origin = req.headers().get("Origin").and_then(|v| v.to_str().ok());
    if origin == Some(allowed_origin) {
        return Ok(());
    }
    let mut response = ErrorResponse::new(Some("origin not allowed".to_string()));
    *response.status_mut() = StatusCode::FORBIDDEN;
    Err(response)
}

/// Run the spectator feed until the task is dropped.
pub async fn run(config: SpectatorConfig, state: SharedState) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.bind, config.port).parse()?;
    let listener = TcpListener::bind(&addr).await?;
    info!("Spectator feed on ws://{}", addr);

    let (tx, _rx) = broadcast::channel::<Arc<str>>(4);
    tokio::spawn(publish_snapshots(
        state,
        tx.clone(),
        Duration::from_millis(config.update_interval_ms),
    ));

    let allowed_origin: Arc<str> = config.allowed_origin.into();
    loop {
        let (stream, peer) = listener.accept().await?;
        let rx = tx.subscribe();
        let allowed_origin = Arc::clone(&allowed_origin);
        tokio::spawn(async move {
            if let Err(e) = handle_subscriber(stream, peer, rx, &allowed_origin).await {
                debug!("Spectator {} closed: {}", peer, e);
            }
        });
    }
}

async fn publish_snapshots(state: SharedState, tx: broadcast::Sender<Arc<str>>, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if tx.receiver_count() == 0 {
            continue;
        }

        let players = {
            let state = state.read().await;
            snapshot(&state)
        }; // Read lock released here

        match serde_json::to_string(&players) {
            Ok(json) => {
                let _ = tx.send(json.into());
            }
            Err(e) => error!("Failed to serialize spectator snapshot: {}", e),
        }
    }
}

async fn handle_subscriber(
    stream: TcpStream,
    peer: SocketAddr,
    mut rx: broadcast::Receiver<Arc<str>>,
    allowed_origin: &str,
) -> anyhow::Result<()> {
    let ws_stream = accept_hdr_async(stream, |req: &Request, resp: Response| {
        check_origin(req, allowed_origin).map(|()| resp)
    })
    .await?;
    info!("Spectator connected from {}", peer);

    let (mut write, mut read) = ws_stream.split();
    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!("Spectator socket error from {}: {}", peer, e);
                        break;
                    }
                    _ => {}
                }
            }
            update = rx.recv() => {
                match update {
                    Ok(json) => write.send(Message::text(json.to_string())).await?,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Spectator {} skipped {} snapshots", peer, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    info!("Spectator {} disconnected", peer);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::pool::BufferPool;
    use crate::server::Client;
    use bytes::Bytes;
    use glam::{DQuat, DVec3};
    use protocol::VehicleState;
    use protocol::carstate::{GROUND_FLAG, GroundState, Kinematics, Orientation, Profile};
    use std::time::Instant;

    fn parked_at(x: f64, y: f64) -> VehicleState {
        VehicleState {
            sim_time: 0,
            flags: GROUND_FLAG,
            profile: Profile::Ground(GroundState {
                kinematics: Kinematics {
                    position: DVec3::new(x, y, 0.0),
                    ..Default::default()
                },
                orientation: Orientation::Quaternion(DQuat::from_rotation_x(-0.5)),
                front_wheel_angle: 0.0,
                rear_wheel_angle: 0.0,
                light_flags: 0,
            }),
        }
    }

    #[test]
    fn test_snapshot_lists_ready_clients() {
        let mut state = ServerState::new(&Config::default(), Arc::new(BufferPool::default()));
        let now = Instant::now();

        let mut ready = Client::new(2, "127.0.0.1:5001".parse().unwrap(), 0, 14, now);
        ready.set_channel_info(Bytes::from_static(&[1]));
        ready.set_player_info(Bytes::from_static(&[2]), "Razor".into());
        ready.set_vehicle(Bytes::from_static(&[0, 0, 0, 0]), parked_at(1234.4, -88.6));
        state.clients.insert(2, ready);

        let pending = Client::new(1, "127.0.0.1:5000".parse().unwrap(), 0, 14, now);
        state.clients.insert(1, pending);

        let players = snapshot(&state);
        assert_eq!(
            players,
            vec![SpectatorEntry {
                name: "Razor".into(),
                x: 1234,
                y: -89,
                rotation: 29,
            }]
        );

        let json = serde_json::to_string(&players).unwrap();
        assert_eq!(json, r#"[{"name":"Razor","x":1234,"y":-89,"rotation":29}]"#);
    }

    #[test]
    fn test_origin_check() {
        let req = Request::builder()
            .uri("/ws")
            .header("Origin", "127.0.0.1")
            .body(())
            .unwrap();
        assert!(check_origin(&req, "127.0.0.1").is_ok());

        let req = Request::builder()
            .uri("/ws")
            .header("Origin", "http://evil.example")
            .body(())
            .unwrap();
        let err = check_origin(&req, "127.0.0.1").unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let req = Request::builder().uri("/ws").body(()).unwrap();
        assert!(check_origin(&req, "127.0.0.1").is_err());
    }
}
