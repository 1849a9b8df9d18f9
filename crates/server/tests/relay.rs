//! Drives a running relay over real UDP sockets.

use glam::{DQuat, DVec3};
use protocol::VehicleState;
use protocol::carstate::{GROUND_FLAG, GroundState, Kinematics, Orientation, Profile};
use server::{Config, Server, SharedState};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

fn test_config() -> Config {
    let mut config = Config::default();
    config.server.bind = "127.0.0.1".to_string();
    config.server.port = 0;
    config.server.tick_interval_ms = 50;
    config
}

async fn start() -> (SocketAddr, SharedState) {
    let server = Server::bind(&test_config()).await.unwrap();
    let addr = server.local_addr().unwrap();
    let state = server.state();
    tokio::spawn(server.run());
    (addr, state)
}

fn handshake(tick: u16) -> Vec<u8> {
    let mut data = vec![0u8; 58];
    data[2] = 0x06;
    data[52..54].copy_from_slice(&tick.to_be_bytes());
    data
}

fn ready_datagram(seq: u16, name: &str, x: f64, y: f64) -> Vec<u8> {
    let mut info = vec![0u8; 48];
    info[1..1 + name.len()].copy_from_slice(name.as_bytes());
    let blob = VehicleState {
        sim_time: 0,
        flags: GROUND_FLAG,
        profile: Profile::Ground(GroundState {
            kinematics: Kinematics {
                position: DVec3::new(x, y, 0.0),
                ..Default::default()
            },
            orientation: Orientation::Quaternion(DQuat::IDENTITY),
            front_wheel_angle: 0.0,
            rear_wheel_angle: 0.0,
            light_flags: 0,
        }),
    }
    .encode();

    let mut data = vec![0u8; 16];
    data[0..2].copy_from_slice(&seq.to_be_bytes());
    for (kind, payload) in [(0x00u8, &[9u8, 9][..]), (0x01, &info[..]), (0x12, &blob[..])] {
        data.push(kind);
        data.push(payload.len() as u8);
        data.extend_from_slice(payload);
    }
    data.extend_from_slice(&[0u8; 5]);
    data
}

async fn recv(socket: &UdpSocket) -> Vec<u8> {
    let mut buf = vec![0u8; 2048];
    let len = timeout(Duration::from_secs(2), socket.recv(&mut buf))
        .await
        .expect("timed out waiting for datagram")
        .unwrap();
    buf.truncate(len);
    buf
}

async fn connect(server: SocketAddr) -> UdpSocket {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.connect(server).await.unwrap();
    socket
}

#[tokio::test]
async fn test_handshake_ack_over_udp() {
    let (addr, _state) = start().await;
    let client = connect(addr).await;

    client.send(&handshake(0x0102)).await.unwrap();
    let ack = recv(&client).await;
    assert_eq!(ack.len(), 11);
    assert_eq!(&ack[0..3], &[0x00, 0x00, 0x01]);
    assert_eq!(&ack[5..7], &[0x01, 0x02]);
    assert_eq!(&ack[7..], &[0x49, 0x26, 0x03, 0x01]);
}

#[tokio::test]
async fn test_unknown_peer_gets_nothing() {
    let (addr, state) = start().await;
    let client = connect(addr).await;

    client.send(&ready_datagram(1, "ghost", 1000.0, 1000.0)).await.unwrap();
    let mut buf = [0u8; 64];
    assert!(timeout(Duration::from_millis(200), client.recv(&mut buf)).await.is_err());
    assert!(state.read().await.clients.is_empty());
}

#[tokio::test]
async fn test_nearby_players_fill_each_others_slots() {
    let (addr, state) = start().await;
    let a = connect(addr).await;
    let b = connect(addr).await;

    for (socket, name, x) in [(&a, "alpha", 1000.0), (&b, "bravo", 1100.0)] {
        socket.send(&handshake(1)).await.unwrap();
        recv(socket).await;
        socket.send(&ready_datagram(1, name, x, 1000.0)).await.unwrap();
        let update = recv(socket).await;
        assert_eq!(update[2], 0x02);
    }

    let b_addr = b.local_addr().unwrap();
    let bound = timeout(Duration::from_secs(2), async {
        loop {
            {
                let state = state.read().await;
                let a_client = state.clients.values().find(|c| c.persona_name == "alpha");
                let b_id = state.client_by_addr(&b_addr).map(|c| c.id);
                if let (Some(a_client), Some(b_id)) = (a_client, b_id) {
                    if a_client.slots.contains(b_id) {
                        return;
                    }
                }
            }
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(bound.is_ok(), "B never entered A's slots");

    // A eventually receives an update carrying B's identity.
    let carries_bravo = timeout(Duration::from_secs(2), async {
        loop {
            let update = recv(&a).await;
            if update.windows(5).any(|w| w == b"bravo") {
                return;
            }
        }
    })
    .await;
    assert!(carries_bravo.is_ok());
}
