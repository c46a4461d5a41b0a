//! Integration tests for the toy's network edges.
//!
//! These tests use real UDP sockets on localhost to exercise the status
//! listener, the outbound sender and the running sim loop end to end.

use ringsonic_shared::config::{SenderConfig, ToyConfig};
use ringsonic_shared::protocol::ControlAddress;
use ringsonic_sim::feedback::TraceRenderer;
use ringsonic_sim::game_loop::{run_sim_loop, SimCommand};
use ringsonic_sim::listener::StatusListener;
use ringsonic_sim::osc::{decode_floats, encode_float};
use ringsonic_sim::sender::{RateLimitedSender, UdpTransport};
use ringsonic_sim::state::Simulation;
use ringsonic_sim::status::{RemoteStatus, StatusCell, StatusEvent};
use rosc::{OscMessage, OscPacket, OscType};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Start a status listener on a random port.
async fn start_listener() -> (
    SocketAddr,
    StatusCell,
    mpsc::Receiver<StatusEvent>,
    JoinHandle<()>,
) {
    let listener = StatusListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind listener");
    let addr = listener.local_addr().unwrap();
    let cell = StatusCell::new();
    let (tx, rx) = mpsc::channel(16);
    let handle = listener.spawn(cell.clone(), tx);
    (addr, cell, rx, handle)
}

async fn console_socket() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").await.unwrap()
}

async fn send_float(socket: &UdpSocket, to: SocketAddr, path: &str, value: f32) {
    let bytes = encode_float(path, value).unwrap();
    socket.send_to(&bytes, to).await.unwrap();
}

/// Poll the cell until `done` holds or the timeout passes.
async fn wait_for_status<F>(cell: &StatusCell, timeout: Duration, done: F) -> RemoteStatus
where
    F: Fn(&RemoteStatus) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let snapshot = cell.snapshot();
        if done(&snapshot) || tokio::time::Instant::now() >= deadline {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Read the next decoded message with a timeout.
async fn recv_float(socket: &UdpSocket, timeout: Duration) -> Option<(String, f32)> {
    let mut buf = vec![0u8; 4096];
    let (len, _) = tokio::time::timeout(timeout, socket.recv_from(&mut buf))
        .await
        .ok()?
        .ok()?;
    let (messages, _) = decode_floats(&buf[..len]).ok()?;
    messages.into_iter().next().map(|m| (m.path, m.value))
}

/// Collect messages until `path` shows up. Returns everything seen.
async fn recv_until(socket: &UdpSocket, path: &str, timeout: Duration) -> Vec<(String, f32)> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut seen = Vec::new();
    while tokio::time::Instant::now() < deadline {
        if let Some(msg) = recv_float(socket, Duration::from_millis(200)).await {
            let found = msg.0 == path;
            seen.push(msg);
            if found {
                break;
            }
        }
    }
    seen
}

#[tokio::test]
async fn test_listener_publishes_snapshot() {
    let (addr, cell, _rx, _handle) = start_listener().await;
    let console = console_socket().await;

    send_float(&console, addr, "/master/volume", 0.6).await;
    send_float(&console, addr, "/track/4/volume", 0.3).await;

    let status = wait_for_status(&cell, Duration::from_secs(2), |s| {
        s.track_volumes.contains_key(&4) && s.master_volume > 0.0
    })
    .await;
    assert!((status.master_volume - 0.6).abs() < 1e-6);
    assert!((status.track_volume(4) - 0.3).abs() < 1e-6);
    assert!(status.track_volumes.contains_key(&11));
    assert!(status.version >= 2);
}

#[tokio::test]
async fn test_play_stop_edges_are_reported_once() {
    let (addr, _cell, mut rx, _handle) = start_listener().await;
    let console = console_socket().await;

    send_float(&console, addr, "/play", 1.0).await;
    let first = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
    assert_eq!(
        first.unwrap(),
        Some(StatusEvent::PlaybackChanged { playing: true })
    );

    // Repeated play is not an edge; the stop is
    send_float(&console, addr, "/play", 1.0).await;
    send_float(&console, addr, "/stop", 1.0).await;
    let second = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
    assert_eq!(
        second.unwrap(),
        Some(StatusEvent::PlaybackChanged { playing: false })
    );
}

#[tokio::test]
async fn test_listener_survives_malformed_input() {
    let (addr, cell, _rx, handle) = start_listener().await;
    let console = console_socket().await;

    console.send_to(b"definitely not osc", addr).await.unwrap();
    send_float(&console, addr, "/track/abc/volume", 0.9).await;
    send_float(&console, addr, "/mixer/unknown", 0.9).await;
    let text_arg = rosc::encoder::encode(&OscPacket::Message(OscMessage {
        addr: "/master/volume".to_string(),
        args: vec![OscType::String("loud".to_string())],
    }))
    .unwrap();
    console.send_to(&text_arg, addr).await.unwrap();

    send_float(&console, addr, "/master/volume", 0.25).await;

    let status = wait_for_status(&cell, Duration::from_secs(2), |s| s.master_volume > 0.0).await;
    assert!((status.master_volume - 0.25).abs() < 1e-6);
    assert_eq!(status.track_volumes.len(), 1);
    assert!(!handle.is_finished());
}

#[tokio::test]
async fn test_sender_gates_over_udp() {
    let console = console_socket().await;
    let target = console.local_addr().unwrap();
    let transport = UdpTransport::bind("127.0.0.1:0", target).await.unwrap();
    let mut sender = RateLimitedSender::new(Box::new(transport), SenderConfig::default());

    assert!(sender.send(ControlAddress::TrackVolume(2), 0.5, 1.0));
    assert!(!sender.send(ControlAddress::TrackVolume(2), 0.505, 1.05));
    assert!(sender.send(ControlAddress::Marker(1), 1.0, 1.05));

    let first = recv_float(&console, Duration::from_secs(2)).await;
    assert_eq!(first, Some(("/track/2/volume".to_string(), 0.5)));
    let second = recv_float(&console, Duration::from_secs(2)).await;
    assert_eq!(second, Some(("/marker/1/play".to_string(), 1.0)));
    assert_eq!(recv_float(&console, Duration::from_millis(100)).await, None);
    assert_eq!(sender.sent_count(), 2);
}

#[tokio::test]
async fn test_sim_loop_end_to_end() {
    let console = console_socket().await;
    let console_addr = console.local_addr().unwrap();

    let (listen_addr, cell, status_rx, listener_handle) = start_listener().await;
    let transport = UdpTransport::bind("127.0.0.1:0", console_addr).await.unwrap();
    let sim = Simulation::new(ToyConfig::default(), 12345, Box::new(transport), cell.clone());

    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let loop_handle = tokio::spawn(run_sim_loop(
        cmd_rx,
        status_rx,
        sim,
        Box::new(TraceRenderer::new()),
    ));

    // Startup state reaches the console
    let startup = recv_until(&console, "/track/2/pan", Duration::from_secs(2)).await;
    assert!(startup.contains(&("/track/2/pan".to_string(), 0.5)));

    cmd_tx.send(SimCommand::AddBall).await.unwrap();
    cmd_tx.send(SimCommand::Play).await.unwrap();
    let seen = recv_until(&console, "/play", Duration::from_secs(2)).await;
    assert_eq!(seen.last(), Some(&("/play".to_string(), 1.0)));

    cmd_tx.send(SimCommand::Release).await.unwrap();
    let seen = recv_until(&console, "/marker/2/play", Duration::from_secs(2)).await;
    assert_eq!(seen.last(), Some(&("/marker/2/play".to_string(), 1.0)));

    // Console reports play then stop; the loop freezes the field
    send_float(&console, listen_addr, "/play", 1.0).await;
    send_float(&console, listen_addr, "/stop", 1.0).await;
    wait_for_status(&cell, Duration::from_secs(2), |s| s.version >= 2 && !s.playing).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    listener_handle.abort();
    drop(cmd_tx);
    let sim = tokio::time::timeout(Duration::from_secs(2), loop_handle)
        .await
        .expect("sim loop did not stop")
        .unwrap();

    assert!(sim.tick_count() > 0);
    assert!(sim.ring_hits() > 0 || sim.engine().ball_count() > 0);
    assert!(sim.feedback().is_fading());
}
