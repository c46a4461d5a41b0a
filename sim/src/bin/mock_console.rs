//! Stand-in for the mixing console.
//!
//! Listens on the control port and prints what the toy sends, then reports
//! status back the way a console would:
//! - `/play` or `/stop` and `/master/volume` once per second
//! - every received `/track/n/volume` echoed back as that track's fader
//!
//! Usage: cargo run --bin mock-console -- [OPTIONS]
//!
//! Options:
//!   --listen ADDR     Control port to receive on (default: 127.0.0.1:8000)
//!   --reply-to ADDR   Toy status port (default: 127.0.0.1:9000)
//!   --duration S      Run time in seconds, 0 runs forever (default: 0)
//!   --master V        Reported master volume (default: 0.8)

use ringsonic_shared::protocol::{ControlAddress, StatusMessage};
use ringsonic_sim::osc::{decode_floats, encode_float};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;

/// Messages printed before going quiet
const PRINT_FIRST: u64 = 40;

// === Metrics ===

#[derive(Default)]
struct Metrics {
    datagrams: AtomicU64,
    messages: AtomicU64,
    volumes: AtomicU64,
    spatial: AtomicU64,
    master: AtomicU64,
    markers: AtomicU64,
    transport: AtomicU64,
    unknown: AtomicU64,
    errors: AtomicU64,
    replies: AtomicU64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Summary {
    elapsed_secs: f64,
    datagrams: u64,
    messages: u64,
    volumes: u64,
    spatial: u64,
    master: u64,
    markers: u64,
    transport: u64,
    unknown: u64,
    errors: u64,
    replies: u64,
}

impl Metrics {
    fn summary(&self, elapsed: Duration) -> Summary {
        Summary {
            elapsed_secs: elapsed.as_secs_f64(),
            datagrams: self.datagrams.load(Ordering::Relaxed),
            messages: self.messages.load(Ordering::Relaxed),
            volumes: self.volumes.load(Ordering::Relaxed),
            spatial: self.spatial.load(Ordering::Relaxed),
            master: self.master.load(Ordering::Relaxed),
            markers: self.markers.load(Ordering::Relaxed),
            transport: self.transport.load(Ordering::Relaxed),
            unknown: self.unknown.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            replies: self.replies.load(Ordering::Relaxed),
        }
    }
}

async fn reply(socket: &UdpSocket, to: SocketAddr, status: StatusMessage, metrics: &Metrics) {
    let (path, value) = status.to_wire();
    let sent = match encode_float(&path, value) {
        Ok(bytes) => socket.send_to(&bytes, to).await.is_ok(),
        Err(_) => false,
    };
    if sent {
        metrics.replies.fetch_add(1, Ordering::Relaxed);
    } else {
        metrics.errors.fetch_add(1, Ordering::Relaxed);
    }
}

// === Receive task ===

async fn receive(
    socket: Arc<UdpSocket>,
    reply_to: SocketAddr,
    playing: Arc<AtomicBool>,
    metrics: Arc<Metrics>,
) {
    let mut buf = vec![0u8; 4096];
    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                eprintln!("Receive error: {}", e);
                metrics.errors.fetch_add(1, Ordering::Relaxed);
                continue;
            }
        };
        metrics.datagrams.fetch_add(1, Ordering::Relaxed);

        let messages = match decode_floats(&buf[..len]) {
            Ok((messages, _)) => messages,
            Err(e) => {
                eprintln!("Undecodable datagram from {}: {:?}", from, e);
                metrics.errors.fetch_add(1, Ordering::Relaxed);
                continue;
            }
        };

        for msg in messages {
            let n = metrics.messages.fetch_add(1, Ordering::Relaxed);
            if n < PRINT_FIRST {
                println!("{:>6} {} {:.3}", n, msg.path, msg.value);
            } else if n == PRINT_FIRST {
                println!("... further messages are counted only");
            }

            match ControlAddress::parse(&msg.path) {
                Some(ControlAddress::TrackVolume(track)) => {
                    metrics.volumes.fetch_add(1, Ordering::Relaxed);
                    let echo = StatusMessage::TrackVolume {
                        track,
                        volume: msg.value.clamp(0.0, 1.0),
                    };
                    reply(&socket, reply_to, echo, &metrics).await;
                }
                Some(ControlAddress::Azimuth(_)) | Some(ControlAddress::Elevation(_)) => {
                    metrics.spatial.fetch_add(1, Ordering::Relaxed);
                }
                Some(ControlAddress::ReverbDryWet(_)) | Some(ControlAddress::MasterFx(_)) => {
                    metrics.master.fetch_add(1, Ordering::Relaxed);
                }
                Some(ControlAddress::Marker(_)) => {
                    metrics.markers.fetch_add(1, Ordering::Relaxed);
                }
                Some(ControlAddress::Play) => {
                    metrics.transport.fetch_add(1, Ordering::Relaxed);
                    playing.store(true, Ordering::Relaxed);
                    reply(&socket, reply_to, StatusMessage::Playing(true), &metrics).await;
                }
                Some(ControlAddress::Stop) => {
                    metrics.transport.fetch_add(1, Ordering::Relaxed);
                    playing.store(false, Ordering::Relaxed);
                    reply(&socket, reply_to, StatusMessage::Playing(false), &metrics).await;
                }
                Some(ControlAddress::TrackPan(_)) => {}
                None => {
                    metrics.unknown.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }
}

// === Main ===

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mut listen = "127.0.0.1:8000".to_string();
    let mut reply_to = "127.0.0.1:9000".to_string();
    let mut duration_secs: u64 = 0;
    let mut master_volume: f32 = 0.8;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--listen" => {
                i += 1;
                listen = args.get(i).cloned().unwrap_or(listen);
            }
            "--reply-to" => {
                i += 1;
                reply_to = args.get(i).cloned().unwrap_or(reply_to);
            }
            "--duration" => {
                i += 1;
                duration_secs = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(0);
            }
            "--master" => {
                i += 1;
                master_volume = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(0.8);
            }
            _ => {}
        }
        i += 1;
    }

    let reply_addr: SocketAddr = match reply_to.parse() {
        Ok(addr) => addr,
        Err(_) => {
            eprintln!("--reply-to expects host:port, got {}", reply_to);
            std::process::exit(1);
        }
    };
    let socket = match UdpSocket::bind(&listen).await {
        Ok(socket) => Arc::new(socket),
        Err(e) => {
            eprintln!("Cannot listen on {}: {}", listen, e);
            std::process::exit(1);
        }
    };

    println!("=== Mock Console ===");
    println!("Listening: {}", listen);
    println!("Replying to: {}", reply_addr);
    if duration_secs > 0 {
        println!("Duration: {}s", duration_secs);
    }
    println!();

    let metrics = Arc::new(Metrics::default());
    let playing = Arc::new(AtomicBool::new(true));
    let start = Instant::now();

    let receiver = tokio::spawn(receive(
        Arc::clone(&socket),
        reply_addr,
        Arc::clone(&playing),
        Arc::clone(&metrics),
    ));

    // Periodic transport and master reports, plus counters
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    loop {
        interval.tick().await;
        let elapsed = start.elapsed();
        if duration_secs > 0 && elapsed.as_secs() >= duration_secs {
            break;
        }

        let transport = StatusMessage::Playing(playing.load(Ordering::Relaxed));
        reply(&socket, reply_addr, transport, &metrics).await;
        reply(&socket, reply_addr, StatusMessage::MasterVolume(master_volume), &metrics).await;

        if elapsed.as_secs() % 5 == 0 {
            println!(
                "[{:3}s] msgs={}, volumes={}, spatial={}, markers={}, unknown={}, errors={}",
                elapsed.as_secs(),
                metrics.messages.load(Ordering::Relaxed),
                metrics.volumes.load(Ordering::Relaxed),
                metrics.spatial.load(Ordering::Relaxed),
                metrics.markers.load(Ordering::Relaxed),
                metrics.unknown.load(Ordering::Relaxed),
                metrics.errors.load(Ordering::Relaxed),
            );
        }
    }

    receiver.abort();

    println!();
    println!("=== Final Results ===");
    match serde_json::to_string_pretty(&metrics.summary(start.elapsed())) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Cannot format summary: {}", e),
    }
}
