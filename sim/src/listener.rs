use crate::osc::decode_floats;
use crate::status::{StatusCell, StatusEvent};
use ringsonic_shared::protocol::StatusMessage;
use std::io;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const MAX_DATAGRAM: usize = 4096;

/// Background receiver for console status datagrams.
pub struct StatusListener {
    socket: UdpSocket,
}

impl StatusListener {
    pub async fn bind(addr: &str) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn spawn(self, cell: StatusCell, events: mpsc::Sender<StatusEvent>) -> JoinHandle<()> {
        tokio::spawn(self.run(cell, events))
    }

    /// Receive until the simulation side hangs up.
    pub async fn run(self, cell: StatusCell, events: mpsc::Sender<StatusEvent>) {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        tracing::info!("Status listener on {:?}", self.socket.local_addr());

        loop {
            let (len, from) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    tracing::warn!("Status receive failed: {}", e);
                    continue;
                }
            };

            for edge in handle_datagram(&buf[..len], from, &cell) {
                tracing::info!("Console transport changed: {:?}", edge);
                if events.send(edge).await.is_err() {
                    tracing::info!("Status listener ended");
                    return;
                }
            }
        }
    }
}

/// Decode one datagram into `cell`. Returns transport edges in arrival order.
pub fn handle_datagram(buf: &[u8], from: SocketAddr, cell: &StatusCell) -> Vec<StatusEvent> {
    let (messages, rejected) = match decode_floats(buf) {
        Ok(decoded) => decoded,
        Err(e) => {
            tracing::warn!("Dropping undecodable datagram from {}: {:?}", from, e);
            return Vec::new();
        }
    };

    for path in rejected {
        tracing::warn!("Dropping {} from {}: no numeric argument", path, from);
    }

    let mut edges = Vec::new();
    for msg in messages {
        match StatusMessage::parse(&msg.path, msg.value) {
            Ok(status) => {
                if let Some(edge) = cell.apply(status) {
                    edges.push(edge);
                }
            }
            Err(e) => tracing::warn!("Dropping status from {}: {}", from, e),
        }
    }
    edges
}
