//! Outbound control stream with per-address rate limiting.

use crate::osc::encode_float;
use ringsonic_shared::config::SenderConfig;
use ringsonic_shared::protocol::ControlAddress;
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;

/// Fire-and-forget datagram sink.
pub trait ControlTransport: Send {
    fn transmit(&mut self, path: &str, value: f32) -> io::Result<()>;
}

/// Non-blocking UDP transport to the console.
pub struct UdpTransport {
    socket: tokio::net::UdpSocket,
    target: SocketAddr,
}

impl UdpTransport {
    pub async fn bind(local: &str, target: SocketAddr) -> io::Result<Self> {
        let socket = tokio::net::UdpSocket::bind(local).await?;
        Ok(Self { socket, target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

impl ControlTransport for UdpTransport {
    fn transmit(&mut self, path: &str, value: f32) -> io::Result<()> {
        let bytes = encode_float(path, value)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        self.socket.try_send_to(&bytes, self.target)?;
        Ok(())
    }
}

/// Logs every message instead of sending it.
#[derive(Default)]
pub struct LogTransport;

impl ControlTransport for LogTransport {
    fn transmit(&mut self, path: &str, value: f32) -> io::Result<()> {
        tracing::debug!("(dry run) {} {:.3}", path, value);
        Ok(())
    }
}

/// Records sends in memory for assertions.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct MemoryTransport {
    pub sent: std::sync::Arc<std::sync::Mutex<Vec<(String, f32)>>>,
}

#[cfg(test)]
impl MemoryTransport {
    pub fn messages(&self) -> Vec<(String, f32)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn count(&self, path: &str) -> usize {
        self.messages().iter().filter(|(p, _)| p == path).count()
    }

    pub fn last(&self, path: &str) -> Option<f32> {
        self.messages()
            .iter()
            .rev()
            .find(|(p, _)| p == path)
            .map(|(_, v)| *v)
    }

    pub fn clear(&self) {
        if let Ok(mut s) = self.sent.lock() {
            s.clear();
        }
    }
}

#[cfg(test)]
impl ControlTransport for MemoryTransport {
    fn transmit(&mut self, path: &str, value: f32) -> io::Result<()> {
        if let Ok(mut s) = self.sent.lock() {
            s.push((path.to_string(), value));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct LastSent {
    value: f64,
    at: f64,
}

/// Throttles and dedupes outbound controls per address.
pub struct RateLimitedSender {
    transport: Box<dyn ControlTransport>,
    config: SenderConfig,
    channels: HashMap<ControlAddress, LastSent>,
    sent: u64,
    failed: u64,
}

impl RateLimitedSender {
    pub fn new(transport: Box<dyn ControlTransport>, config: SenderConfig) -> Self {
        Self {
            transport,
            config,
            channels: HashMap::new(),
            sent: 0,
            failed: 0,
        }
    }

    /// Send `value` to `address` if the channel's gate allows it.
    /// Returns true if a datagram was handed to the transport.
    pub fn send(&mut self, address: ControlAddress, value: f64, now: f64) -> bool {
        if address.is_rate_limited() {
            if let Some(last) = self.channels.get(&address) {
                if !self.should_send(&address, last, value, now) {
                    return false;
                }
            }
            self.channels.insert(address, LastSent { value, at: now });
        }
        self.transmit(address, value);
        true
    }

    fn should_send(&self, address: &ControlAddress, last: &LastSent, value: f64, now: f64) -> bool {
        if (value - last.value).abs() > self.config.threshold {
            return true;
        }
        if now - last.at > self.config.interval {
            return true;
        }
        match address.rest_floor() {
            Some(floor) => {
                let floor = floor as f64;
                value == floor && last.value != floor
            }
            None => false,
        }
    }

    fn transmit(&mut self, address: ControlAddress, value: f64) {
        let path = address.to_path();
        match self.transport.transmit(&path, value as f32) {
            Ok(()) => self.sent += 1,
            Err(e) => {
                self.failed += 1;
                tracing::warn!("Failed to send {} {:.3}: {}", path, value, e);
            }
        }
    }

    /// Last value handed out on a rate-limited channel.
    pub fn last_sent(&self, address: ControlAddress) -> Option<f64> {
        self.channels.get(&address).map(|l| l.value)
    }

    pub fn sent_count(&self) -> u64 {
        self.sent
    }

    pub fn failed_count(&self) -> u64 {
        self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingTransport;

    impl ControlTransport for FailingTransport {
        fn transmit(&mut self, _path: &str, _value: f32) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "nobody home"))
        }
    }

    fn setup() -> (RateLimitedSender, MemoryTransport) {
        let transport = MemoryTransport::default();
        let sender = RateLimitedSender::new(Box::new(transport.clone()), SenderConfig::default());
        (sender, transport)
    }

    const VOL: ControlAddress = ControlAddress::TrackVolume(2);

    #[test]
    fn first_send_always_goes_out() {
        let (mut sender, transport) = setup();
        assert!(sender.send(VOL, 0.0, 0.0));
        assert_eq!(transport.count("/track/2/volume"), 1);
    }

    #[test]
    fn small_delta_within_interval_sends_once() {
        let (mut sender, transport) = setup();
        assert!(sender.send(VOL, 0.5, 1.0));
        assert!(!sender.send(VOL, 0.505, 1.05));
        assert_eq!(transport.count("/track/2/volume"), 1);
        assert_eq!(transport.last("/track/2/volume"), Some(0.5));
    }

    #[test]
    fn large_delta_sends_immediately() {
        let (mut sender, transport) = setup();
        sender.send(VOL, 0.5, 1.0);
        assert!(sender.send(VOL, 0.45, 1.01));
        assert_eq!(transport.count("/track/2/volume"), 2);
    }

    #[test]
    fn interval_forces_resend() {
        let (mut sender, transport) = setup();
        sender.send(VOL, 0.5, 1.0);
        assert!(sender.send(VOL, 0.5, 1.25));
        assert_eq!(transport.count("/track/2/volume"), 2);
    }

    #[test]
    fn rest_floor_is_never_dropped() {
        let (mut sender, transport) = setup();
        sender.send(VOL, 0.005, 1.0);
        assert!(sender.send(VOL, 0.0, 1.01));
        assert_eq!(transport.last("/track/2/volume"), Some(0.0));
        // Already at the floor: gated again
        assert!(!sender.send(VOL, 0.0, 1.02));
        assert_eq!(transport.count("/track/2/volume"), 2);
    }

    #[test]
    fn no_floor_rule_for_spatial_channels() {
        let (mut sender, _transport) = setup();
        let az = ControlAddress::Azimuth(2);
        sender.send(az, 0.005, 1.0);
        assert!(!sender.send(az, 0.0, 1.01));
    }

    #[test]
    fn channels_are_independent() {
        let (mut sender, transport) = setup();
        sender.send(ControlAddress::TrackVolume(2), 0.5, 1.0);
        assert!(sender.send(ControlAddress::TrackVolume(3), 0.5, 1.0));
        assert_eq!(transport.messages().len(), 2);
    }

    #[test]
    fn unlimited_channels_always_send() {
        let (mut sender, transport) = setup();
        for _ in 0..3 {
            assert!(sender.send(ControlAddress::Marker(1), 1.0, 1.0));
            assert!(sender.send(ControlAddress::TrackPan(2), 0.5, 1.0));
        }
        assert_eq!(transport.count("/marker/1/play"), 3);
        assert_eq!(transport.count("/track/2/pan"), 3);
    }

    #[test]
    fn transport_failure_is_swallowed() {
        let mut sender =
                RateLimitedSender::new(Box::new(FailingTransport), SenderConfig::default());
        assert!(sender.send(VOL, 0.5, 0.0));
        assert_eq!(sender.failed_count(), 1);
        assert_eq!(sender.sent_count(), 0);
        // The gate still advanced
        assert_eq!(sender.last_sent(VOL), Some(0.5));
        assert!(!sender.send(VOL, 0.5, 0.01));
    }
}
