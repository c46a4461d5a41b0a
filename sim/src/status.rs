//! Console state reported back to the toy.
//!
//! `StatusCell` is the only structure shared between the listener task and
//! the simulation loop. Every update happens under one lock and readers get
//! a cloned snapshot, so a half-applied update is never visible.

use ringsonic_shared::protocol::StatusMessage;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Track pre-seeded in the volume map before any report arrives.
pub const PRESEEDED_TRACK: u32 = 11;

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteStatus {
    pub playing: bool,
    pub master_volume: f64,
    pub track_volumes: BTreeMap<u32, f64>,
    /// Number of publications so far
    pub version: u64,
}

impl Default for RemoteStatus {
    fn default() -> Self {
        let mut track_volumes = BTreeMap::new();
        track_volumes.insert(PRESEEDED_TRACK, 0.0);
        Self {
            playing: false,
            master_volume: 0.0,
            track_volumes,
            version: 0,
        }
    }
}

impl RemoteStatus {
    pub fn track_volume(&self, track: u32) -> f64 {
        self.track_volumes.get(&track).copied().unwrap_or(0.0)
    }
}

/// Edge reported to the simulation loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    PlaybackChanged { playing: bool },
}

#[derive(Clone, Default)]
pub struct StatusCell {
    inner: Arc<Mutex<RemoteStatus>>,
}

impl StatusCell {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RemoteStatus> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Apply a multi-field update atomically. Returns the new version.
    pub fn publish<F: FnOnce(&mut RemoteStatus)>(&self, update: F) -> u64 {
        let mut status = self.lock();
        update(&mut status);
        status.version += 1;
        status.version
    }

    pub fn snapshot(&self) -> RemoteStatus {
        self.lock().clone()
    }

    /// Fold one decoded status message in. Returns the play/stop edge, if
    /// this message changed the transport state.
    pub fn apply(&self, message: StatusMessage) -> Option<StatusEvent> {
        let mut edge = None;
        self.publish(|status| match message {
            StatusMessage::Playing(playing) => {
                if status.playing != playing {
                    status.playing = playing;
                    edge = Some(StatusEvent::PlaybackChanged { playing });
                }
            }
            StatusMessage::MasterVolume(v) => status.master_volume = v as f64,
            StatusMessage::TrackVolume { track, volume } => {
                status.track_volumes.insert(track, volume as f64);
            }
        });
        edge
    }
}
