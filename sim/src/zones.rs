//! Per-zone audio parameters and their decay toward rest.
//!
//! A zone is one angular sector of a ring and drives one console track.
//! Hits push its volume to the maximum and move its spatial position;
//! every tick the values relax back on their own.

use ringsonic_shared::config::ZoneConfig;
use ringsonic_shared::vec3::{lerp, map_range};

/// Slack for comparing tick-clock differences against durations.
/// `(n + k) * dt - n * dt` can land a hair below `k * dt`.
const TIME_EPSILON: f64 = 1e-9;

/// Spatial inputs from a ring hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialHit {
    /// Ball's offset along the ring's local X, divided by the ring radius
    pub lateral: f64,
    /// Ring height above the plane's top face
    pub height: f64,
}

#[derive(Debug, Clone, Copy)]
struct ClearingDecay {
    started_at: f64,
    from: f64,
}

#[derive(Debug, Clone)]
pub struct Zone {
    pub volume: f64,
    pub azimuth: f64,
    pub elevation: f64,
    /// Start of the current volume decay; `None` when idle
    pub decay_started_at: Option<f64>,
    /// Last time a hit moved azimuth/elevation
    pub last_spatial_at: Option<f64>,
    clearing: Option<ClearingDecay>,
}

impl Zone {
    fn new(rest: f64) -> Self {
        Self {
            volume: 0.0,
            azimuth: rest,
            elevation: rest,
            decay_started_at: None,
            last_spatial_at: None,
            clearing: None,
        }
    }

    pub fn is_clearing(&self) -> bool {
        self.clearing.is_some()
    }
}

pub struct ZoneBank {
    config: ZoneConfig,
    zones: Vec<Zone>,
}

impl ZoneBank {
    pub fn new(config: ZoneConfig) -> Self {
        let zones = (0..config.count)
            .map(|_| Zone::new(config.spatial_rest))
            .collect();
        Self { config, zones }
    }

    pub fn config(&self) -> &ZoneConfig {
        &self.config
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn zone(&self, index: usize) -> Option<&Zone> {
        self.zones.get(index)
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Register a ring hit on `index`. Returns true if the spatial
    /// parameters moved (cooldown elapsed).
    pub fn trigger(&mut self, index: usize, now: f64, hit: SpatialHit) -> bool {
        let cfg = &self.config;
        let Some(zone) = self.zones.get_mut(index) else {
            tracing::warn!("Hit on unknown zone {}", index);
            return false;
        };

        zone.volume = cfg.max_volume;
        zone.decay_started_at = Some(now);
        zone.clearing = None;

        let cooled = zone
            .last_spatial_at
            .map_or(true, |t| now - t >= cfg.spatial_cooldown - TIME_EPSILON);
        if !cooled {
            return false;
        }

        zone.azimuth = map_range(hit.lateral, -1.0, 1.0, 0.0, cfg.spatial_max).clamp(0.0, 1.0);
        zone.elevation =
            map_range(hit.height, 0.0, cfg.elevation_range, 0.0, cfg.spatial_max).clamp(0.0, 1.0);
        zone.last_spatial_at = Some(now);
        true
    }

    /// Fade every zone to silence over the clear duration and recentre the
    /// spatial parameters immediately.
    pub fn begin_clear(&mut self, now: f64) {
        let rest = self.config.spatial_rest;
        for zone in &mut self.zones {
            zone.clearing = Some(ClearingDecay {
                started_at: now,
                from: zone.volume,
            });
            zone.decay_started_at = None;
            zone.last_spatial_at = None;
            zone.azimuth = rest;
            zone.elevation = rest;
        }
    }

    /// Advance every zone's decay to `now`.
    pub fn update(&mut self, now: f64, dt: f64) {
        let cfg = &self.config;
        let relax = (dt / cfg.spatial_decay).min(1.0);

        for zone in &mut self.zones {
            if let Some(clearing) = zone.clearing {
                let elapsed = now - clearing.started_at;
                if elapsed >= cfg.clear_decay_time - TIME_EPSILON {
                    zone.volume = 0.0;
                    zone.clearing = None;
                } else {
                    zone.volume = clearing.from * (1.0 - elapsed / cfg.clear_decay_time);
                }
            } else if let Some(started) = zone.decay_started_at {
                let elapsed = now - started;
                if elapsed >= cfg.decay_time - TIME_EPSILON {
                    zone.volume = 0.0;
                    zone.decay_started_at = None;
                } else {
                    zone.volume = cfg.max_volume * (1.0 - elapsed / cfg.decay_time);
                }
            }

            zone.azimuth = relax_toward(zone.azimuth, cfg.spatial_rest, relax, cfg.spatial_epsilon);
            zone.elevation =
                relax_toward(zone.elevation, cfg.spatial_rest, relax, cfg.spatial_epsilon);

            zone.volume = zone.volume.clamp(0.0, cfg.max_volume);
            zone.azimuth = zone.azimuth.clamp(0.0, 1.0);
            zone.elevation = zone.elevation.clamp(0.0, 1.0);
        }
    }
}

fn relax_toward(value: f64, rest: f64, t: f64, epsilon: f64) -> f64 {
    let next = lerp(value, rest, t);
    if (next - rest).abs() < epsilon {
        rest
    } else {
        next
    }
}
