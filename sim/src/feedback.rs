//! Visual feedback pushed to an external renderer every tick.
//!
//! The simulation never draws anything itself. It owns a handful of
//! presentation-only values (ring pulse and glow, the hemisphere fade, the
//! clear fade) and reports entity state through the `Renderer` trait.

use crate::engine::CollisionEngine;
use crate::entity::{EntityId, Ring};
use crate::status::RemoteStatus;
use crate::zones::ZoneBank;
use rand::Rng;
use ringsonic_shared::config::FeedbackConfig;
use ringsonic_shared::vec3::{lerp, lerp_vec, map_range, vec3, Vec3};
use std::f64::consts::{FRAC_PI_2, PI};

/// RGB in 0..=1
pub type Color = Vec3;

pub const WHITE: Color = Vec3 { x: 1.0, y: 1.0, z: 1.0 };
pub const BLACK: Color = Vec3 { x: 0.0, y: 0.0, z: 0.0 };
const BLUE: Color = Vec3 { x: 0.0, y: 0.0, z: 1.0 };
const BALL_IDLE: Color = Vec3 { x: 0.8, y: 0.8, z: 0.8 };

const ZONE_COLORS: [Color; 9] = [
    Vec3 { x: 0.5, y: 0.0, z: 0.0 },
    Vec3 { x: 0.0, y: 0.5, z: 0.0 },
    Vec3 { x: 0.0, y: 0.0, z: 0.5 },
    Vec3 { x: 1.0, y: 0.84, z: 0.0 },
    Vec3 { x: 0.88, y: 1.0, z: 1.0 },
    Vec3 { x: 1.0, y: 0.75, z: 0.8 },
    Vec3 { x: 0.65, y: 0.16, z: 0.16 },
    Vec3 { x: 0.58, y: 0.44, z: 0.86 },
    Vec3 { x: 0.8, y: 0.8, z: 0.8 },
];

const HEMISPHERE_CENTER: Vec3 = Vec3 { x: 0.0, y: 5.0, z: 0.0 };
const SOUND_SOURCE_MIN_OPACITY: f64 = 0.1;
const SMOOTHING: f64 = 0.1;

const SPLIT_PARTICLES: usize = 5;
const IMPACT_PARTICLES: usize = 3;
/// Ball-ball impulse needed before sparks fly
const IMPACT_PARTICLE_MIN: f64 = 0.5;
const PARTICLE_RADIUS: f64 = 0.02;
const PARTICLE_LIFESPAN: f64 = 0.6;
const PARTICLE_SPEED: f64 = 2.0;

/// Colour for a ring zone, cycling if there are more zones than colours.
pub fn zone_color(zone: usize) -> Color {
    ZONE_COLORS[zone % ZONE_COLORS.len()]
}

/// What the renderer is being told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisualId {
    Ball(EntityId),
    Ring(usize),
    RingGlow(usize),
    Ground,
    Hemisphere,
    /// Marker for one console track
    SoundSource(u32),
    MasterLight,
}

/// Drawing surface the simulation pushes state to.
pub trait Renderer {
    fn set_entity_transform(&mut self, id: VisualId, position: Vec3, orientation: Vec3, scale: f64);
    fn set_entity_visual(&mut self, id: VisualId, color: Color, opacity: f64, visible: bool);
    fn spawn_particle(
        &mut self,
        position: Vec3,
        velocity: Vec3,
        radius: f64,
        color: Color,
        lifespan: f64,
    );
    fn remove_entity(&mut self, id: VisualId);
    fn set_camera_target(&mut self, target: Vec3);
    /// Drop every live particle
    fn clear_particles(&mut self) {}
}

/// Renderer that only logs. Used headless and in dry runs.
#[derive(Default)]
pub struct TraceRenderer {
    frames: u64,
}

impl TraceRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Renderer for TraceRenderer {
    fn set_entity_transform(
        &mut self,
        id: VisualId,
        position: Vec3,
        _orientation: Vec3,
        scale: f64,
    ) {
        tracing::trace!(
            "{:?} at ({:.2}, {:.2}, {:.2}) x{:.2}",
            id,
            position.x,
            position.y,
            position.z,
            scale
        );
    }

    fn set_entity_visual(&mut self, id: VisualId, _color: Color, opacity: f64, visible: bool) {
        tracing::trace!("{:?} opacity {:.2} visible {}", id, opacity, visible);
    }

    fn spawn_particle(
        &mut self,
        position: Vec3,
        _velocity: Vec3,
        _radius: f64,
        _color: Color,
        lifespan: f64,
    ) {
        tracing::trace!(
            "Particle at ({:.2}, {:.2}, {:.2}) for {:.1}s",
            position.x,
            position.y,
            position.z,
            lifespan
        );
    }

    fn remove_entity(&mut self, id: VisualId) {
        tracing::debug!("Removed {:?}", id);
    }

    fn set_camera_target(&mut self, _target: Vec3) {
        self.frames += 1;
    }
}

#[derive(Debug, Clone, Copy)]
struct Fade {
    started_at: f64,
    from: f64,
}

/// Presentation state owned by the simulation loop.
pub struct Feedback {
    config: FeedbackConfig,
    hemisphere_opacity: f64,
    hemisphere_fade: Option<Fade>,
    clear_started_at: Option<f64>,
    particles_pending_clear: bool,
    sound_source_opacity: Vec<f64>,
}

impl Feedback {
    pub fn new(config: FeedbackConfig, zone_count: usize) -> Self {
        Self {
            config,
            hemisphere_opacity: 0.0,
            hemisphere_fade: None,
            clear_started_at: None,
            particles_pending_clear: false,
            sound_source_opacity: vec![SOUND_SOURCE_MIN_OPACITY; zone_count],
        }
    }

    pub fn hemisphere_opacity(&self) -> f64 {
        self.hemisphere_opacity
    }

    pub fn is_fading(&self) -> bool {
        self.hemisphere_fade.is_some()
    }

    /// Pulse and light up a ring that was just hit.
    pub fn ring_hit(&self, ring: &mut Ring, speed: f64) {
        ring.target_scale = self.config.pulse_scale;
        ring.glow = (speed / self.config.glow_speed_divisor).min(self.config.glow_max);
    }

    /// Ease ring scale toward its target and let the target and glow relax.
    pub fn relax_rings(&self, rings: &mut [Ring], dt: f64) {
        for ring in rings {
            ring.scale = lerp(ring.scale, ring.target_scale, self.config.pulse_lerp);
            ring.target_scale = lerp(ring.target_scale, 1.0, self.config.pulse_relax);
            ring.glow = (ring.glow - self.config.glow_fade_speed * dt).max(0.0);
        }
    }

    /// Console stopped: fade the hemisphere out from wherever it is.
    pub fn playback_stopped(&mut self, now: f64) {
        self.hemisphere_fade = Some(Fade {
            started_at: now,
            from: self.hemisphere_opacity,
        });
    }

    pub fn playback_started(&mut self) {
        self.hemisphere_fade = None;
    }

    pub fn begin_clear(&mut self, now: f64) {
        self.clear_started_at = Some(now);
        self.particles_pending_clear = true;
    }

    /// Advance the hemisphere toward its target for this tick.
    pub fn update_hemisphere(&mut self, now: f64, status: &RemoteStatus) -> f64 {
        if let Some(fade) = self.hemisphere_fade {
            let progress = (now - fade.started_at) / self.config.hemisphere_fade;
            if progress >= 1.0 {
                self.hemisphere_fade = None;
                self.hemisphere_opacity = 0.0;
            } else {
                self.hemisphere_opacity = lerp(fade.from, 0.0, progress.max(0.0));
            }
        } else if status.playing {
            let level = status.master_volume.clamp(0.0, 1.0);
            let target = lerp(0.0, self.config.hemisphere_max_opacity, level);
            self.hemisphere_opacity = lerp(self.hemisphere_opacity, target, SMOOTHING);
        } else {
            self.hemisphere_opacity = 0.0;
        }
        self.hemisphere_opacity
    }

    /// Opacity multiplier for rings and ground during the clear animation.
    pub fn scene_opacity(&mut self, now: f64) -> f64 {
        let Some(start) = self.clear_started_at else {
            return 1.0;
        };
        let elapsed = now - start;
        let out = self.config.clear_fade_out;
        let back = self.config.clear_fade_in;
        if elapsed < out {
            1.0 - elapsed / out
        } else if elapsed < out + back {
            (elapsed - out) / back
        } else {
            self.clear_started_at = None;
            1.0
        }
    }

    /// Sparks where a ball split.
    pub fn split_particles(
        &self,
        at: Vec3,
        children: usize,
        color: Color,
        rng: &mut impl Rng,
        renderer: &mut dyn Renderer,
    ) {
        for _ in 0..children * SPLIT_PARTICLES {
            let velocity = random_spray(rng) * PARTICLE_SPEED;
            renderer.spawn_particle(at, velocity, PARTICLE_RADIUS, color, PARTICLE_LIFESPAN);
        }
    }

    /// Sparks for a hard ball-ball knock. Soft touches make none.
    pub fn impact_particles(
        &self,
        at: Vec3,
        impulse: f64,
        rng: &mut impl Rng,
        renderer: &mut dyn Renderer,
    ) {
        if impulse <= IMPACT_PARTICLE_MIN {
            return;
        }
        for _ in 0..IMPACT_PARTICLES {
            let velocity = random_spray(rng) * (PARTICLE_SPEED * 0.5);
            renderer.spawn_particle(at, velocity, PARTICLE_RADIUS, WHITE, PARTICLE_LIFESPAN * 0.5);
        }
    }

    /// Push the whole scene to `renderer`.
    pub fn render(
        &mut self,
        now: f64,
        engine: &CollisionEngine,
        zones: &ZoneBank,
        status: &RemoteStatus,
        renderer: &mut dyn Renderer,
    ) {
        if std::mem::take(&mut self.particles_pending_clear) {
            renderer.clear_particles();
        }
        let scene_opacity = self.scene_opacity(now);

        let ground = engine.ground();
        renderer.set_entity_transform(VisualId::Ground, ground.center, ground.normal, 1.0);
        renderer.set_entity_visual(VisualId::Ground, WHITE * 0.3, scene_opacity, true);

        let mut centroid = Vec3::ZERO;
        for (index, ring) in engine.rings().iter().enumerate() {
            let id = VisualId::Ring(index);
            renderer.set_entity_transform(id, ring.pos, ring.heading, ring.scale);
            renderer.set_entity_visual(id, WHITE, scene_opacity, true);
            renderer.set_entity_transform(VisualId::RingGlow(index), ring.pos, ring.up, ring.scale);
            let glow = ring.glow * scene_opacity;
            renderer.set_entity_visual(VisualId::RingGlow(index), WHITE, glow, ring.glow > 0.0);
            centroid += ring.pos;
        }
        if !engine.rings().is_empty() {
            centroid = centroid * (1.0 / engine.rings().len() as f64);
        }

        for ball in engine.balls() {
            let color = ball.zone.map(zone_color).unwrap_or(BALL_IDLE);
            renderer.set_entity_transform(VisualId::Ball(ball.id), ball.pos, ball.vel, ball.radius);
            renderer.set_entity_visual(VisualId::Ball(ball.id), color, 1.0, true);
        }

        let hemisphere = self.update_hemisphere(now, status);
        let shade = if self.config.hemisphere_max_opacity > 0.0 {
            hemisphere / self.config.hemisphere_max_opacity
        } else {
            0.0
        };
        renderer.set_entity_transform(
            VisualId::Hemisphere,
            HEMISPHERE_CENTER,
            Vec3::Y,
            self.config.hemisphere_radius,
        );
        renderer.set_entity_visual(
            VisualId::Hemisphere,
            lerp_vec(BLACK, WHITE, shade),
            hemisphere,
            hemisphere > 0.0,
        );

        self.render_sound_sources(zones, status, renderer);

        let light = 0.5 + status.master_volume.clamp(0.0, 1.0) / 2.0;
        renderer.set_entity_visual(VisualId::MasterLight, WHITE * light, 1.0, true);

        renderer.set_camera_target(centroid);
    }

    fn render_sound_sources(
        &mut self,
        zones: &ZoneBank,
        status: &RemoteStatus,
        renderer: &mut dyn Renderer,
    ) {
        let config = zones.config();
        for (index, zone) in zones.zones().iter().enumerate() {
            let track = config.track_for_zone(index);
            let position = sound_source_position(
                zone.azimuth,
                zone.elevation,
                config.spatial_max,
                self.config.hemisphere_radius,
            );
            let fader = status.track_volume(track).clamp(0.0, 1.0);
            let brightness = (fader * 1.2).min(1.0);

            let Some(opacity) = self.sound_source_opacity.get_mut(index) else {
                continue;
            };
            *opacity = lerp(*opacity, fader.max(SOUND_SOURCE_MIN_OPACITY), SMOOTHING);

            let id = VisualId::SoundSource(track);
            renderer.set_entity_transform(id, position, Vec3::Y, 1.0 + brightness);
            let color = lerp_vec(BLUE, WHITE, brightness);
            renderer.set_entity_visual(id, color, *opacity, status.playing);
        }
    }
}

/// Point on the hemisphere for normalized azimuth/elevation. Azimuth
/// 0..`azimuth_max` sweeps from behind, through the front (+Z), and back.
pub fn sound_source_position(azimuth: f64, elevation: f64, azimuth_max: f64, radius: f64) -> Vec3 {
    let az = map_range(azimuth, 0.0, azimuth_max, PI, -PI);
    let el = map_range(elevation, 0.0, 1.0, 0.0, FRAC_PI_2);
    HEMISPHERE_CENTER
        + vec3(
            radius * el.cos() * az.sin(),
            radius * el.sin(),
            radius * el.cos() * az.cos(),
        )
}

fn random_spray(rng: &mut impl Rng) -> Vec3 {
    vec3(
        rng.gen_range(-1.0..=1.0),
        rng.gen_range(0.0..=1.0),
        rng.gen_range(-1.0..=1.0),
    )
}

/// Renderer that records every call, for assertions.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingRenderer {
    pub transforms: Vec<(VisualId, Vec3, f64)>,
    pub visuals: Vec<(VisualId, Color, f64, bool)>,
    pub particles: usize,
    pub particle_clears: usize,
    pub removed: Vec<VisualId>,
    pub camera: Option<Vec3>,
}

#[cfg(test)]
impl RecordingRenderer {
    /// Most recent opacity reported for `id`.
    pub fn opacity(&self, id: VisualId) -> Option<f64> {
        self.visuals.iter().rev().find(|v| v.0 == id).map(|v| v.2)
    }

    pub fn last_visual(&self, id: VisualId) -> Option<(Color, f64, bool)> {
        self.visuals.iter().rev().find(|v| v.0 == id).map(|v| (v.1, v.2, v.3))
    }

    pub fn clear(&mut self) {
        self.transforms.clear();
        self.visuals.clear();
        self.particles = 0;
        self.particle_clears = 0;
        self.removed.clear();
        self.camera = None;
    }
}

#[cfg(test)]
impl Renderer for RecordingRenderer {
    fn set_entity_transform(
        &mut self,
        id: VisualId,
        position: Vec3,
        _orientation: Vec3,
        scale: f64,
    ) {
        self.transforms.push((id, position, scale));
    }

    fn set_entity_visual(&mut self, id: VisualId, color: Color, opacity: f64, visible: bool) {
        self.visuals.push((id, color, opacity, visible));
    }

    fn spawn_particle(
        &mut self,
        _position: Vec3,
        _velocity: Vec3,
        _radius: f64,
        _color: Color,
        _lifespan: f64,
    ) {
        self.particles += 1;
    }

    fn remove_entity(&mut self, id: VisualId) {
        self.removed.push(id);
    }

    fn set_camera_target(&mut self, target: Vec3) {
        self.camera = Some(target);
    }

    fn clear_particles(&mut self) {
        self.particles = 0;
        self.particle_clears += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use ringsonic_shared::config::{PhysicsConfig, SceneConfig, ZoneConfig};

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "Expected {} to be close to {}",
            actual,
            expected
        );
    }

    fn feedback() -> Feedback {
        Feedback::new(FeedbackConfig::default(), 9)
    }

    fn playing(master: f64) -> RemoteStatus {
        RemoteStatus {
            playing: true,
            master_volume: master,
            ..RemoteStatus::default()
        }
    }

    #[test]
    fn ring_hit_pulses_and_glows() {
        let fb = feedback();
        let mut ring = Ring::new(1, 4.0, 0.1, 1.0, Vec3::ZERO);
        fb.ring_hit(&mut ring, 6.0);
        assert_close(ring.target_scale, 1.1);
        assert_close(ring.glow, 0.4);

        fb.ring_hit(&mut ring, 100.0);
        assert_close(ring.glow, 0.8);
    }

    #[test]
    fn ring_pulse_relaxes_back_to_rest() {
        let fb = feedback();
        let mut rings = vec![Ring::new(1, 4.0, 0.1, 1.0, Vec3::ZERO)];
        fb.ring_hit(&mut rings[0], 6.0);
        fb.relax_rings(&mut rings, 0.005);
        assert!(rings[0].scale > 1.0);
        assert!(rings[0].target_scale < 1.1);
        for _ in 0..2_000 {
            fb.relax_rings(&mut rings, 0.005);
        }
        assert!((rings[0].scale - 1.0).abs() < 1e-3);
        assert_eq!(rings[0].glow, 0.0);
    }

    #[test]
    fn hemisphere_follows_master_volume_while_playing() {
        let mut fb = feedback();
        let status = playing(1.0);
        for _ in 0..200 {
            fb.update_hemisphere(0.0, &status);
        }
        assert!((fb.hemisphere_opacity() - 0.5).abs() < 1e-3);
    }

    #[test]
    fn stop_fades_hemisphere_over_three_seconds() {
        let mut fb = feedback();
        let status = playing(1.0);
        for _ in 0..200 {
            fb.update_hemisphere(0.0, &status);
        }
        let start = fb.hemisphere_opacity();

        fb.playback_stopped(10.0);
        let stopped = RemoteStatus::default();
        assert_close(fb.update_hemisphere(10.0, &stopped), start);
        assert_close(fb.update_hemisphere(11.5, &stopped), start / 2.0);
        assert_close(fb.update_hemisphere(13.0, &stopped), 0.0);
        assert!(!fb.is_fading());
    }

    #[test]
    fn play_cancels_fade() {
        let mut fb = feedback();
        fb.playback_stopped(0.0);
        fb.playback_started();
        assert!(!fb.is_fading());
    }

    #[test]
    fn clear_fades_scene_out_and_back() {
        let mut fb = feedback();
        fb.begin_clear(1.0);
        assert_close(fb.scene_opacity(1.0), 1.0);
        assert_close(fb.scene_opacity(1.15), 0.5);
        assert_close(fb.scene_opacity(1.65), 0.5);
        assert_close(fb.scene_opacity(2.5), 1.0);
        assert_close(fb.scene_opacity(2.6), 1.0);
    }

    #[test]
    fn sound_source_front_and_zenith() {
        let front = sound_source_position(0.495, 0.0, 0.99, 14.0);
        assert!(front.x.abs() < 1e-9);
        assert_close(front.z, 14.0);
        let top = sound_source_position(0.5, 1.0, 0.99, 14.0);
        assert_close(top.y, 5.0 + 14.0);
    }

    #[test]
    fn impact_particles_need_a_hard_knock() {
        let fb = feedback();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut renderer = RecordingRenderer::default();
        fb.impact_particles(Vec3::ZERO, 0.3, &mut rng, &mut renderer);
        assert_eq!(renderer.particles, 0);
        fb.impact_particles(Vec3::ZERO, 0.9, &mut rng, &mut renderer);
        assert_eq!(renderer.particles, 3);
    }

    #[test]
    fn split_particles_per_child() {
        let fb = feedback();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut renderer = RecordingRenderer::default();
        fb.split_particles(Vec3::ZERO, 3, zone_color(0), &mut rng, &mut renderer);
        assert_eq!(renderer.particles, 15);
    }

    #[test]
    fn render_reports_every_entity() {
        let mut fb = feedback();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut engine = CollisionEngine::new(PhysicsConfig::default(), SceneConfig::default(), 9);
        let id = engine.spawn_ball(0.0, &mut rng).unwrap();
        let zones = ZoneBank::new(ZoneConfig::default());
        let mut renderer = RecordingRenderer::default();

        fb.render(0.0, &engine, &zones, &playing(0.5), &mut renderer);

        assert!(renderer.last_visual(VisualId::Ball(id)).is_some());
        for ring in 0..4 {
            assert!(renderer.last_visual(VisualId::Ring(ring)).is_some());
        }
        for track in 2..=10 {
            let (_, opacity, visible) = renderer.last_visual(VisualId::SoundSource(track)).unwrap();
            assert!(visible);
            assert!(opacity >= 0.1 - 1e-9);
        }
        let (color, _, _) = renderer.last_visual(VisualId::MasterLight).unwrap();
        assert_close(color.x, 0.75);
        assert!(renderer.camera.is_some());
    }

    #[test]
    fn zone_colors_cycle() {
        assert_eq!(zone_color(9), zone_color(0));
        assert_ne!(zone_color(1), zone_color(2));
    }
}
