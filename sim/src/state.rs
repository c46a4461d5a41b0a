use crate::effects::{MasterFxEnvelope, ReverbSwell};
use crate::engine::{CollisionEngine, PhysicsEvent};
use crate::entity::EntityId;
use crate::feedback::{zone_color, Feedback, Renderer, VisualId};
use crate::phase::{EventPhase, PhaseAction, PhaseController};
use crate::sender::{ControlTransport, RateLimitedSender};
use crate::status::{StatusCell, StatusEvent};
use crate::zones::ZoneBank;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use ringsonic_shared::config::ToyConfig;
use ringsonic_shared::protocol::ControlAddress;

/// Central toy state owned by the sim loop task.
pub struct Simulation {
    config: ToyConfig,
    engine: CollisionEngine,
    zones: ZoneBank,
    reverb: ReverbSwell,
    master_fx: MasterFxEnvelope,
    phase: PhaseController,
    sender: RateLimitedSender,
    status: StatusCell,
    feedback: Feedback,
    rng: ChaCha8Rng,
    tick_count: u64,
    /// When off, zone volumes are left to the console's own faders
    fader_control: bool,
    ring_hits: u64,
}

impl Simulation {
    pub fn new(
        config: ToyConfig,
        rng_seed: u64,
        transport: Box<dyn ControlTransport>,
        status: StatusCell,
    ) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(rng_seed);
        let zone_count = config.zones.count;
        let mut engine =
                CollisionEngine::new(config.physics.clone(), config.scene.clone(), zone_count);
        engine.scatter_rings(&mut rng);

        Self {
            zones: ZoneBank::new(config.zones.clone()),
            reverb: ReverbSwell::new(&config.effects),
            master_fx: MasterFxEnvelope::new(&config.effects),
            phase: PhaseController::new(config.phase.clone()),
            sender: RateLimitedSender::new(transport, config.sender.clone()),
            feedback: Feedback::new(config.feedback.clone(), zone_count),
            engine,
            status,
            rng,
            tick_count: 0,
            fader_control: true,
            ring_hits: 0,
            config,
        }
    }

    /// Simulation clock in seconds.
    pub fn now(&self) -> f64 {
        self.tick_count as f64 * self.config.physics.dt
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn config(&self) -> &ToyConfig {
        &self.config
    }

    pub fn engine(&self) -> &CollisionEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut CollisionEngine {
        &mut self.engine
    }

    pub fn zones(&self) -> &ZoneBank {
        &self.zones
    }

    pub fn phase(&self) -> EventPhase {
        self.phase.phase()
    }

    pub fn status(&self) -> &StatusCell {
        &self.status
    }

    pub fn feedback(&self) -> &Feedback {
        &self.feedback
    }

    pub fn sender(&self) -> &RateLimitedSender {
        &self.sender
    }

    pub fn reverb_active(&self) -> bool {
        self.reverb.is_active()
    }

    pub fn fader_control(&self) -> bool {
        self.fader_control
    }

    pub fn ring_hits(&self) -> u64 {
        self.ring_hits
    }

    /// Put the console into a known state: centred pans, silent zones,
    /// centred spatializers, master FX off.
    pub fn send_initial_state(&mut self) {
        let now = self.now();
        let zones = self.config.zones.clone();
        for zone in 0..zones.count {
            let track = zones.track_for_zone(zone);
            self.sender.send(ControlAddress::TrackPan(track), zones.pan_offset, now);
            self.sender.send(ControlAddress::TrackVolume(track), 0.0, now);
            self.sender.send(ControlAddress::Azimuth(track), zones.spatial_rest, now);
            self.sender.send(ControlAddress::Elevation(track), zones.spatial_rest, now);
        }
        self.sender.send(ControlAddress::MasterFx(zones.master_track), 0.0, now);
        tracing::info!("Initial console state sent for {} tracks", zones.count);
    }

    /// Advance one fixed step and push the frame to `renderer`.
    pub fn tick(&mut self, renderer: &mut dyn Renderer) {
        self.tick_count += 1;
        let now = self.now();
        let dt = self.config.physics.dt;

        if let Some(action) = self.phase.update(now, self.reverb.is_active()) {
            self.apply_phase_action(action, now);
        }

        self.engine.apply_tilt(now);
        let gathering = self.phase.is_attracting().then(|| self.phase.config());
        let events = self.engine.step(now, gathering, &mut self.rng);
        for event in events {
            self.handle_physics_event(event, now, renderer);
        }

        self.feedback.relax_rings(self.engine.rings_mut(), dt);
        self.zones.update(now, dt);
        self.send_zone_controls(now);
        self.send_master_effects(now);

        let status = self.status.snapshot();
        self.feedback.render(now, &self.engine, &self.zones, &status, renderer);
    }

    fn handle_physics_event(&mut self, event: PhysicsEvent, now: f64, renderer: &mut dyn Renderer) {
        match event {
            PhysicsEvent::RingHit {
                ring,
                zone,
                spatial,
                speed,
                ..
            } => {
                self.ring_hits += 1;
                self.zones.trigger(zone, now, spatial);
                if let Some(r) = self.engine.rings_mut().get_mut(ring) {
                    self.feedback.ring_hit(r, speed);
                }
                if let Some(action) = self.phase.register_hit(now) {
                    self.apply_phase_action(action, now);
                }
            }
            PhysicsEvent::Split {
                parent,
                zone,
                at,
                children,
            } => {
                tracing::debug!("Ball {} split into {:?}", parent, children);
                self.feedback
                    .split_particles(at, children.len(), zone_color(zone), &mut self.rng, renderer);
            }
            PhysicsEvent::BallImpact { at, impulse } => {
                self.feedback.impact_particles(at, impulse, &mut self.rng, renderer);
            }
            PhysicsEvent::Spawned(id) => tracing::debug!("Ball {} spawned", id),
            PhysicsEvent::Removed(id) => renderer.remove_entity(VisualId::Ball(id)),
        }
    }

    fn apply_phase_action(&mut self, action: PhaseAction, now: f64) {
        match action {
            PhaseAction::Marker(n) => {
                self.sender.send(ControlAddress::Marker(n), 1.0, now);
            }
            PhaseAction::BeginAttraction => {
                tracing::info!("Attraction phase started");
            }
            PhaseAction::BeginRelease => {
                tracing::info!("Release started with {} balls", self.engine.ball_count());
                self.engine.release_burst(self.phase.config(), &mut self.rng);
                self.reverb.start(now);
                self.master_fx.trigger(now);
                let marker = self.phase.config().release_marker;
                self.sender.send(ControlAddress::Marker(marker), 1.0, now);
            }
            PhaseAction::ReturnToNormal => {
                tracing::info!("Back to normal phase");
            }
        }
    }

    fn send_zone_controls(&mut self, now: f64) {
        let cfg = self.zones.config().clone();
        for (index, zone) in self.zones.zones().iter().enumerate() {
            let track = cfg.track_for_zone(index);
            if self.fader_control {
                let sent = self.sender.send(ControlAddress::TrackVolume(track), zone.volume, now);
                if sent {
                    let volume = zone.volume;
                    self.status.publish(|s| {
                        s.track_volumes.insert(track, volume);
                    });
                }
            }
            self.sender.send(ControlAddress::Azimuth(track), zone.azimuth, now);
            self.sender.send(ControlAddress::Elevation(track), zone.elevation, now);
        }
    }

    fn send_master_effects(&mut self, now: f64) {
        let master = self.config.zones.master_track;
        if let Some(level) = self.reverb.update(now) {
            self.sender.send(ControlAddress::ReverbDryWet(master), level, now);
        }
        let fx = self.master_fx.update(now);
        self.sender.send(ControlAddress::MasterFx(master), fx, now);
    }

    /// Spawn one ball in a random ring.
    pub fn add_ball(&mut self) -> Option<EntityId> {
        let now = self.now();
        let id = self.engine.spawn_ball(now, &mut self.rng);
        if id.is_none() {
            tracing::info!("Ball cap reached ({})", self.config.physics.max_balls);
        }
        id
    }

    /// Remove every ball and fade the zones out.
    pub fn clear_all(&mut self) {
        let now = self.now();
        self.engine.clear_balls();
        self.phase.reset();
        self.zones.begin_clear(now);
        self.feedback.begin_clear(now);

        let cfg = self.zones.config().clone();
        for index in 0..cfg.count {
            let track = cfg.track_for_zone(index);
            self.sender.send(ControlAddress::Azimuth(track), cfg.spatial_rest, now);
            self.sender.send(ControlAddress::Elevation(track), cfg.spatial_rest, now);
        }
        tracing::info!("Cleared all balls");
    }

    /// Manual release. Returns false if a release or attraction is already
    /// under way.
    pub fn release(&mut self) -> bool {
        let now = self.now();
        match self.phase.request_release(now) {
            Some(action) => {
                self.apply_phase_action(action, now);
                true
            }
            None => false,
        }
    }

    pub fn play(&mut self) {
        let now = self.now();
        self.sender.send(ControlAddress::Play, 1.0, now);
    }

    pub fn stop(&mut self) {
        let now = self.now();
        self.sender.send(ControlAddress::Stop, 1.0, now);
    }

    pub fn toggle_fader_control(&mut self) -> bool {
        self.fader_control = !self.fader_control;
        tracing::info!("Fader control {}", if self.fader_control { "on" } else { "off" });
        self.fader_control
    }

    pub fn toggle_attraction(&mut self) -> bool {
        let strong = self.engine.toggle_attraction();
        tracing::info!("Ball attraction {}", if strong { "large" } else { "small" });
        strong
    }

    pub fn drag_ring(&mut self, ring: usize, x: f64, z: f64) -> bool {
        self.engine.drag_ring(ring, x, z)
    }

    /// React to a console transport edge reported by the listener.
    pub fn handle_status_event(&mut self, event: StatusEvent) {
        let now = self.now();
        match event {
            StatusEvent::PlaybackChanged { playing: false } => {
                tracing::info!("Console stopped, freezing the field");
                self.engine.freeze();
                self.feedback.playback_stopped(now);
            }
            StatusEvent::PlaybackChanged { playing: true } => {
                tracing::info!("Console playing");
                self.feedback.playback_started();
            }
        }
    }

    /// One-line summary for the periodic status log.
    pub fn status_line(&self) -> String {
        let status = self.status.snapshot();
        format!(
            "t={:.1}s phase={:?} balls={} hits={} playing={} master={:.2} sent={} failed={}",
            self.now(),
            self.phase.phase(),
            self.engine.ball_count(),
            self.ring_hits,
            status.playing,
            status.master_volume,
            self.sender.sent_count(),
            self.sender.failed_count(),
        )
    }
}
