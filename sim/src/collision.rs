//! Contact resolution primitives used by the engine.
//!
//! Everything here works on a single body or a single pair; the engine
//! decides iteration order and what to do with the outcomes.

use crate::entity::{Ball, EntityId, Ground, Ring};
use rand::Rng;
use ringsonic_shared::config::PhysicsConfig;
use ringsonic_shared::vec3::{dot, horizontal, length, try_normalize, vec3, Vec3};
use std::collections::HashMap;

/// Bounce `vel` off a surface with unit `normal`.
///
/// The normal component is reflected and scaled by `cor`. The tangential
/// component loses `friction * gravity * dt` of speed, never reversing.
pub fn apply_collision_response(
    vel: Vec3,
    normal: Vec3,
    cor: f64,
    friction: f64,
    gravity: f64,
    dt: f64,
) -> Vec3 {
    let v_normal = normal * dot(vel, normal);
    let v_tangent = vel - v_normal;

    let tangent_speed = length(v_tangent);
    let decel = friction * gravity * dt;
    let v_tangent = if tangent_speed > decel {
        v_tangent * ((tangent_speed - decel) / tangent_speed)
    } else {
        Vec3::ZERO
    };

    v_normal * -cor + v_tangent
}

/// Uniformly random unit vector.
pub fn random_unit(rng: &mut impl Rng) -> Vec3 {
    let v = vec3(
        rng.gen_range(-1.0..1.0),
        rng.gen_range(-1.0..1.0),
        rng.gen_range(-1.0..1.0),
    );
    try_normalize(v).unwrap_or(Vec3::X)
}

/// Random unit vector in the XZ plane.
pub fn random_horizontal_unit(rng: &mut impl Rng) -> Vec3 {
    let angle = rng.gen_range(0.0..std::f64::consts::TAU);
    vec3(angle.cos(), 0.0, angle.sin())
}

/// Contact being timed for stuck-contact escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContactKey {
    /// Unordered ball pair, stored low id first
    Pair(EntityId, EntityId),
    /// Ball pressed against its ring wall
    Wall(EntityId),
}

impl ContactKey {
    pub fn pair(a: EntityId, b: EntityId) -> Self {
        if a <= b {
            ContactKey::Pair(a, b)
        } else {
            ContactKey::Pair(b, a)
        }
    }

    fn involves(&self, id: EntityId) -> bool {
        match *self {
            ContactKey::Pair(a, b) => a == id || b == id,
            ContactKey::Wall(a) => a == id,
        }
    }
}

/// First-contact timestamps of ongoing contacts.
#[derive(Debug, Default)]
pub struct ContactTimers {
    started: HashMap<ContactKey, f64>,
}

impl ContactTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record contact at `now`; returns how long it has lasted.
    pub fn touch(&mut self, key: ContactKey, now: f64) -> f64 {
        let started = *self.started.entry(key).or_insert(now);
        now - started
    }

    pub fn clear(&mut self, key: ContactKey) {
        self.started.remove(&key);
    }

    pub fn contains(&self, key: ContactKey) -> bool {
        self.started.contains_key(&key)
    }

    /// Drop every timer that involves `id`.
    pub fn forget(&mut self, id: EntityId) {
        self.started.retain(|key, _| !key.involves(id));
    }

    pub fn clear_all(&mut self) {
        self.started.clear();
    }

    pub fn len(&self) -> usize {
        self.started.len()
    }

    pub fn is_empty(&self) -> bool {
        self.started.is_empty()
    }
}

/// Result of checking one ball pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PairOutcome {
    Apart,
    /// Overlap corrected, bodies already moving apart
    Separating,
    /// Impulse applied along the contact normal
    Resolved { impulse: f64, contact: Vec3 },
    /// Stuck contact broken by forced separation
    Escalated,
}

/// Collide two balls of equal mass.
pub fn resolve_ball_pair(
    a: &mut Ball,
    b: &mut Ball,
    timers: &mut ContactTimers,
    now: f64,
    config: &PhysicsConfig,
    rng: &mut impl Rng,
) -> PairOutcome {
    let key = ContactKey::pair(a.id, b.id);
    let delta = b.pos - a.pos;
    let dist = length(delta);
    let min_dist = a.radius + b.radius;

    if dist >= min_dist {
        timers.clear(key);
        return PairOutcome::Apart;
    }

    // Normal points from a to b
    let normal = try_normalize(delta).unwrap_or_else(|| random_unit(rng));

    if timers.touch(key, now) > config.contact_threshold {
        a.vel = normal * -config.separation_speed;
        b.vel = normal * config.separation_speed;
        timers.clear(key);
        return PairOutcome::Escalated;
    }

    let push = (min_dist - dist) / 2.0 + config.separation_slop;
    a.pos -= normal * push;
    b.pos += normal * push;

    let separating_speed = dot(b.vel - a.vel, normal);
    if separating_speed >= 0.0 {
        return PairOutcome::Separating;
    }

    let impulse = -(1.0 + config.ball_cor) * separating_speed / 2.0;
    a.vel -= normal * impulse;
    b.vel += normal * impulse;

    PairOutcome::Resolved {
        impulse,
        contact: a.pos + normal * a.radius,
    }
}

/// Bounce a ball off the ground's top face. Returns true on contact.
pub fn collide_ball_with_ground(ball: &mut Ball, ground: &Ground, config: &PhysicsConfig) -> bool {
    let n = ground.normal;
    let height = ground.height_above(ball.pos);
    if height >= ball.radius || dot(ball.vel, n) >= 0.0 {
        return false;
    }
    ball.pos += n * (ball.radius - height);
    ball.vel = apply_collision_response(
        ball.vel,
        n,
        config.ball_cor,
        config.ball_friction,
        length(config.gravity),
        config.dt,
    );
    true
}

/// Result of checking a ball against its ring wall.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WallOutcome {
    Inside,
    /// Bounced off the wall at `contact`; `tangential_speed` is the
    /// pre-bounce horizontal speed along the wall (signed, CCW about up).
    Hit {
        contact: Vec3,
        wall_normal: Vec3,
        tangential_speed: f64,
        speed: f64,
    },
    Escalated,
}

/// Keep a ball inside its ring's inner wall (horizontal annulus constraint).
pub fn collide_ball_with_ring_wall(
    ball: &mut Ball,
    ring: &Ring,
    timers: &mut ContactTimers,
    now: f64,
    config: &PhysicsConfig,
    rng: &mut impl Rng,
) -> WallOutcome {
    let key = ContactKey::Wall(ball.id);
    let offset = horizontal(ball.pos - ring.pos);
    let dist = length(offset);
    let limit = ring.inner_radius() - ball.radius;

    if dist <= limit {
        timers.clear(key);
        return WallOutcome::Inside;
    }

    // Outward horizontal normal
    let outward = try_normalize(offset).unwrap_or_else(|| random_horizontal_unit(rng));

    if timers.touch(key, now) > config.ring_contact_threshold {
        let inward = -outward;
        ball.vel = vec3(
            inward.x * config.ring_separation_speed,
            ball.vel.y,
            inward.z * config.ring_separation_speed,
        );
        ball.pos -= outward * (dist - limit);
        timers.clear(key);
        return WallOutcome::Escalated;
    }

    let incoming = horizontal(ball.vel);
    let tangent = vec3(-outward.z, 0.0, outward.x);
    let tangential_speed = dot(incoming, tangent);
    let speed = length(ball.vel);

    ball.pos -= outward * (dist - limit);
    if dot(incoming, outward) > 0.0 {
        let bounced = apply_collision_response(
            incoming,
            outward,
            config.ball_cor,
            config.ball_friction,
            length(config.gravity),
            config.dt,
        );
        ball.vel = vec3(bounced.x, ball.vel.y, bounced.z);
    }

    let mut contact = ring.pos + outward * ring.inner_radius();
    contact.y = ball.pos.y;
    WallOutcome::Hit {
        contact,
        wall_normal: -outward,
        tangential_speed,
        speed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "Expected {} to be close to {}",
            actual,
            expected
        );
    }

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(7)
    }

    fn ball(id: EntityId, pos: Vec3, vel: Vec3, radius: f64) -> Ball {
        Ball {
            id,
            ring: 0,
            pos,
            vel,
            radius,
            generation: 0,
            times_split: 0,
            last_split_at: 0.0,
            zone: None,
        }
    }

    // --- apply_collision_response ---

    #[test]
    fn response_reflects_normal_component() {
        let v = apply_collision_response(vec3(0.0, -10.0, 0.0), Vec3::Y, 0.5, 0.0, 30.0, 0.005);
        assert_close(v.y, 5.0);
    }

    #[test]
    fn response_friction_slows_tangent() {
        let v = apply_collision_response(vec3(2.0, -1.0, 0.0), Vec3::Y, 1.0, 0.1, 30.0, 0.1);
        // decel = 0.1 * 30 * 0.1 = 0.3
        assert_close(v.x, 1.7);
        assert_close(v.y, 1.0);
    }

    #[test]
    fn response_friction_never_reverses() {
        let v = apply_collision_response(vec3(0.1, -1.0, 0.0), Vec3::Y, 1.0, 1.0, 30.0, 0.1);
        assert_close(v.x, 0.0);
    }

    // --- ball pairs ---

    #[test]
    fn head_on_pair_obeys_restitution() {
        let config = PhysicsConfig::default();
        let e = config.ball_cor;
        let mut a = ball(1, vec3(0.0, 1.0, 0.0), vec3(2.0, 0.0, 0.0), 0.1);
        let mut b = ball(2, vec3(0.15, 1.0, 0.0), vec3(-2.0, 0.0, 0.0), 0.1);
        let mut timers = ContactTimers::new();

        let outcome = resolve_ball_pair(&mut a, &mut b, &mut timers, 0.0, &config, &mut rng());

        assert!(matches!(outcome, PairOutcome::Resolved { .. }));
        // v1' = ((1-e) v1 + (1+e) v2) / 2 for unit masses
        assert_close(a.vel.x, ((1.0 - e) * 2.0 + (1.0 + e) * -2.0) / 2.0);
        assert_close(b.vel.x, ((1.0 - e) * -2.0 + (1.0 + e) * 2.0) / 2.0);
        assert_close(a.vel.x + b.vel.x, 0.0);
    }

    #[test]
    fn pair_overlap_is_removed() {
        let config = PhysicsConfig::default();
        let mut a = ball(1, vec3(0.0, 1.0, 0.0), Vec3::ZERO, 0.1);
        let mut b = ball(2, vec3(0.1, 1.0, 0.0), Vec3::ZERO, 0.1);
        let mut timers = ContactTimers::new();
        resolve_ball_pair(&mut a, &mut b, &mut timers, 0.0, &config, &mut rng());
        assert!(length(b.pos - a.pos) >= 0.2);
    }

    #[test]
    fn separating_pair_keeps_velocities() {
        let config = PhysicsConfig::default();
        let mut a = ball(1, vec3(0.0, 1.0, 0.0), vec3(-1.0, 0.0, 0.0), 0.1);
        let mut b = ball(2, vec3(0.15, 1.0, 0.0), vec3(1.0, 0.0, 0.0), 0.1);
        let mut timers = ContactTimers::new();
        let outcome = resolve_ball_pair(&mut a, &mut b, &mut timers, 0.0, &config, &mut rng());
        assert_eq!(outcome, PairOutcome::Separating);
        assert_close(a.vel.x, -1.0);
        assert_close(b.vel.x, 1.0);
    }

    #[test]
    fn coincident_pair_is_nudged_apart() {
        let config = PhysicsConfig::default();
        let mut a = ball(1, vec3(0.0, 1.0, 0.0), Vec3::ZERO, 0.1);
        let mut b = ball(2, vec3(0.0, 1.0, 0.0), Vec3::ZERO, 0.1);
        let mut timers = ContactTimers::new();
        resolve_ball_pair(&mut a, &mut b, &mut timers, 0.0, &config, &mut rng());
        assert!(length(b.pos - a.pos) > 0.1);
    }

    #[test]
    fn stuck_pair_is_forced_apart() {
        let config = PhysicsConfig::default();
        let mut a = ball(1, vec3(0.0, 1.0, 0.0), Vec3::ZERO, 0.1);
        let mut b = ball(2, vec3(0.1, 1.0, 0.0), Vec3::ZERO, 0.1);
        let mut timers = ContactTimers::new();
        let mut rng = rng();

        resolve_ball_pair(&mut a, &mut b, &mut timers, 1.0, &config, &mut rng);
        assert!(timers.contains(ContactKey::pair(1, 2)));

        // Still overlapping after the threshold has passed
        a.pos = vec3(0.0, 1.0, 0.0);
        b.pos = vec3(0.1, 1.0, 0.0);
        let later = 1.0 + config.contact_threshold + 0.1;
        let outcome = resolve_ball_pair(&mut a, &mut b, &mut timers, later, &config, &mut rng);

        assert_eq!(outcome, PairOutcome::Escalated);
        assert_close(a.vel.x, -config.separation_speed);
        assert_close(b.vel.x, config.separation_speed);
        assert_close(length(a.vel), length(b.vel));
        assert!(!timers.contains(ContactKey::pair(1, 2)));
    }

    #[test]
    fn pair_timer_clears_once_apart() {
        let config = PhysicsConfig::default();
        let mut a = ball(1, vec3(0.0, 1.0, 0.0), Vec3::ZERO, 0.1);
        let mut b = ball(2, vec3(0.1, 1.0, 0.0), Vec3::ZERO, 0.1);
        let mut timers = ContactTimers::new();
        let mut rng = rng();
        resolve_ball_pair(&mut a, &mut b, &mut timers, 0.0, &config, &mut rng);
        b.pos = vec3(1.0, 1.0, 0.0);
        resolve_ball_pair(&mut a, &mut b, &mut timers, 0.01, &config, &mut rng);
        assert!(timers.is_empty());
    }

    #[test]
    fn pair_key_is_unordered() {
        assert_eq!(ContactKey::pair(5, 2), ContactKey::pair(2, 5));
    }

    #[test]
    fn forget_drops_every_timer_of_a_ball() {
        let mut timers = ContactTimers::new();
        timers.touch(ContactKey::pair(1, 2), 0.0);
        timers.touch(ContactKey::pair(2, 3), 0.0);
        timers.touch(ContactKey::Wall(2), 0.0);
        timers.touch(ContactKey::Wall(4), 0.0);
        timers.forget(2);
        assert_eq!(timers.len(), 1);
        assert!(timers.contains(ContactKey::Wall(4)));
    }

    // --- ground ---

    #[test]
    fn ground_bounce_lifts_and_reflects() {
        let config = PhysicsConfig::default();
        let ground = Ground::new(24.0, 0.1);
        let mut b = ball(1, vec3(0.0, 0.08, 0.0), vec3(0.0, -5.0, 0.0), 0.1);
        assert!(collide_ball_with_ground(&mut b, &ground, &config));
        assert_close(b.pos.y, 0.15);
        assert_close(b.vel.y, 5.0 * config.ball_cor);
    }

    #[test]
    fn rising_ball_ignores_ground() {
        let config = PhysicsConfig::default();
        let ground = Ground::new(24.0, 0.1);
        let mut b = ball(1, vec3(0.0, 0.08, 0.0), vec3(0.0, 1.0, 0.0), 0.1);
        assert!(!collide_ball_with_ground(&mut b, &ground, &config));
    }

    // --- ring wall ---

    #[test]
    fn wall_hit_pushes_back_and_bounces() {
        let config = PhysicsConfig::default();
        let ring = Ring::new(1, 4.0, 0.1, 1.0, vec3(0.0, 0.05, 0.0));
        let mut b = ball(1, vec3(3.95, 0.15, 0.0), vec3(3.0, -1.0, 0.5), 0.1);
        let mut timers = ContactTimers::new();

        let outcome =
                collide_ball_with_ring_wall(&mut b, &ring, &mut timers, 0.0, &config, &mut rng());

        match outcome {
            WallOutcome::Hit {
                wall_normal,
                tangential_speed,
                ..
            } => {
                assert_close(wall_normal.x, -1.0);
                assert_close(tangential_speed, 0.5);
            }
            other => panic!("Expected hit, got {:?}", other),
        }
        assert_close(b.pos.x, 3.85);
        assert!(b.vel.x < 0.0);
        // Vertical velocity is untouched
        assert_close(b.vel.y, -1.0);
    }

    #[test]
    fn wall_stuck_contact_escalates() {
        let config = PhysicsConfig::default();
        let ring = Ring::new(1, 4.0, 0.1, 1.0, vec3(0.0, 0.05, 0.0));
        let mut b = ball(1, vec3(3.95, 0.15, 0.0), vec3(1.0, 0.0, 0.0), 0.1);
        let mut timers = ContactTimers::new();
        let mut rng = rng();

        collide_ball_with_ring_wall(&mut b, &ring, &mut timers, 0.0, &config, &mut rng);
        b.pos = vec3(3.95, 0.15, 0.0);
        let later = config.ring_contact_threshold + 0.05;
        let outcome =
                collide_ball_with_ring_wall(&mut b, &ring, &mut timers, later, &config, &mut rng);

        assert_eq!(outcome, WallOutcome::Escalated);
        assert_close(b.vel.x, -config.ring_separation_speed);
        assert!(!timers.contains(ContactKey::Wall(1)));
    }

    #[test]
    fn ball_inside_ring_is_untouched() {
        let config = PhysicsConfig::default();
        let ring = Ring::new(1, 4.0, 0.1, 1.0, vec3(0.0, 0.05, 0.0));
        let mut b = ball(1, vec3(1.0, 0.15, 0.0), vec3(1.0, 0.0, 0.0), 0.1);
        let mut timers = ContactTimers::new();
        let outcome =
                collide_ball_with_ring_wall(&mut b, &ring, &mut timers, 0.0, &config, &mut rng());
        assert_eq!(outcome, WallOutcome::Inside);
        assert_close(b.pos.x, 1.0);
    }
}
