use crate::collision::{
    apply_collision_response, collide_ball_with_ground, collide_ball_with_ring_wall,
    random_horizontal_unit, resolve_ball_pair, ContactTimers, PairOutcome, WallOutcome,
};
use crate::entity::{Ball, EntityId, Ground, Ring};
use crate::zones::SpatialHit;
use rand::Rng;
use ringsonic_shared::config::{PhaseConfig, PhysicsConfig, SceneConfig, SplitParent};
use ringsonic_shared::vec3::{
    dot, horizontal, length, lerp, normalize, rotate_about_point, rotate_around_axis,
    try_normalize, vec3, Vec3,
};

/// Spawn height above the plane surface for new balls
const SPAWN_LIFT: f64 = 0.01;
/// Initial horizontal speed of a spawned ball, away from the nearest edge
const SPAWN_SPEED: f64 = 0.5;
/// Clearance kept between a spawned ball and its ring wall
const SPAWN_MARGIN: f64 = 0.1;
/// Below this tangential speed a wall hit only nudges the ring's spin
const SPIN_TANGENT_MIN: f64 = 0.1;

/// Everything the engine owns and mutates.
pub struct SimulationState {
    pub balls: Vec<Ball>,
    pub rings: Vec<Ring>,
    pub ground: Ground,
    pub contacts: ContactTimers,
    next_id: EntityId,
}

impl SimulationState {
    fn allocate_id(&mut self) -> EntityId {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }
}

/// Produced by one physics step, consumed by the simulation.
#[derive(Debug, Clone, PartialEq)]
pub enum PhysicsEvent {
    RingHit {
        ring: usize,
        ball: EntityId,
        zone: usize,
        spatial: SpatialHit,
        speed: f64,
        contact: Vec3,
    },
    BallImpact {
        at: Vec3,
        impulse: f64,
    },
    Split {
        parent: EntityId,
        zone: usize,
        at: Vec3,
        children: Vec<EntityId>,
    },
    Spawned(EntityId),
    Removed(EntityId),
}

/// Ball/ring/ground dynamics for the whole field.
pub struct CollisionEngine {
    physics: PhysicsConfig,
    scene: SceneConfig,
    zone_count: usize,
    state: SimulationState,
    /// Per-ring ground restitution, smaller rings bounce more
    ring_cor: Vec<f64>,
    strong_attraction: bool,
    events: Vec<PhysicsEvent>,
}

impl CollisionEngine {
    /// Build the field with rings laid out on a line and at rest.
    pub fn new(physics: PhysicsConfig, scene: SceneConfig, zone_count: usize) -> Self {
        let mut state = SimulationState {
            balls: Vec::new(),
            rings: Vec::new(),
            ground: Ground::new(scene.plane_size, scene.plane_thickness),
            contacts: ContactTimers::new(),
            next_id: 1,
        };

        let rest_y = scene.ground_top() + scene.ring_thickness / 2.0;
        let mut x = -scene.plane_size / 2.0;
        for radius in &scene.ring_radii {
            x += radius;
            let id = state.allocate_id();
            let pos = vec3(x, rest_y, 0.0);
            state.rings.push(Ring::new(id, *radius, scene.ring_thickness, physics.ring_mass, pos));
            x += radius;
        }

        let ring_cor =
                ring_restitution(&scene.ring_radii, physics.ring_cor_min, physics.ring_cor_max);

        Self {
            physics,
            scene,
            zone_count,
            state,
            ring_cor,
            strong_attraction: false,
            events: Vec::new(),
        }
    }

    /// Scatter rings across the plane with random motion.
    pub fn scatter_rings(&mut self, rng: &mut impl Rng) {
        let half = self.scene.plane_size / 2.0;
        let base_y = self.scene.ground_top() + self.scene.ring_thickness / 2.0;
        let speed = self.scene.ring_spawn_speed;
        let spin = self.scene.ring_spawn_spin;
        for ring in &mut self.state.rings {
            let limit = half - ring.radius;
            ring.pos = vec3(
                rng.gen_range(-limit..=limit),
                base_y + rng.gen_range(0.0..=self.scene.ring_spawn_height),
                rng.gen_range(-limit..=limit),
            );
            ring.vel = vec3(
                rng.gen_range(-speed..=speed),
                0.0,
                rng.gen_range(-speed..=speed),
            );
            ring.spin = rng.gen_range(-spin..=spin);
        }
    }

    pub fn physics(&self) -> &PhysicsConfig {
        &self.physics
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut SimulationState {
        &mut self.state
    }

    pub fn balls(&self) -> &[Ball] {
        &self.state.balls
    }

    pub fn rings(&self) -> &[Ring] {
        &self.state.rings
    }

    pub fn rings_mut(&mut self) -> &mut [Ring] {
        &mut self.state.rings
    }

    pub fn ground(&self) -> &Ground {
        &self.state.ground
    }

    pub fn ball_count(&self) -> usize {
        self.state.balls.len()
    }

    pub fn ring_cor(&self, ring: usize) -> Option<f64> {
        self.ring_cor.get(ring).copied()
    }

    pub fn strong_attraction(&self) -> bool {
        self.strong_attraction
    }

    /// Flip between the small and large centring pull. Returns the new mode.
    pub fn toggle_attraction(&mut self) -> bool {
        self.strong_attraction = !self.strong_attraction;
        self.strong_attraction
    }

    fn attraction_strength(&self) -> f64 {
        if self.strong_attraction {
            self.physics.attraction_large
        } else {
            self.physics.attraction_small
        }
    }

    /// Spawn a ball in a random ring. `None` at the ball cap.
    pub fn spawn_ball(&mut self, now: f64, rng: &mut impl Rng) -> Option<EntityId> {
        let ring = rng.gen_range(0..self.state.rings.len());
        self.spawn_ball_in_ring(ring, now, rng)
    }

    /// Spawn a ball near the centre of `ring`, heading away from the
    /// nearest plane edge.
    pub fn spawn_ball_in_ring(
        &mut self,
        ring: usize,
        now: f64,
        rng: &mut impl Rng,
    ) -> Option<EntityId> {
        if self.state.balls.len() >= self.physics.max_balls {
            tracing::debug!("Ball cap {} reached, spawn ignored", self.physics.max_balls);
            return None;
        }
        let host = self.state.rings.get(ring)?;
        let sizes = &self.physics.ball_sizes;
        let radius = sizes[rng.gen_range(0..sizes.len())];

        let reach = (host.inner_radius() - radius - SPAWN_MARGIN).max(0.0);
        let mut offset = vec3(rng.gen_range(-1.0..=1.0), 0.0, rng.gen_range(-1.0..=1.0)) * reach;
        if length(offset) > reach {
            offset = normalize(offset) * reach;
        }
        let center = host.pos;
        let pos = self.surface_point(center.x + offset.x, center.z + offset.z, radius + SPAWN_LIFT);
        let vel = self.away_from_edge(pos, rng);

        Some(self.insert_ball(ring, pos, vel, radius, now))
    }

    /// Add a ball verbatim. Does not check the cap.
    pub fn insert_ball(
        &mut self,
        ring: usize,
        pos: Vec3,
        vel: Vec3,
        radius: f64,
        now: f64,
    ) -> EntityId {
        let id = self.state.allocate_id();
        self.state.balls.push(Ball {
            id,
            ring,
            pos,
            vel,
            radius,
            generation: 0,
            times_split: 0,
            last_split_at: now,
            zone: None,
        });
        self.events.push(PhysicsEvent::Spawned(id));
        id
    }

    /// Point above the plane at horizontal (x, z), `lift` off its top face.
    fn surface_point(&self, x: f64, z: f64, lift: f64) -> Vec3 {
        let ground = &self.state.ground;
        let top = ground.top_point();
        let n = ground.normal;
        let y = top.y + (lift - (x - top.x) * n.x - (z - top.z) * n.z) / n.y;
        vec3(x, y, z)
    }

    fn away_from_edge(&self, pos: Vec3, rng: &mut impl Rng) -> Vec3 {
        let ground = &self.state.ground;
        let right = ground.right;
        let forward = ground.forward();
        let local = pos - ground.center;
        let lx = dot(local, right);
        let lz = dot(local, forward);

        let jitter = rng.gen_range(-0.1..=0.1);
        let (main, side) = if lx.abs() > lz.abs() {
            (right * (-lx.signum() * SPAWN_SPEED), forward * jitter)
        } else {
            (forward * (-lz.signum() * SPAWN_SPEED), right * jitter)
        };
        main + side
            + right * rng.gen_range(-0.05..=0.05)
            + forward * rng.gen_range(-0.05..=0.05)
    }

    /// Remove every ball.
    pub fn clear_balls(&mut self) {
        for ball in self.state.balls.drain(..) {
            self.events.push(PhysicsEvent::Removed(ball.id));
        }
        self.state.contacts.clear_all();
    }

    /// Stop all motion (console transport stopped).
    pub fn freeze(&mut self) {
        for ball in &mut self.state.balls {
            ball.vel = Vec3::ZERO;
        }
        for ring in &mut self.state.rings {
            ring.vel = Vec3::ZERO;
            ring.spin = 0.0;
        }
    }

    /// Move a ring horizontally to (x, z), clamped to the plane.
    pub fn drag_ring(&mut self, ring: usize, x: f64, z: f64) -> bool {
        let half = self.scene.plane_size / 2.0;
        let Some(r) = self.state.rings.get_mut(ring) else {
            return false;
        };
        let limit = half - r.radius;
        r.pos.x = x.clamp(-limit, limit);
        r.pos.z = z.clamp(-limit, limit);
        r.vel = Vec3::ZERO;
        true
    }

    /// Burst everything outward at the start of a release.
    pub fn release_burst(&mut self, phase: &PhaseConfig, rng: &mut impl Rng) {
        let SimulationState { balls, rings, .. } = &mut self.state;

        for ball in balls.iter_mut() {
            let center = rings[ball.ring].pos;
            let outward = try_normalize(horizontal(ball.pos - center))
                .unwrap_or_else(|| random_horizontal_unit(rng));
            ball.vel = outward * phase.release_speed
                + Vec3::Y * (phase.release_speed * phase.release_vertical_factor);
        }

        for ring in rings.iter_mut() {
            let dir = normalize(vec3(
                rng.gen_range(-1.0..=1.0),
                rng.gen_range(-phase.ring_release_vertical..=phase.ring_release_vertical),
                rng.gen_range(-1.0..=1.0),
            ));
            let speed = rng.gen_range(phase.ring_release_min..=phase.ring_release_max);
            ring.vel = dir * speed;
        }
    }

    /// Rotate the plane to its tilt at `now` and carry everything on it along.
    pub fn apply_tilt(&mut self, now: f64) {
        let scene = &self.scene;
        let tilt_x = scene.tilt_x_amplitude_deg.to_radians() * (now * scene.tilt_x_frequency).sin();
        let tilt_z = scene.tilt_z_amplitude_deg.to_radians()
            * (now * scene.tilt_z_frequency + scene.tilt_phase_offset).sin();

        let state = &mut self.state;
        let dx = tilt_x - state.ground.tilt_x;
        let dz = tilt_z - state.ground.tilt_z;
        state.ground.tilt_x = tilt_x;
        state.ground.tilt_z = tilt_z;
        if dx == 0.0 && dz == 0.0 {
            return;
        }

        let pivot = state.ground.center;
        for (axis, angle) in [(Vec3::X, dx), (Vec3::Z, dz)] {
            let ground = &mut state.ground;
            ground.normal = normalize(rotate_around_axis(ground.normal, axis, angle));
            ground.right = normalize(rotate_around_axis(ground.right, axis, angle));
            for ring in &mut state.rings {
                ring.pos = rotate_about_point(ring.pos, pivot, axis, angle);
                ring.up = normalize(rotate_around_axis(ring.up, axis, angle));
                ring.heading = normalize(rotate_around_axis(ring.heading, axis, angle));
            }
            for ball in &mut state.balls {
                ball.pos = rotate_about_point(ball.pos, pivot, axis, angle);
            }
        }
    }

    /// Advance the field by one fixed timestep.
    ///
    /// `gathering` carries the attraction-phase parameters while that phase
    /// is active.
    pub fn step(
        &mut self,
        now: f64,
        gathering: Option<&PhaseConfig>,
        rng: &mut impl Rng,
    ) -> Vec<PhysicsEvent> {
        let mut events = std::mem::take(&mut self.events);
        let dt = self.physics.dt;

        for index in 0..self.state.rings.len() {
            self.step_ring(index, dt);
        }

        let attraction = self.attraction_strength();
        let physics = &self.physics;
        let zone_count = self.zone_count;
        let SimulationState {
            balls,
            rings,
            ground,
            contacts,
            next_id,
        } = &mut self.state;

        let count = balls.len();
        let mut removed = vec![false; count];
        let mut spawned: Vec<Ball> = Vec::new();

        for i in 0..count {
            if removed[i] {
                continue;
            }

            {
                let ball = &mut balls[i];
                let ring = &rings[ball.ring];
                ball.vel += physics.gravity * dt;

                let to_center = ring.pos - ball.pos;
                let dist = length(to_center);
                if dist > physics.attraction_min_distance {
                    ball.vel += to_center * (attraction * dt);
                }
                if let Some(phase) = gathering {
                    ball.vel += gather_force(ball, ring, phase) * dt;
                }

                ball.pos += ball.vel * dt;
                collide_ball_with_ground(ball, ground, physics);
            }

            let outcome = {
                let host = balls[i].ring;
                collide_ball_with_ring_wall(
                    &mut balls[i],
                    &rings[host],
                    contacts,
                    now,
                    physics,
                    rng,
                )
            };

            if let WallOutcome::Hit {
                contact,
                wall_normal,
                tangential_speed,
                speed,
            } = outcome
            {
                let ball = &mut balls[i];
                let ring = &mut rings[ball.ring];
                let zone = ring.zone_at(ball.pos, zone_count);
                let (right, _) = ring.local_frame();
                let spatial = SpatialHit {
                    lateral: dot(ball.pos - ring.pos, right) / ring.radius,
                    height: ground.height_above(ring.pos),
                };
                ball.zone = Some(zone);
                spin_ring(ring, tangential_speed, rng);

                events.push(PhysicsEvent::RingHit {
                    ring: ball.ring,
                    ball: ball.id,
                    zone,
                    spatial,
                    speed,
                    contact,
                });

                let active = count - removed.iter().filter(|r| **r).count() + spawned.len();
                let split = split_ball(ball, wall_normal, now, active, physics, next_id, rng);
                if let Some(children) = split {
                    events.push(PhysicsEvent::Split {
                        parent: ball.id,
                        zone,
                        at: ball.pos,
                        children: children.iter().map(|c| c.id).collect(),
                    });
                    match physics.split.parent {
                        SplitParent::Consume => removed[i] = true,
                        SplitParent::Retain => {
                            ball.times_split += 1;
                            ball.last_split_at = now;
                        }
                    }
                    spawned.extend(children);
                }
            }

            if removed[i] {
                continue;
            }

            for j in (i + 1)..count {
                if removed[j] {
                    continue;
                }
                let (head, tail) = balls.split_at_mut(j);
                let outcome =
                        resolve_ball_pair(&mut head[i], &mut tail[0], contacts, now, physics, rng);
                if let PairOutcome::Resolved { impulse, contact } = outcome {
                    events.push(PhysicsEvent::BallImpact {
                        at: contact,
                        impulse,
                    });
                }
            }
        }

        for (i, ball) in balls.iter().enumerate() {
            if ball.radius < physics.min_ball_radius && ball.speed() < physics.rest_speed {
                removed[i] = true;
            }
        }

        let mut index = 0;
        balls.retain(|ball| {
            let keep = !removed[index];
            index += 1;
            if !keep {
                contacts.forget(ball.id);
                events.push(PhysicsEvent::Removed(ball.id));
            }
            keep
        });

        let room = physics.max_balls.saturating_sub(balls.len());
        spawned.truncate(room);
        balls.extend(spawned);

        events
    }

    fn step_ring(&mut self, index: usize, dt: f64) {
        let physics = &self.physics;
        let cor = self.ring_cor[index];
        let ground = &self.state.ground;
        let ring = &mut self.state.rings[index];

        ring.vel += physics.gravity * dt;
        ring.pos += ring.vel * dt;

        ring.spin += physics.ring_torque * dt;
        ring.heading = normalize(rotate_around_axis(ring.heading, ring.up, ring.spin * dt));

        let n = ground.normal;
        let clearance = ring.thickness / 2.0;
        let height = ground.height_above(ring.pos);
        if height < clearance {
            ring.pos += n * (clearance - height);
            if dot(ring.vel, n) < 0.0 {
                ring.vel = apply_collision_response(
                    ring.vel,
                    n,
                    cor,
                    physics.plane_friction,
                    length(physics.gravity),
                    dt,
                );
            }
        }

        let limit = ground.half_size - ring.radius;
        for axis in [ground.right, ground.forward()] {
            let local = dot(ring.pos - ground.center, axis);
            if local.abs() > limit {
                ring.pos += axis * (limit * local.signum() - local);
                ring.vel -= axis * dot(ring.vel, axis);
            }
        }
    }
}

/// Ground restitution per ring, lerped from `max` (smallest) to `min` (largest).
pub fn ring_restitution(radii: &[f64], min: f64, max: f64) -> Vec<f64> {
    let lo = radii.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = radii.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    radii
        .iter()
        .map(|r| {
            if hi - lo < 1e-12 {
                max
            } else {
                lerp(max, min, (r - lo) / (hi - lo))
            }
        })
        .collect()
}

/// Nudge a ring's spin after a wall hit.
fn spin_ring(ring: &mut Ring, tangential_speed: f64, rng: &mut impl Rng) {
    let impulse = if tangential_speed.abs() > SPIN_TANGENT_MIN {
        tangential_speed.abs() / 100.0 * rng.gen_range(0.01..0.05) * tangential_speed.signum()
    } else {
        rng.gen_range(-0.005..0.005)
    };
    ring.spin += impulse / ring.mass;
}

/// Attraction-phase pull toward the ring centre: distance-scaled
/// attraction, damping of inward motion near the centre, short-range
/// repulsion, and a lift along the ring's up axis.
fn gather_force(ball: &Ball, ring: &Ring, phase: &PhaseConfig) -> Vec3 {
    let to_center = horizontal(ring.pos - ball.pos);
    let dist = length(to_center);
    let mut force = ring.up * (phase.attraction_strength * phase.vertical_factor);

    let Some(dir) = try_normalize(to_center) else {
        return force;
    };
    let reach = (dist / ring.radius).min(1.0);

    force += dir * (phase.attraction_strength * reach * 1.2);

    let inward_speed = dot(horizontal(ball.vel), dir);
    if inward_speed > 0.0 {
        force -= dir * (inward_speed * phase.attraction_damping * (1.0 - reach));
    }

    if dist < phase.repulsion_distance {
        let falloff = 1.0 - dist / phase.repulsion_distance;
        force -= dir * (phase.repulsion_max * falloff * phase.repulsion_factor);
    }
    force
}

/// Children for a ball that just hit its ring wall, or `None` if any
/// split limit holds it back.
fn split_ball(
    ball: &Ball,
    wall_normal: Vec3,
    now: f64,
    active: usize,
    physics: &PhysicsConfig,
    next_id: &mut EntityId,
    rng: &mut impl Rng,
) -> Option<Vec<Ball>> {
    let split = &physics.split;
    if split.children == 0
        || ball.times_split >= split.max_splits_per_ball
        || ball.generation >= split.max_generation
        || now - ball.last_split_at < split.cooldown
    {
        return None;
    }

    let child_radius = ball.radius * split.child_radius_factor;
    if child_radius < physics.min_ball_radius {
        return None;
    }

    let consumed = usize::from(split.parent == SplitParent::Consume);
    if active + split.children - consumed > physics.max_balls {
        return None;
    }

    let speed = length(ball.vel).max(split.min_child_speed);
    let children = (0..split.children)
        .map(|_| {
            let mut dir = random_horizontal_unit(rng);
            let facing = dot(dir, wall_normal);
            if facing < 0.0 {
                dir -= wall_normal * (2.0 * facing);
            }
            let dir = try_normalize(horizontal(dir)).unwrap_or_else(|| random_horizontal_unit(rng));
            let offset = vec3(
                rng.gen_range(-split.child_offset..=split.child_offset),
                0.0,
                rng.gen_range(-split.child_offset..=split.child_offset),
            );
            let id = *next_id;
            *next_id = next_id.wrapping_add(1);
            Ball {
                id,
                ring: ball.ring,
                pos: ball.pos + offset,
                vel: vec3(dir.x * speed, ball.vel.y, dir.z * speed),
                radius: child_radius,
                generation: ball.generation + 1,
                times_split: 0,
                last_split_at: now,
                zone: ball.zone,
            }
        })
        .collect();
    Some(children)
}
