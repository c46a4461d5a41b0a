use ringsonic_shared::vec3::{cross, dot, normalize, Vec3};
use std::f64::consts::TAU;

/// Stable id assigned at creation; never reused within a session.
pub type EntityId = u32;

/// A ball living inside one ring.
#[derive(Debug, Clone)]
pub struct Ball {
    pub id: EntityId,
    /// Index of the owning ring in the engine's ring table
    pub ring: usize,
    pub pos: Vec3,
    pub vel: Vec3,
    pub radius: f64,
    pub generation: u32,
    pub times_split: u32,
    /// Simulation time the ball was spawned or last split
    pub last_split_at: f64,
    /// Zone of the last ring hit, drives the ball color
    pub zone: Option<usize>,
}

impl Ball {
    pub fn speed(&self) -> f64 {
        dot(self.vel, self.vel).sqrt()
    }
}

/// A spinning ring that confines its balls.
#[derive(Debug, Clone)]
pub struct Ring {
    pub id: EntityId,
    pub radius: f64,
    pub thickness: f64,
    pub mass: f64,
    pub pos: Vec3,
    pub vel: Vec3,
    /// Unit normal of the ring's plane
    pub up: Vec3,
    /// Unit vector in the ring's plane; zone 0 starts here
    pub heading: Vec3,
    /// Angular speed about `up` (rad/s)
    pub spin: f64,
    pub scale: f64,
    pub target_scale: f64,
    pub glow: f64,
}

impl Ring {
    pub fn new(id: EntityId, radius: f64, thickness: f64, mass: f64, pos: Vec3) -> Self {
        Self {
            id,
            radius,
            thickness,
            mass,
            pos,
            vel: Vec3::ZERO,
            up: Vec3::Y,
            heading: Vec3::X,
            spin: 0.0,
            scale: 1.0,
            target_scale: 1.0,
            glow: 0.0,
        }
    }

    /// Radius of the wall surface balls bounce against.
    pub fn inner_radius(&self) -> f64 {
        self.radius - self.thickness / 2.0
    }

    /// (right, forward) axes of the ring's local horizontal frame.
    pub fn local_frame(&self) -> (Vec3, Vec3) {
        let right = normalize(self.heading);
        let forward = normalize(cross(right, self.up));
        (right, forward)
    }

    /// Angle of `point` around the ring, in [0, 2π), measured from `heading`.
    pub fn local_angle(&self, point: Vec3) -> f64 {
        let (right, forward) = self.local_frame();
        let rel = point - self.pos;
        dot(rel, forward).atan2(dot(rel, right)).rem_euclid(TAU)
    }

    /// Zone index for a point on the ring, given `zone_count` equal sectors.
    pub fn zone_at(&self, point: Vec3, zone_count: usize) -> usize {
        let span = TAU / zone_count as f64;
        ((self.local_angle(point) / span) as usize).min(zone_count - 1)
    }
}

/// The tilting plane under everything.
#[derive(Debug, Clone)]
pub struct Ground {
    pub center: Vec3,
    pub normal: Vec3,
    /// Local X axis of the plane
    pub right: Vec3,
    pub half_size: f64,
    pub thickness: f64,
    pub tilt_x: f64,
    pub tilt_z: f64,
}

impl Ground {
    pub fn new(size: f64, thickness: f64) -> Self {
        Self {
            center: Vec3::ZERO,
            normal: Vec3::Y,
            right: Vec3::X,
            half_size: size / 2.0,
            thickness,
            tilt_x: 0.0,
            tilt_z: 0.0,
        }
    }

    /// Local Z axis of the plane
    pub fn forward(&self) -> Vec3 {
        normalize(cross(self.right, self.normal))
    }

    pub fn top_point(&self) -> Vec3 {
        self.center + self.normal * (self.thickness / 2.0)
    }

    /// Signed distance of `p` above the top face.
    pub fn height_above(&self, p: Vec3) -> f64 {
        dot(p - self.top_point(), self.normal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringsonic_shared::vec3::vec3;
    use std::f64::consts::PI;

    fn ring() -> Ring {
        Ring::new(1, 4.0, 0.1, 1.0, vec3(0.0, 0.05, 0.0))
    }

    #[test]
    fn inner_radius_subtracts_half_thickness() {
        assert!((ring().inner_radius() - 3.95).abs() < 1e-12);
    }

    #[test]
    fn heading_point_is_angle_zero() {
        let r = ring();
        assert!(r.local_angle(vec3(3.9, 0.05, 0.0)).abs() < 1e-9);
        assert_eq!(r.zone_at(vec3(3.9, 0.05, 0.0), 9), 0);
    }

    #[test]
    fn forward_is_a_quarter_turn() {
        let r = ring();
        assert!((r.local_angle(vec3(0.0, 0.05, 3.9)) - PI / 2.0).abs() < 1e-9);
    }

    #[test]
    fn negative_angles_wrap_to_last_zone() {
        let r = ring();
        assert_eq!(r.zone_at(vec3(3.9, 0.05, -0.01), 9), 8);
    }

    #[test]
    fn zones_follow_the_heading() {
        let mut r = ring();
        r.heading = vec3(0.0, 0.0, 1.0);
        // +Z is now angle zero
        assert_eq!(r.zone_at(vec3(0.0, 0.05, 3.9), 9), 0);
    }

    #[test]
    fn ground_height_above_top_face() {
        let g = Ground::new(24.0, 0.1);
        assert!((g.height_above(vec3(0.0, 1.05, 0.0)) - 1.0).abs() < 1e-12);
        assert!((dot(g.forward(), Vec3::Z) - 1.0).abs() < 1e-12);
    }
}
