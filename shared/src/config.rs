use crate::vec3::{vec3, Vec3};
use serde::{Deserialize, Serialize};

/// What happens to a ball once it has produced its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SplitParent {
    /// Parent is removed; children replace it.
    Consume,
    /// Parent stays alive with its split quota used up.
    Retain,
}

/// Ball splitting policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SplitConfig {
    pub parent: SplitParent,
    pub children: usize,
    /// Child radius = parent radius * factor
    pub child_radius_factor: f64,
    /// Horizontal jitter applied to each child's spawn position
    pub child_offset: f64,
    /// Lower bound on child horizontal speed (m/s)
    pub min_child_speed: f64,
    pub max_generation: u32,
    pub max_splits_per_ball: u32,
    /// Seconds a ball must wait after being born before it can split
    pub cooldown: f64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            parent: SplitParent::Consume,
            children: 3,
            child_radius_factor: 0.5,
            child_offset: 0.1,
            min_child_speed: 1.0,
            max_generation: 2,
            max_splits_per_ball: 1,
            cooldown: 0.5,
        }
    }
}

/// Integration and collision constants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhysicsConfig {
    /// Fixed timestep (seconds)
    pub dt: f64,
    pub gravity: Vec3,
    pub ball_friction: f64,
    /// Ball restitution, also used for ball-ball impulses
    pub ball_cor: f64,
    pub plane_friction: f64,
    pub ring_cor_min: f64,
    pub ring_cor_max: f64,
    pub max_balls: usize,
    pub min_ball_radius: f64,
    /// Below this speed a sub-minimum ball is culled
    pub rest_speed: f64,
    pub ball_sizes: Vec<f64>,
    /// Ball-ball contact duration before forced separation (seconds)
    pub contact_threshold: f64,
    pub separation_speed: f64,
    /// Ball-ring contact duration before forced separation (seconds)
    pub ring_contact_threshold: f64,
    pub ring_separation_speed: f64,
    /// Extra distance added when pushing overlapping balls apart
    pub separation_slop: f64,
    pub attraction_small: f64,
    pub attraction_large: f64,
    pub attraction_min_distance: f64,
    /// Constant spin acceleration about each ring's up axis (rad/s^2)
    pub ring_torque: f64,
    pub ring_mass: f64,
    pub split: SplitConfig,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            dt: 0.005,
            gravity: vec3(0.0, -30.0, 0.0),
            ball_friction: 0.1,
            ball_cor: 0.8,
            plane_friction: 0.15,
            ring_cor_min: 0.3,
            ring_cor_max: 0.9,
            max_balls: 40,
            min_ball_radius: 0.02,
            rest_speed: 0.01,
            ball_sizes: vec![0.06, 0.07, 0.08, 0.09],
            contact_threshold: 0.5,
            separation_speed: 20.0,
            ring_contact_threshold: 0.1,
            ring_separation_speed: 10.0,
            separation_slop: 0.005,
            attraction_small: 0.1,
            attraction_large: 8.0,
            attraction_min_distance: 0.1,
            ring_torque: 0.025,
            ring_mass: 1.0,
            split: SplitConfig::default(),
        }
    }
}

impl PhysicsConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.dt.is_finite() || self.dt <= 0.0 {
            return Err("dt must be finite and > 0".to_string());
        }
        for (name, cor) in [
            ("ball_cor", self.ball_cor),
            ("ring_cor_min", self.ring_cor_min),
            ("ring_cor_max", self.ring_cor_max),
        ] {
            if !(0.0..=1.0).contains(&cor) {
                return Err(format!("{} must be in [0, 1]", name));
            }
        }
        if self.ring_cor_min > self.ring_cor_max {
            return Err("ring_cor_min must be <= ring_cor_max".to_string());
        }
        if self.ball_friction < 0.0 || self.plane_friction < 0.0 {
            return Err("friction coefficients must be >= 0".to_string());
        }
        if self.max_balls == 0 {
            return Err("max_balls must be > 0".to_string());
        }
        if self.ball_sizes.is_empty() || self.ball_sizes.iter().any(|r| *r <= 0.0) {
            return Err("ball_sizes must be non-empty and positive".to_string());
        }
        if self.min_ball_radius <= 0.0 {
            return Err("min_ball_radius must be > 0".to_string());
        }
        if self.contact_threshold <= 0.0 || self.ring_contact_threshold <= 0.0 {
            return Err("contact thresholds must be > 0".to_string());
        }
        if self.ring_mass <= 0.0 {
            return Err("ring_mass must be > 0".to_string());
        }
        if self.split.child_radius_factor <= 0.0 || self.split.child_radius_factor > 1.0 {
            return Err("split.child_radius_factor must be in (0, 1]".to_string());
        }
        Ok(())
    }
}

/// Play field: tilting plane and rings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SceneConfig {
    pub plane_size: f64,
    pub plane_thickness: f64,
    pub ring_radii: Vec<f64>,
    pub ring_thickness: f64,
    pub ring_spawn_speed: f64,
    pub ring_spawn_spin: f64,
    pub ring_spawn_height: f64,
    pub tilt_x_amplitude_deg: f64,
    pub tilt_x_frequency: f64,
    pub tilt_z_amplitude_deg: f64,
    pub tilt_z_frequency: f64,
    pub tilt_phase_offset: f64,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            plane_size: 24.0,
            plane_thickness: 0.1,
            ring_radii: vec![4.0, 4.0 * 2.0 / 3.0, 3.0, 2.0],
            ring_thickness: 0.1,
            ring_spawn_speed: 2.0,
            ring_spawn_spin: 3.0,
            ring_spawn_height: 10.0,
            tilt_x_amplitude_deg: 15.0,
            tilt_x_frequency: 0.8,
            tilt_z_amplitude_deg: 10.0,
            tilt_z_frequency: 0.6,
            tilt_phase_offset: std::f64::consts::FRAC_PI_2,
        }
    }
}

impl SceneConfig {
    /// Height of the plane's top face when untilted.
    pub fn ground_top(&self) -> f64 {
        self.plane_thickness / 2.0
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.plane_size <= 0.0 || self.plane_thickness <= 0.0 {
            return Err("plane dimensions must be > 0".to_string());
        }
        if self.ring_radii.is_empty() {
            return Err("at least one ring is required".to_string());
        }
        for r in &self.ring_radii {
            if *r <= self.ring_thickness {
                return Err("ring radii must exceed ring_thickness".to_string());
            }
            if *r * 2.0 >= self.plane_size {
                return Err("rings must fit on the plane".to_string());
            }
        }
        Ok(())
    }
}

/// Per-zone audio parameter behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ZoneConfig {
    pub count: usize,
    /// Console track driven by zone 0; zone n drives `first_track + n`.
    pub first_track: u32,
    pub master_track: u32,
    pub max_volume: f64,
    pub decay_time: f64,
    pub clear_decay_time: f64,
    /// Rest value for azimuth and elevation
    pub spatial_rest: f64,
    /// Exponential relax time constant for azimuth and elevation
    pub spatial_decay: f64,
    pub spatial_epsilon: f64,
    /// Minimum seconds between spatial updates from hits
    pub spatial_cooldown: f64,
    /// Ring heights above the plane mapped onto elevation 0..spatial_max
    pub elevation_range: f64,
    pub spatial_max: f64,
    pub pan_offset: f64,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            count: 9,
            first_track: 2,
            master_track: 1,
            max_volume: 0.7,
            decay_time: 1.5,
            clear_decay_time: 3.0,
            spatial_rest: 0.5,
            spatial_decay: 5.0,
            spatial_epsilon: 0.001,
            spatial_cooldown: 2.0,
            elevation_range: 15.0,
            spatial_max: 0.99,
            pan_offset: 0.5,
        }
    }
}

impl ZoneConfig {
    pub fn track_for_zone(&self, zone: usize) -> u32 {
        self.first_track + zone as u32
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.count == 0 {
            return Err("zone count must be > 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.max_volume) {
            return Err("max_volume must be in [0, 1]".to_string());
        }
        if self.decay_time <= 0.0 || self.clear_decay_time <= 0.0 || self.spatial_decay <= 0.0 {
            return Err("decay times must be > 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.spatial_rest) || !(0.0..=1.0).contains(&self.spatial_max) {
            return Err("spatial_rest and spatial_max must be in [0, 1]".to_string());
        }
        if self.master_track >= self.first_track
            && self.master_track < self.first_track + self.count as u32
        {
            return Err("master_track must not overlap zone tracks".to_string());
        }
        Ok(())
    }
}

/// Master effect envelopes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EffectConfig {
    pub reverb_on: f64,
    pub reverb_off: f64,
    /// Seconds the reverb stays fully on before decaying
    pub reverb_hold: f64,
    pub reverb_decay: f64,
    pub fx_peak: f64,
    pub fx_ramp: f64,
    pub fx_decay: f64,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            reverb_on: 0.8,
            reverb_off: 0.0,
            reverb_hold: 1.0,
            reverb_decay: 1.0,
            fx_peak: 1.0,
            fx_ramp: 0.5,
            fx_decay: 10.0,
        }
    }
}

impl EffectConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.reverb_hold < 0.0 || self.reverb_decay <= 0.0 {
            return Err("reverb timings must be >= 0 (decay > 0)".to_string());
        }
        if self.fx_ramp <= 0.0 || self.fx_decay <= 0.0 {
            return Err("fx timings must be > 0".to_string());
        }
        Ok(())
    }
}

/// Outbound rate limiting
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SenderConfig {
    /// Resend at least this often (seconds)
    pub interval: f64,
    /// Resend immediately when the value moves by more than this
    pub threshold: f64,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            interval: 0.2,
            threshold: 0.01,
        }
    }
}

impl SenderConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.interval < 0.0 || self.threshold < 0.0 {
            return Err("sender interval and threshold must be >= 0".to_string());
        }
        Ok(())
    }
}

/// Release/attraction event phases
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhaseConfig {
    /// Ring hits (counted in normal phase) that arm the attraction phase
    pub hits_to_trigger: u32,
    pub attraction_delay: f64,
    pub attraction_duration: f64,
    pub attraction_strength: f64,
    pub attraction_damping: f64,
    pub repulsion_distance: f64,
    pub repulsion_max: f64,
    pub repulsion_factor: f64,
    pub vertical_factor: f64,
    pub release_speed: f64,
    pub release_vertical_factor: f64,
    pub ring_release_min: f64,
    pub ring_release_max: f64,
    pub ring_release_vertical: f64,
    pub threshold_marker: u32,
    pub release_marker: u32,
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            hits_to_trigger: 300,
            attraction_delay: 0.1,
            attraction_duration: 2.5,
            attraction_strength: 10.0,
            attraction_damping: 5.0,
            repulsion_distance: 0.5,
            repulsion_max: 20.0,
            repulsion_factor: 1.5,
            vertical_factor: 0.2,
            release_speed: 30.0,
            release_vertical_factor: 0.2,
            ring_release_min: 10.0,
            ring_release_max: 20.0,
            ring_release_vertical: 0.5,
            threshold_marker: 1,
            release_marker: 2,
        }
    }
}

impl PhaseConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.hits_to_trigger == 0 {
            return Err("hits_to_trigger must be > 0".to_string());
        }
        if self.attraction_delay < 0.0 || self.attraction_duration < 0.0 {
            return Err("attraction timings must be >= 0".to_string());
        }
        if self.ring_release_min > self.ring_release_max {
            return Err("ring_release_min must be <= ring_release_max".to_string());
        }
        if self.repulsion_distance <= 0.0 {
            return Err("repulsion_distance must be > 0".to_string());
        }
        Ok(())
    }
}

/// Visual feedback tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeedbackConfig {
    pub pulse_scale: f64,
    pub pulse_lerp: f64,
    pub pulse_relax: f64,
    pub glow_speed_divisor: f64,
    pub glow_max: f64,
    /// Glow opacity lost per second
    pub glow_fade_speed: f64,
    pub hemisphere_radius: f64,
    pub hemisphere_max_opacity: f64,
    /// Fade-out after the console stops (seconds)
    pub hemisphere_fade: f64,
    pub clear_fade_out: f64,
    pub clear_fade_in: f64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            pulse_scale: 1.1,
            pulse_lerp: 0.1,
            pulse_relax: 0.05,
            glow_speed_divisor: 15.0,
            glow_max: 0.8,
            glow_fade_speed: 5.0,
            hemisphere_radius: 14.0,
            hemisphere_max_opacity: 0.5,
            hemisphere_fade: 3.0,
            clear_fade_out: 0.3,
            clear_fade_in: 0.7,
        }
    }
}

impl FeedbackConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.glow_speed_divisor <= 0.0 {
            return Err("glow_speed_divisor must be > 0".to_string());
        }
        if self.hemisphere_fade <= 0.0 || self.clear_fade_out <= 0.0 || self.clear_fade_in <= 0.0
        {
            return Err("fade durations must be > 0".to_string());
        }
        Ok(())
    }
}

/// Every static parameter of the toy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToyConfig {
    pub physics: PhysicsConfig,
    pub scene: SceneConfig,
    pub zones: ZoneConfig,
    pub effects: EffectConfig,
    pub sender: SenderConfig,
    pub phase: PhaseConfig,
    pub feedback: FeedbackConfig,
}

impl ToyConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.physics.validate()?;
        self.scene.validate()?;
        self.zones.validate()?;
        self.effects.validate()?;
        self.sender.validate()?;
        self.phase.validate()?;
        self.feedback.validate()?;
        Ok(())
    }

    pub fn from_json(text: &str) -> Result<Self, String> {
        serde_json::from_str(text).map_err(|e| format!("invalid toy config: {}", e))
    }
}
