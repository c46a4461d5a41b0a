//! Global event phases gating the release burst.
//!
//! Two ways in: a manual release jumps straight to `Releasing`; enough ring
//! hits arm a short delay, then `Attracting`, then `Releasing`. The phase
//! returns to `Normal` once the reverb swell has fully decayed.

use ringsonic_shared::config::PhaseConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventPhase {
    Normal,
    Attracting { since: f64 },
    Releasing { since: f64 },
}

/// What the simulation must do in response to a transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PhaseAction {
    /// Fire a console marker
    Marker(u32),
    BeginAttraction,
    /// Eject balls and rings, start the master effects, fire the release marker
    BeginRelease,
    ReturnToNormal,
}

pub struct PhaseController {
    config: PhaseConfig,
    phase: EventPhase,
    hit_count: u32,
    armed_at: Option<f64>,
}

impl PhaseController {
    pub fn new(config: PhaseConfig) -> Self {
        Self {
            config,
            phase: EventPhase::Normal,
            hit_count: 0,
            armed_at: None,
        }
    }

    pub fn config(&self) -> &PhaseConfig {
        &self.config
    }

    pub fn phase(&self) -> EventPhase {
        self.phase
    }

    pub fn hit_count(&self) -> u32 {
        self.hit_count
    }

    pub fn is_armed(&self) -> bool {
        self.armed_at.is_some()
    }

    pub fn is_attracting(&self) -> bool {
        matches!(self.phase, EventPhase::Attracting { .. })
    }

    /// Count a ring hit. Only hits in the normal phase count.
    pub fn register_hit(&mut self, now: f64) -> Option<PhaseAction> {
        if self.phase != EventPhase::Normal || self.armed_at.is_some() {
            return None;
        }
        self.hit_count += 1;
        if self.hit_count < self.config.hits_to_trigger {
            return None;
        }
        tracing::info!("{} ring hits, arming attraction", self.hit_count);
        self.armed_at = Some(now);
        Some(PhaseAction::Marker(self.config.threshold_marker))
    }

    /// Manual release. A no-op outside the normal phase.
    pub fn request_release(&mut self, now: f64) -> Option<PhaseAction> {
        if self.phase != EventPhase::Normal {
            tracing::info!("Release ignored, already in {:?}", self.phase);
            return None;
        }
        self.armed_at = None;
        self.phase = EventPhase::Releasing { since: now };
        Some(PhaseAction::BeginRelease)
    }

    /// Advance timed transitions. `reverb_active` reports whether the master
    /// reverb swell is still running.
    pub fn update(&mut self, now: f64, reverb_active: bool) -> Option<PhaseAction> {
        match self.phase {
            EventPhase::Normal => {
                let armed = self.armed_at?;
                if now - armed < self.config.attraction_delay {
                    return None;
                }
                self.armed_at = None;
                self.phase = EventPhase::Attracting { since: now };
                Some(PhaseAction::BeginAttraction)
            }
            EventPhase::Attracting { since } => {
                if now - since < self.config.attraction_duration {
                    return None;
                }
                self.phase = EventPhase::Releasing { since: now };
                Some(PhaseAction::BeginRelease)
            }
            EventPhase::Releasing { .. } => {
                if reverb_active {
                    return None;
                }
                self.reset();
                Some(PhaseAction::ReturnToNormal)
            }
        }
    }

    /// Back to normal with counters cleared.
    pub fn reset(&mut self) {
        self.phase = EventPhase::Normal;
        self.hit_count = 0;
        self.armed_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(hits: u32) -> PhaseController {
        PhaseController::new(PhaseConfig {
            hits_to_trigger: hits,
            ..PhaseConfig::default()
        })
    }

    #[test]
    fn starts_normal() {
        let c = controller(3);
        assert_eq!(c.phase(), EventPhase::Normal);
        assert_eq!(c.hit_count(), 0);
    }

    #[test]
    fn manual_release_enters_releasing() {
        let mut c = controller(3);
        assert_eq!(c.request_release(1.0), Some(PhaseAction::BeginRelease));
        assert_eq!(c.phase(), EventPhase::Releasing { since: 1.0 });
    }

    #[test]
    fn release_while_releasing_is_a_no_op() {
        let mut c = controller(3);
        c.request_release(1.0);
        assert_eq!(c.request_release(1.5), None);
        assert_eq!(c.phase(), EventPhase::Releasing { since: 1.0 });
    }

    #[test]
    fn release_while_attracting_is_a_no_op() {
        let mut c = controller(1);
        c.register_hit(0.0);
        c.update(0.2, false);
        assert!(c.is_attracting());
        assert_eq!(c.request_release(0.3), None);
        assert!(c.is_attracting());
    }

    #[test]
    fn hit_threshold_arms_then_attracts_then_releases() {
        let mut c = controller(3);
        assert_eq!(c.register_hit(0.0), None);
        assert_eq!(c.register_hit(0.1), None);
        assert_eq!(c.register_hit(0.2), Some(PhaseAction::Marker(1)));
        assert!(c.is_armed());

        // Delay not yet elapsed
        assert_eq!(c.update(0.25, false), None);
        assert_eq!(c.update(0.3, false), Some(PhaseAction::BeginAttraction));
        assert_eq!(c.phase(), EventPhase::Attracting { since: 0.3 });

        assert_eq!(c.update(2.0, false), None);
        assert_eq!(c.update(2.8, false), Some(PhaseAction::BeginRelease));
        assert_eq!(c.phase(), EventPhase::Releasing { since: 2.8 });
    }

    #[test]
    fn hits_outside_normal_do_not_count() {
        let mut c = controller(3);
        c.request_release(0.0);
        c.register_hit(0.1);
        c.register_hit(0.2);
        assert_eq!(c.hit_count(), 0);
    }

    #[test]
    fn armed_controller_stops_counting() {
        let mut c = controller(1);
        c.register_hit(0.0);
        assert_eq!(c.register_hit(0.01), None);
        assert_eq!(c.hit_count(), 1);
    }

    #[test]
    fn returns_to_normal_when_reverb_finishes() {
        let mut c = controller(3);
        c.register_hit(0.0);
        c.request_release(0.1);
        assert_eq!(c.update(0.5, true), None);
        assert_eq!(c.update(2.2, false), Some(PhaseAction::ReturnToNormal));
        assert_eq!(c.phase(), EventPhase::Normal);
        assert_eq!(c.hit_count(), 0);
    }

    #[test]
    fn manual_release_cancels_pending_attraction() {
        let mut c = controller(1);
        c.register_hit(0.0);
        c.request_release(0.05);
        assert!(!c.is_armed());
        assert_eq!(c.update(0.5, true), None);
    }
}
