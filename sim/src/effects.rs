//! Master effect envelopes started by a release.

use ringsonic_shared::config::EffectConfig;
use ringsonic_shared::vec3::lerp;

/// Master reverb send: held fully wet, then faded back to dry.
#[derive(Debug, Clone)]
pub struct ReverbSwell {
    on: f64,
    off: f64,
    hold: f64,
    decay: f64,
    started_at: Option<f64>,
}

impl ReverbSwell {
    pub fn new(config: &EffectConfig) -> Self {
        Self {
            on: config.reverb_on,
            off: config.reverb_off,
            hold: config.reverb_hold,
            decay: config.reverb_decay,
            started_at: None,
        }
    }

    pub fn start(&mut self, now: f64) {
        self.started_at = Some(now);
    }

    pub fn stop(&mut self) {
        self.started_at = None;
    }

    pub fn is_active(&self) -> bool {
        self.started_at.is_some()
    }

    /// Current send level, or `None` when idle. The tick on which the
    /// swell finishes still reports the dry value once.
    pub fn update(&mut self, now: f64) -> Option<f64> {
        let started = self.started_at?;
        let elapsed = now - started;
        if elapsed < self.hold {
            return Some(self.on);
        }
        let t = (elapsed - self.hold) / self.decay;
        if t >= 1.0 {
            self.started_at = None;
            return Some(self.off);
        }
        Some(lerp(self.on, self.off, t))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FxStage {
    Off,
    RampingUp { since: f64 },
    Decaying { since: f64 },
}

/// Master FX parameter: linear ramp up, longer linear decay, off.
#[derive(Debug, Clone)]
pub struct MasterFxEnvelope {
    peak: f64,
    ramp: f64,
    decay: f64,
    stage: FxStage,
    value: f64,
}

impl MasterFxEnvelope {
    pub fn new(config: &EffectConfig) -> Self {
        Self {
            peak: config.fx_peak,
            ramp: config.fx_ramp,
            decay: config.fx_decay,
            stage: FxStage::Off,
            value: 0.0,
        }
    }

    /// Restart the ramp from 0, even mid-decay.
    pub fn trigger(&mut self, now: f64) {
        self.stage = FxStage::RampingUp { since: now };
    }

    pub fn stop(&mut self) {
        self.stage = FxStage::Off;
        self.value = 0.0;
    }

    pub fn stage(&self) -> FxStage {
        self.stage
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn update(&mut self, now: f64) -> f64 {
        match self.stage {
            FxStage::Off => self.value = 0.0,
            FxStage::RampingUp { since } => {
                let elapsed = now - since;
                if elapsed >= self.ramp {
                    self.stage = FxStage::Decaying {
                        since: since + self.ramp,
                    };
                    self.value = self.peak;
                } else {
                    self.value = self.peak * elapsed / self.ramp;
                }
            }
            FxStage::Decaying { since } => {
                let elapsed = now - since;
                if elapsed >= self.decay {
                    self.stage = FxStage::Off;
                    self.value = 0.0;
                } else {
                    self.value = self.peak * (1.0 - elapsed / self.decay);
                }
            }
        }
        self.value
    }
}
