use serde::Serialize;

use crate::models::{LocationFix, PositionUpdate};

use super::estimator::{estimate_period, SamplingPeriod};

/// Minimum change, in seconds, before the cadence is restarted.
pub const HYSTERESIS_SECS: u64 = 5;

/// Outcome of feeding one position update to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CadenceDecision {
    /// Speed gave no estimate; period untouched.
    NoEstimate,
    /// Estimate within the hysteresis band of the current period.
    Keep,
    /// Cadence must restart at the new period.
    Restart {
        from: SamplingPeriod,
        to: SamplingPeriod,
    },
}

/// Period and location state owned by the sampling actor.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplingState {
    pub period: SamplingPeriod,
    pub last_fix: Option<LocationFix>,
    pub restarts: u64,
}

impl SamplingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the rounded fix without touching the period.
    pub fn seed_location(&mut self, update: &PositionUpdate) {
        self.last_fix = Some(LocationFix::from_update(update));
    }

    pub fn on_update(&mut self, update: &PositionUpdate) -> CadenceDecision {
        let fix = LocationFix::from_update(update);
        self.last_fix = Some(fix);

        let Some(target) = estimate_period(fix.speed) else {
            return CadenceDecision::NoEstimate;
        };

        if target.distance(self.period) <= HYSTERESIS_SECS {
            return CadenceDecision::Keep;
        }

        let from = self.period;
        self.period = target;
        self.restarts += 1;
        CadenceDecision::Restart { from, to: target }
    }
}
