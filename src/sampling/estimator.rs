//! Maps ground speed to the acquisition period.
//!
//! The period is the time a subject needs to cross a fixed reference distance
//! at its current speed, bounded to `[FAST_PERIOD, SLOW_PERIOD]`.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Shortest acquisition period, in seconds.
pub const FAST_PERIOD: u64 = 5;
/// Longest acquisition period, in seconds. Also the initial period.
pub const SLOW_PERIOD: u64 = 60;
/// Reference distance in meters.
pub const REFERENCE_DISTANCE_M: f32 = 100.0;

/// Acquisition period in whole seconds, always within the period bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SamplingPeriod(u64);

impl SamplingPeriod {
    pub const FAST: SamplingPeriod = SamplingPeriod(FAST_PERIOD);
    pub const SLOW: SamplingPeriod = SamplingPeriod(SLOW_PERIOD);

    /// Clamps `secs` into the period bounds.
    pub fn clamped(secs: u64) -> Self {
        Self(secs.clamp(FAST_PERIOD, SLOW_PERIOD))
    }

    pub fn as_secs(self) -> u64 {
        self.0
    }

    pub fn as_duration(self) -> Duration {
        Duration::from_secs(self.0)
    }

    /// Absolute difference in seconds.
    pub fn distance(self, other: SamplingPeriod) -> u64 {
        self.0.abs_diff(other.0)
    }
}

impl Default for SamplingPeriod {
    fn default() -> Self {
        Self::SLOW
    }
}

impl fmt::Display for SamplingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

/// Returns the target period for `speed` (m/s), or `None` when the speed
/// carries no motion information (zero, negative, NaN) and the current
/// period should be kept.
pub fn estimate_period(speed: f32) -> Option<SamplingPeriod> {
    if speed.is_nan() || speed <= 0.0 {
        return None;
    }

    // Truncates toward zero; saturates for vanishingly small speeds.
    let time_to_cross = (REFERENCE_DISTANCE_M / speed) as u64;
    Some(SamplingPeriod::clamped(time_to_cross))
}
