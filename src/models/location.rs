//! Location models.
//!
//! `PositionUpdate` is what the positioning collaborator reports. `LocationFix`
//! is the rounded form the sampling controller keeps and hands out; coordinates
//! never leave the controller at full precision.

use serde::{Deserialize, Serialize};

/// Decimal places kept on latitude/longitude (~0.1 km).
pub const LOCATION_DECIMAL_PLACES: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub latitude: f64,
    pub longitude: f64,
    /// Ground speed in meters per second.
    pub speed: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f32,
}

impl LocationFix {
    pub fn from_update(update: &PositionUpdate) -> Self {
        Self {
            latitude: round_coordinate(update.latitude),
            longitude: round_coordinate(update.longitude),
            speed: update.speed.max(0.0),
        }
    }
}

/// Fraction digits needed to print any finite `f64` exactly.
const EXACT_FRACTION_DIGITS: usize = 1074;

/// Magnitude from which every `f64` is already an integer.
const INTEGRAL_THRESHOLD: f64 = 4_503_599_627_370_496.0; // 2^52

/// Rounds half-to-even at `LOCATION_DECIMAL_PLACES`, deciding on the exact
/// decimal value of `value` rather than on a scaled (and re-rounded) copy.
pub fn round_coordinate(value: f64) -> f64 {
    if !value.is_finite() || value.abs() >= INTEGRAL_THRESHOLD {
        return value;
    }

    let places = LOCATION_DECIMAL_PLACES as usize;
    let exact = format!("{:.*}", EXACT_FRACTION_DIGITS, value.abs());
    let Some((whole, fraction)) = exact.split_once('.') else {
        return value;
    };
    let (kept, dropped) = fraction.split_at(places);

    let Ok(mut units) = format!("{whole}{kept}").parse::<u64>() else {
        return value;
    };

    let mut dropped_digits = dropped.bytes();
    let round_up = match dropped_digits.next() {
        Some(b'6'..=b'9') => true,
        Some(b'5') => dropped_digits.any(|d| d != b'0') || units % 2 == 1,
        _ => false,
    };
    if round_up {
        units += 1;
    }

    let scale = 10u64.pow(LOCATION_DECIMAL_PLACES as u32);
    let rounded = format!("{}.{:0places$}", units / scale, units % scale);
    match rounded.parse::<f64>() {
        Ok(magnitude) if value.is_sign_negative() => -magnitude,
        Ok(magnitude) => magnitude,
        Err(_) => value,
    }
}
