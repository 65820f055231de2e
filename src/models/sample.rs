//! Physiological sample and batch models.
//!
//! A `RawSample` is keyed by its millisecond timestamp: two samples with the
//! same timestamp in one account's stream are the same record.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Number of samples handed to the synchronization engine per transmission.
pub const BATCH_SIZE: usize = 30;

/// A single heart-rate / skin-temperature reading.
///
/// Field names on the wire match the record layout of both backing stores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub timestamp: i64,
    #[serde(rename = "heartrateSensor")]
    pub heart_rate: f64,
    #[serde(rename = "skinTemperatureSensor")]
    pub skin_temperature: f64,
}

impl RawSample {
    pub fn new(timestamp: i64, heart_rate: f64, skin_temperature: f64) -> Self {
        Self {
            timestamp,
            heart_rate,
            skin_temperature,
        }
    }
}

/// Latest sensor values, stamped into a `RawSample` when an acquisition tick fires.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vitals {
    pub heart_rate: f64,
    pub skin_temperature: f64,
}

impl Vitals {
    pub fn at(self, timestamp: i64) -> RawSample {
        RawSample::new(timestamp, self.heart_rate, self.skin_temperature)
    }
}

/// An ordered group of samples handed from the accumulator to the engine.
///
/// Batches are never persisted as such; the id only correlates log lines.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    id: Uuid,
    samples: Vec<RawSample>,
}

impl Batch {
    pub fn new(samples: Vec<RawSample>) -> Self {
        Self {
            id: Uuid::new_v4(),
            samples,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn samples(&self) -> &[RawSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// True when the batch holds a full transmission unit.
    pub fn is_complete(&self) -> bool {
        self.samples.len() >= BATCH_SIZE
    }

    pub fn iter(&self) -> impl Iterator<Item = &RawSample> {
        self.samples.iter()
    }
}
