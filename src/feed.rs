//! Newline-delimited JSON event feed.
//!
//! Stands in for the device's positioning service and body sensors when
//! running the binary: each line is either
//!
//! ```text
//! {"type":"fix","latitude":45.4642,"longitude":9.19,"speed":1.4}
//! {"type":"vitals","heart_rate":72.0,"skin_temperature":36.4}
//! ```

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, watch};

use crate::models::{PositionUpdate, Vitals};
use crate::sampling::{PositioningService, SamplingPeriod, UpdateSink};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    Fix(PositionUpdate),
    Vitals(Vitals),
}

/// Positioning service that forwards externally supplied fixes to whichever
/// sink the sampling controller registered last.
#[derive(Default)]
pub struct ForwardingPositioning {
    sink: Mutex<Option<UpdateSink>>,
    last_known: Mutex<Option<PositionUpdate>>,
}

impl ForwardingPositioning {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `update` if updates are running; it always becomes the last
    /// known position.
    pub fn forward(&self, update: PositionUpdate) {
        *lock(&self.last_known) = Some(update);

        let sink = lock(&self.sink).clone();
        let Some(sink) = sink else {
            return;
        };
        match sink.try_send(update) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                log_warn!("sampling controller busy; dropping position update");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                lock(&self.sink).take();
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl PositioningService for ForwardingPositioning {
    fn start_updates(&self, period: SamplingPeriod, sink: UpdateSink) -> Result<()> {
        log_info!("position updates requested every {}", period);
        *lock(&self.sink) = Some(sink);
        Ok(())
    }

    fn stop_updates(&self) {
        log_info!("position updates stopped");
        lock(&self.sink).take();
    }

    fn last_known(&self) -> Option<PositionUpdate> {
        *lock(&self.last_known)
    }
}

/// Reads events until EOF. Malformed lines are logged and skipped.
/// Returns the number of events applied.
pub async fn feed_loop<R>(
    reader: R,
    positioning: Arc<ForwardingPositioning>,
    vitals: watch::Sender<Option<Vitals>>,
) -> Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut applied = 0u64;

    while let Some(line) = lines.next_line().await.context("failed to read event feed")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<FeedEvent>(line) {
            Ok(FeedEvent::Fix(update)) => positioning.forward(update),
            Ok(FeedEvent::Vitals(reading)) => {
                vitals.send_replace(Some(reading));
            }
            Err(err) => {
                log_warn!("skipping malformed event '{line}': {err}");
                continue;
            }
        }
        applied += 1;
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_event_kinds() {
        let fix: FeedEvent =
            serde_json::from_str(r#"{"type":"fix","latitude":1.5,"longitude":2.5,"speed":3.0}"#)
                .unwrap();
        assert_eq!(
            fix,
            FeedEvent::Fix(PositionUpdate {
                latitude: 1.5,
                longitude: 2.5,
                speed: 3.0
            })
        );

        let vitals: FeedEvent =
            serde_json::from_str(r#"{"type":"vitals","heart_rate":70.0,"skin_temperature":36.5}"#)
                .unwrap();
        assert_eq!(
            vitals,
            FeedEvent::Vitals(Vitals {
                heart_rate: 70.0,
                skin_temperature: 36.5
            })
        );
    }

    #[tokio::test]
    async fn forwards_fixes_and_publishes_vitals() {
        let positioning = Arc::new(ForwardingPositioning::new());
        let (sink, mut updates) = mpsc::channel(4);
        positioning
            .start_updates(SamplingPeriod::SLOW, sink)
            .unwrap();
        let (vitals_tx, vitals_rx) = watch::channel(None);

        let input = concat!(
            "{\"type\":\"fix\",\"latitude\":45.1,\"longitude\":9.2,\"speed\":4.0}\n",
            "not json\n",
            "\n",
            "{\"type\":\"vitals\",\"heart_rate\":80.0,\"skin_temperature\":36.9}\n",
        );

        let applied = feed_loop(input.as_bytes(), positioning.clone(), vitals_tx)
            .await
            .unwrap();

        assert_eq!(applied, 2);
        assert_eq!(updates.recv().await.unwrap().speed, 4.0);
        assert_eq!(vitals_rx.borrow().unwrap().heart_rate, 80.0);
        assert_eq!(positioning.last_known().unwrap().latitude, 45.1);
    }

    #[test]
    fn fixes_without_running_updates_only_become_last_known() {
        let positioning = ForwardingPositioning::new();
        positioning.forward(PositionUpdate {
            latitude: 1.0,
            longitude: 2.0,
            speed: 0.0,
        });
        assert!(positioning.last_known().is_some());
    }
}
