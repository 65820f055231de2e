use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::models::{LocationFix, PositionUpdate};

use super::estimator::SamplingPeriod;
use super::positioning::{PositioningService, UpdateSink};
use super::state::{CadenceDecision, SamplingState};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Emitted every time the acquisition cadence fires.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquisitionTick {
    /// Wall-clock time of the tick in Unix milliseconds.
    pub at_ms: i64,
    pub period: SamplingPeriod,
    pub location: Option<LocationFix>,
}

pub(super) struct LoopChannels {
    pub updates_rx: mpsc::Receiver<PositionUpdate>,
    pub updates_tx: UpdateSink,
    pub ticks_tx: mpsc::Sender<AcquisitionTick>,
    pub snapshot_tx: Arc<watch::Sender<SamplingState>>,
}

/// Single owner of the sampling period. Position updates and cadence ticks
/// are handled one at a time on this task, so a restart can never race a tick.
pub(super) async fn sampling_loop(
    positioning: Arc<dyn PositioningService>,
    channels: LoopChannels,
    cancel_token: CancellationToken,
) {
    let LoopChannels {
        mut updates_rx,
        updates_tx,
        ticks_tx,
        snapshot_tx,
    } = channels;

    let mut state = SamplingState::new();
    if let Some(last) = positioning.last_known() {
        state.seed_location(&last);
    }

    request_updates(positioning.as_ref(), state.period, &updates_tx);
    let mut ticker = cadence(state.period);
    snapshot_tx.send_replace(state.clone());

    log_info!("sampling loop started at {}", state.period);

    loop {
        tokio::select! {
            biased;

            _ = cancel_token.cancelled() => {
                log_info!("sampling loop shutting down");
                break;
            }
            Some(update) = updates_rx.recv() => {
                if let CadenceDecision::Restart { from, to } = state.on_update(&update) {
                    log_info!(
                        "restarting cadence {} -> {} (speed {:.2} m/s)",
                        from,
                        to,
                        update.speed
                    );
                    // Replacing the interval drops the pending tick of the old cadence.
                    ticker = cadence(to);
                    request_updates(positioning.as_ref(), to, &updates_tx);
                }
                snapshot_tx.send_replace(state.clone());
            }
            _ = ticker.tick() => {
                let tick = AcquisitionTick {
                    at_ms: Utc::now().timestamp_millis(),
                    period: state.period,
                    location: state.last_fix,
                };
                match ticks_tx.try_send(tick) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        log_warn!("acquisition consumer lagging; dropping tick at {}", state.period);
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        log_info!("acquisition consumer gone; sampling loop exiting");
                        break;
                    }
                }
            }
        }
    }

    positioning.stop_updates();
}

/// Ticker whose first tick fires one full period from now.
fn cadence(period: SamplingPeriod) -> Interval {
    let every = period.as_duration();
    let mut ticker = interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

fn request_updates(positioning: &dyn PositioningService, period: SamplingPeriod, sink: &UpdateSink) {
    if let Err(err) = positioning.start_updates(period, sink.clone()) {
        log_error!("failed to request position updates at {}: {err:?}", period);
    }
}
