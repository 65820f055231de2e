//! Wires the stages together:
//!
//! acquisition ticks -> vitals sampling -> batching loop -> sync worker
//!
//! Each stage owns its state and talks to the next over a bounded channel.
//! Shutdown stops the sampling controller; closing its tick stream lets every
//! later stage drain and exit in order, so the last partial batch is still
//! synced.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::batch::{batching_loop, AccumulatorInput};
use crate::identity::IdentityProvider;
use crate::models::{Vitals, BATCH_SIZE};
use crate::sampling::{AcquisitionTick, PositioningService, SamplingController, SamplingState};
use crate::settings::Settings;
use crate::sync::{sync_loop, SyncEngine, SyncStats};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Latest sensor reading; `None` until the sensors report.
pub type VitalsFeed = watch::Receiver<Option<Vitals>>;

pub struct Pipeline {
    controller: SamplingController,
    acquisition: JoinHandle<()>,
    batching: JoinHandle<Result<()>>,
    sync: JoinHandle<SyncStats>,
}

impl Pipeline {
    pub fn start(
        settings: &Settings,
        engine: Arc<SyncEngine>,
        identity: Arc<dyn IdentityProvider>,
        positioning: Arc<dyn PositioningService>,
        vitals: VitalsFeed,
    ) -> Result<Self> {
        let capacity = settings.queue_capacity();

        let mut controller = SamplingController::new(positioning);
        let ticks = controller.start().context("failed to start sampling controller")?;

        let (input_tx, input_rx) = mpsc::channel(capacity * BATCH_SIZE);
        let (batch_tx, batch_rx) = mpsc::channel(capacity);

        let sync = tokio::spawn(sync_loop(
            engine,
            identity,
            batch_rx,
            settings.sync.retry_policy(),
        ));
        let batching = tokio::spawn(batching_loop(input_rx, batch_tx));
        let acquisition = tokio::spawn(acquisition_loop(ticks, vitals, input_tx));

        log_info!("pipeline started");

        Ok(Self {
            controller,
            acquisition,
            batching,
            sync,
        })
    }

    pub fn sampling_snapshots(&self) -> watch::Receiver<SamplingState> {
        self.controller.subscribe()
    }

    /// Stops sampling, drains buffered samples through the engine and returns
    /// the sync statistics.
    pub async fn shutdown(mut self) -> Result<SyncStats> {
        self.controller.stop().await?;
        self.acquisition
            .await
            .context("acquisition task failed to join")?;
        let batching = self
            .batching
            .await
            .context("batching task failed to join")?;
        let stats = self.sync.await.context("sync task failed to join")?;

        batching?;
        log_info!("pipeline stopped");
        Ok(stats)
    }
}

/// Turns each tick into a sample stamped with the latest vitals. Timestamps
/// are forced strictly increasing so two ticks never share a key.
async fn acquisition_loop(
    mut ticks: mpsc::Receiver<AcquisitionTick>,
    vitals: VitalsFeed,
    inputs: mpsc::Sender<AccumulatorInput>,
) {
    let mut last_timestamp = i64::MIN;

    while let Some(tick) = ticks.recv().await {
        let current = *vitals.borrow();
        let Some(current) = current else {
            log_warn!("no vitals reported yet; skipping tick at {}", tick.period);
            continue;
        };

        let timestamp = tick.at_ms.max(last_timestamp.saturating_add(1));
        last_timestamp = timestamp;

        if inputs
            .send(AccumulatorInput::Sample(current.at(timestamp)))
            .await
            .is_err()
        {
            log_error!("batching loop gone; acquisition stopping");
            break;
        }
    }

    log_info!("acquisition stream ended");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::identity::SessionIdentity;
    use crate::models::{AccountKey, PositionUpdate};
    use crate::sampling::positioning::testing::RecordingPositioning;
    use crate::sampling::SamplingPeriod;
    use crate::store::{Database, JsonTreeStore};

    #[tokio::test(start_paused = true)]
    async fn samples_at_adapted_cadence_and_flushes_on_shutdown() {
        let database = Database::open_in_memory().unwrap();
        let engine = Arc::new(SyncEngine::new(
            Arc::new(database.clone()),
            Arc::new(JsonTreeStore::in_memory()),
        ));
        let identity = Arc::new(SessionIdentity::signed_in("alice@example.com").unwrap());
        let positioning = RecordingPositioning::default();
        let (vitals_tx, vitals_rx) = watch::channel(None);

        let pipeline = Pipeline::start(
            &Settings::default(),
            engine.clone(),
            identity,
            Arc::new(positioning.clone()),
            vitals_rx,
        )
        .unwrap();

        let mut snapshots = pipeline.sampling_snapshots();
        snapshots.changed().await.unwrap();
        vitals_tx.send_replace(Some(Vitals {
            heart_rate: 72.0,
            skin_temperature: 36.4,
        }));

        positioning
            .push(PositionUpdate {
                latitude: 45.0,
                longitude: 9.0,
                speed: 25.0,
            })
            .await;
        snapshots.changed().await.unwrap();
        assert_eq!(snapshots.borrow().period, SamplingPeriod::FAST);

        // 12 ticks at 5s: not enough for a full batch.
        tokio::time::sleep(Duration::from_secs(62)).await;

        let stats = pipeline.shutdown().await.unwrap();
        assert_eq!(stats.batches_synced, 1);
        assert_eq!(stats.samples_synced, 12);

        let alice = AccountKey::new("alice").unwrap();
        let mirror = engine.read_fast(Some(&alice)).await.unwrap();
        assert_eq!(mirror.len(), 12);
        assert!(mirror.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert_eq!(database.count_samples(&alice).await.unwrap(), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_channel_capacity_is_clamped() {
        let engine = Arc::new(SyncEngine::new(
            Arc::new(Database::open_in_memory().unwrap()),
            Arc::new(JsonTreeStore::in_memory()),
        ));
        let settings = Settings {
            channel_capacity: usize::MAX,
            ..Settings::default()
        };
        let (_vitals_tx, vitals_rx) = watch::channel(None);

        let pipeline = Pipeline::start(
            &settings,
            engine,
            Arc::new(SessionIdentity::new()),
            Arc::new(RecordingPositioning::default()),
            vitals_rx,
        )
        .unwrap();

        let stats = pipeline.shutdown().await.unwrap();
        assert_eq!(stats, SyncStats::default());
    }
}
