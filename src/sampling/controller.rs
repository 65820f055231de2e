use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::info;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::loop_worker::{sampling_loop, AcquisitionTick, LoopChannels};
use super::positioning::PositioningService;
use super::state::SamplingState;

const UPDATE_QUEUE_CAPACITY: usize = 16;
const TICK_QUEUE_CAPACITY: usize = 8;

/// Handle to the adaptive sampling actor.
///
/// The actor owns the period and the last fix; this handle only starts it,
/// stops it, and reads the snapshots it publishes.
pub struct SamplingController {
    positioning: Arc<dyn PositioningService>,
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    snapshot_tx: Arc<watch::Sender<SamplingState>>,
}

impl SamplingController {
    pub fn new(positioning: Arc<dyn PositioningService>) -> Self {
        let (snapshot_tx, _) = watch::channel(SamplingState::new());
        Self {
            positioning,
            handle: None,
            cancel_token: None,
            snapshot_tx: Arc::new(snapshot_tx),
        }
    }

    /// Spawns the actor and returns the stream of acquisition ticks.
    /// The stream ends once the controller is stopped.
    pub fn start(&mut self) -> Result<mpsc::Receiver<AcquisitionTick>> {
        if self.handle.is_some() {
            bail!("sampling already active");
        }

        let cancel_token = CancellationToken::new();
        let (updates_tx, updates_rx) = mpsc::channel(UPDATE_QUEUE_CAPACITY);
        let (ticks_tx, ticks_rx) = mpsc::channel(TICK_QUEUE_CAPACITY);

        let channels = LoopChannels {
            updates_rx,
            updates_tx,
            ticks_tx,
            snapshot_tx: Arc::clone(&self.snapshot_tx),
        };

        let handle = tokio::spawn(sampling_loop(
            Arc::clone(&self.positioning),
            channels,
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(ticks_rx)
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Receiver notified after every processed position update.
    pub fn subscribe(&self) -> watch::Receiver<SamplingState> {
        self.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> SamplingState {
        self.snapshot_tx.borrow().clone()
    }

    /// Cancels the cadence and waits for the actor to exit. No tick is
    /// produced after this returns.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("sampling loop task failed to join")?;
            info!("sampling controller stopped");
        }
        Ok(())
    }
}
