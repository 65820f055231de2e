use anyhow::{anyhow, Result};
use tokio::sync::mpsc;

use crate::models::{Batch, RawSample};

use super::accumulator::BatchAccumulator;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, PartialEq)]
pub enum AccumulatorInput {
    Sample(RawSample),
    /// Hand off whatever is buffered, even a partial batch.
    Flush,
}

/// Owns the accumulator. Hands each completed batch to `batches` and drains
/// the remainder when `inputs` closes.
pub async fn batching_loop(
    mut inputs: mpsc::Receiver<AccumulatorInput>,
    batches: mpsc::Sender<Batch>,
) -> Result<()> {
    let mut accumulator = BatchAccumulator::new();

    while let Some(input) = inputs.recv().await {
        let ready = match input {
            AccumulatorInput::Sample(sample) => accumulator.push(sample),
            AccumulatorInput::Flush => !accumulator.is_empty(),
        };
        if ready {
            hand_off(&mut accumulator, &batches).await?;
        }
    }

    if !accumulator.is_empty() {
        log_info!("sample stream closed; flushing {} buffered samples", accumulator.len());
        hand_off(&mut accumulator, &batches).await?;
    }
    Ok(())
}

async fn hand_off(accumulator: &mut BatchAccumulator, batches: &mpsc::Sender<Batch>) -> Result<()> {
    // Reserve first: the buffer is cleared only once the sync side can take the batch.
    let permit = batches.reserve().await.map_err(|_| {
        log_warn!("sync worker gone with {} samples buffered", accumulator.len());
        anyhow!("batch consumer closed")
    })?;

    if let Some(batch) = accumulator.take_batch() {
        log_info!("handing off batch {} ({} samples)", batch.id(), batch.len());
        permit.send(batch);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BATCH_SIZE;

    fn sample(t: i64) -> AccumulatorInput {
        AccumulatorInput::Sample(RawSample::new(t, 65.0, 36.2))
    }

    #[tokio::test]
    async fn emits_full_batches_and_drains_remainder() {
        let (input_tx, input_rx) = mpsc::channel(64);
        let (batch_tx, mut batch_rx) = mpsc::channel(4);
        let worker = tokio::spawn(batching_loop(input_rx, batch_tx));

        for t in 0..(BATCH_SIZE as i64 + 7) {
            input_tx.send(sample(t)).await.unwrap();
        }
        drop(input_tx);

        let first = batch_rx.recv().await.unwrap();
        assert_eq!(first.len(), BATCH_SIZE);
        let rest = batch_rx.recv().await.unwrap();
        assert_eq!(rest.len(), 7);
        assert_eq!(rest.samples()[0].timestamp, BATCH_SIZE as i64);
        assert!(batch_rx.recv().await.is_none());

        worker.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn flush_hands_off_partial_batch() {
        let (input_tx, input_rx) = mpsc::channel(8);
        let (batch_tx, mut batch_rx) = mpsc::channel(4);
        let worker = tokio::spawn(batching_loop(input_rx, batch_tx));

        input_tx.send(sample(1)).await.unwrap();
        input_tx.send(sample(2)).await.unwrap();
        input_tx.send(AccumulatorInput::Flush).await.unwrap();
        // A flush with nothing buffered produces nothing.
        input_tx.send(AccumulatorInput::Flush).await.unwrap();

        let batch = batch_rx.recv().await.unwrap();
        assert_eq!(batch.len(), 2);

        drop(input_tx);
        worker.await.unwrap().unwrap();
        assert!(batch_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn fails_when_sync_side_is_gone() {
        let (input_tx, input_rx) = mpsc::channel(64);
        let (batch_tx, batch_rx) = mpsc::channel(1);
        drop(batch_rx);
        let worker = tokio::spawn(batching_loop(input_rx, batch_tx));

        for t in 0..BATCH_SIZE as i64 {
            input_tx.send(sample(t)).await.unwrap();
        }

        assert!(worker.await.unwrap().is_err());
    }
}
