use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::identity::IdentityProvider;
use crate::models::Batch;

use super::engine::SyncEngine;
use super::error::{SyncErrorKind, SyncResult};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Caller-side retry for whole batches. The engine itself never retries;
/// re-sending is safe because every sample is keyed by its timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub batches_synced: u64,
    pub batches_failed: u64,
    pub samples_synced: u64,
    pub last_error: Option<SyncErrorKind>,
}

/// Delivers batches in arrival order until the accumulator side hangs up.
pub async fn sync_loop(
    engine: Arc<SyncEngine>,
    identity: Arc<dyn IdentityProvider>,
    mut batches: mpsc::Receiver<Batch>,
    policy: RetryPolicy,
) -> SyncStats {
    let mut stats = SyncStats::default();

    while let Some(batch) = batches.recv().await {
        match deliver(&engine, identity.as_ref(), &batch, policy).await {
            Ok(()) => {
                stats.batches_synced += 1;
                stats.samples_synced += batch.len() as u64;
            }
            Err(kind) => {
                log_error!(
                    "batch {} ({} samples) dropped after sync failure: {kind}",
                    batch.id(),
                    batch.len()
                );
                stats.batches_failed += 1;
                stats.last_error = Some(kind);
            }
        }
    }

    log_info!(
        "sync worker drained: {} batches synced, {} failed",
        stats.batches_synced,
        stats.batches_failed
    );
    stats
}

async fn deliver(
    engine: &SyncEngine,
    identity: &dyn IdentityProvider,
    batch: &Batch,
    policy: RetryPolicy,
) -> SyncResult {
    let mut attempt = 1;
    loop {
        let account = identity.current_account();
        match engine.write(account.as_ref(), batch).await {
            Ok(()) => return Ok(()),
            Err(kind) if kind.is_transient() && attempt < policy.max_attempts => {
                log_warn!(
                    "batch {} attempt {}/{} failed ({kind}); retrying in {:?}",
                    batch.id(),
                    attempt,
                    policy.max_attempts,
                    policy.retry_delay
                );
                tokio::time::sleep(policy.retry_delay).await;
                attempt += 1;
            }
            Err(kind) => return Err(kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::{bail, Result};
    use async_trait::async_trait;

    use super::*;
    use crate::identity::SessionIdentity;
    use crate::models::{AccountKey, RawSample};
    use crate::store::{Database, DurableStore, JsonTreeStore, TimeRange};

    /// Fails the first `failures` upserts, then delegates.
    struct RecoveringDurable {
        inner: Database,
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DurableStore for RecoveringDurable {
        async fn upsert(&self, account: &AccountKey, sample: &RawSample) -> Result<()> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                bail!("store unreachable");
            }
            self.inner.upsert(account, sample).await
        }

        async fn query(
            &self,
            account: &AccountKey,
            range: TimeRange,
            limit: usize,
        ) -> Result<Vec<RawSample>> {
            self.inner.query(account, range, limit).await
        }
    }

    fn batch(start: i64) -> Batch {
        Batch::new(vec![
            RawSample::new(start, 70.0, 36.5),
            RawSample::new(start + 1000, 71.0, 36.6),
        ])
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            retry_delay: Duration::from_millis(50),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_until_success() {
        let durable = Arc::new(RecoveringDurable {
            inner: Database::open_in_memory().unwrap(),
            failures: 2,
            calls: AtomicUsize::new(0),
        });
        let engine = Arc::new(SyncEngine::new(durable.clone(), Arc::new(JsonTreeStore::in_memory())));
        let identity = Arc::new(SessionIdentity::signed_in("alice@example.com").unwrap());

        let (tx, rx) = mpsc::channel(4);
        tx.send(batch(1000)).await.unwrap();
        drop(tx);

        let stats = sync_loop(engine.clone(), identity, rx, policy()).await;

        assert_eq!(stats.batches_synced, 1);
        assert_eq!(stats.samples_synced, 2);
        assert_eq!(stats.batches_failed, 0);
        let alice = AccountKey::new("alice").unwrap();
        assert_eq!(engine.read_fast(Some(&alice)).await.unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let durable = Arc::new(RecoveringDurable {
            inner: Database::open_in_memory().unwrap(),
            failures: usize::MAX,
            calls: AtomicUsize::new(0),
        });
        let engine = Arc::new(SyncEngine::new(durable.clone(), Arc::new(JsonTreeStore::in_memory())));
        let identity = Arc::new(SessionIdentity::signed_in("alice@example.com").unwrap());

        let (tx, rx) = mpsc::channel(4);
        tx.send(batch(1000)).await.unwrap();
        drop(tx);

        let stats = sync_loop(engine, identity, rx, policy()).await;

        assert_eq!(stats.batches_failed, 1);
        assert_eq!(stats.last_error, Some(SyncErrorKind::NetworkError));
        assert_eq!(durable.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn missing_account_is_not_retried() {
        let durable = Arc::new(RecoveringDurable {
            inner: Database::open_in_memory().unwrap(),
            failures: 0,
            calls: AtomicUsize::new(0),
        });
        let engine = Arc::new(SyncEngine::new(durable.clone(), Arc::new(JsonTreeStore::in_memory())));

        let (tx, rx) = mpsc::channel(4);
        tx.send(batch(1000)).await.unwrap();
        tx.send(batch(5000)).await.unwrap();
        drop(tx);

        let stats = sync_loop(engine, Arc::new(SessionIdentity::new()), rx, policy()).await;

        assert_eq!(stats.batches_failed, 2);
        assert_eq!(stats.last_error, Some(SyncErrorKind::NoAccount));
        assert_eq!(durable.calls.load(Ordering::SeqCst), 0);
    }
}
