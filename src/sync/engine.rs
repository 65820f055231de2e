//! Dual-store synchronization engine.
//!
//! A batch is written twice: once as individual records into the durable store,
//! then as a full overwrite of the account's partition in the fast store. The
//! durable phase is the record of truth, so a durable failure ends the call
//! before the fast store is touched; a degraded write is never reported as a
//! success.
//!
//! All writes for one account run under a per-account lock. The fast-store
//! overwrite is a clear followed by one set per sample, and two interleaved
//! overwrites would leave a partition mixing both batches.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use anyhow::Result;
use log::{debug, error, info, warn};
use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::models::{AccountKey, Batch, RawSample};
use crate::store::{DurableStore, FastStore, TimeRange, TreePath};

use super::error::{SyncErrorKind, SyncResult};

/// Node under each account holding the sample mirror.
pub const RAW_DATA_NODE: &str = "RawData";

type AccountLocks = Mutex<HashMap<AccountKey, Arc<AsyncMutex<()>>>>;

pub struct SyncEngine {
    durable: Arc<dyn DurableStore>,
    fast: Arc<dyn FastStore>,
    account_locks: AccountLocks,
}

/// Exclusive hold on one account's writes. Dropping the last lease for an
/// account removes its entry from the lock map.
struct AccountLease<'a> {
    locks: &'a AccountLocks,
    account: AccountKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for AccountLease<'_> {
    fn drop(&mut self) {
        let mut locks = lock_map(self.locks);
        self.guard.take();
        // Entries are only cloned under the map lock, so a count of one means
        // nobody holds or awaits this account.
        if locks
            .get(&self.account)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.account);
        }
    }
}

fn lock_map(
    locks: &AccountLocks,
) -> std::sync::MutexGuard<'_, HashMap<AccountKey, Arc<AsyncMutex<()>>>> {
    match locks.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl SyncEngine {
    pub fn new(durable: Arc<dyn DurableStore>, fast: Arc<dyn FastStore>) -> Self {
        Self {
            durable,
            fast,
            account_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_account(&self, account: &AccountKey) -> AccountLease<'_> {
        let lock = Arc::clone(
            lock_map(&self.account_locks)
                .entry(account.clone())
                .or_default(),
        );
        let guard = lock.lock_owned().await;
        AccountLease {
            locks: &self.account_locks,
            account: account.clone(),
            guard: Some(guard),
        }
    }

    /// Writes `batch` to both stores. Succeeds only if both phases succeed.
    ///
    /// Without an account no store is contacted. A durable failure returns
    /// `NetworkError` and skips the fast store; samples already upserted stay
    /// retrievable.
    pub async fn write(&self, account: Option<&AccountKey>, batch: &Batch) -> SyncResult {
        let Some(account) = account else {
            warn!("batch {} not synced: no account", batch.id());
            return Err(SyncErrorKind::NoAccount);
        };

        let _lease = self.lock_account(account).await;

        self.write_records(account, batch).await?;
        self.overwrite_partition(account, batch).await?;

        info!(
            "batch {} ({} samples) synced to both stores for {}",
            batch.id(),
            batch.len(),
            account
        );
        Ok(())
    }

    /// Replaces the account's fast-store partition with exactly `batch`.
    pub async fn fast_insert(&self, account: Option<&AccountKey>, batch: &Batch) -> SyncResult {
        let Some(account) = account else {
            warn!("fast insert of batch {} skipped: no account", batch.id());
            return Err(SyncErrorKind::NoAccount);
        };

        let _lease = self.lock_account(account).await;
        self.overwrite_partition(account, batch).await
    }

    /// Up to `n` durable records, ascending by timestamp.
    pub async fn read_durable(
        &self,
        account: Option<&AccountKey>,
        n: usize,
    ) -> SyncResult<Vec<RawSample>> {
        self.read_durable_range(account, TimeRange::all(), n).await
    }

    pub async fn read_durable_range(
        &self,
        account: Option<&AccountKey>,
        range: TimeRange,
        limit: usize,
    ) -> SyncResult<Vec<RawSample>> {
        let account = account.ok_or(SyncErrorKind::NoAccount)?;
        self.durable
            .query(account, range, limit)
            .await
            .map_err(|err| {
                error!("durable read for {account} failed: {err:?}");
                SyncErrorKind::NetworkError
            })
    }

    /// The whole fast-store mirror for the account, ascending by timestamp.
    /// Malformed leaves are skipped.
    pub async fn read_fast(&self, account: Option<&AccountKey>) -> SyncResult<Vec<RawSample>> {
        let account = account.ok_or(SyncErrorKind::NoAccount)?;
        let partition = partition_path(account).map_err(|err| {
            error!("no fast store partition for {account}: {err:?}");
            SyncErrorKind::CommunicationProblem
        })?;

        let snapshot = self.fast.get(&partition).await.map_err(|err| {
            error!("fast read of {partition} failed: {err:?}");
            SyncErrorKind::CommunicationProblem
        })?;

        let entries = match snapshot {
            None => return Ok(Vec::new()),
            Some(Value::Object(entries)) => entries,
            Some(other) => {
                warn!("fast partition {partition} is not a node ({other}); treating as empty");
                return Ok(Vec::new());
            }
        };

        let mut samples: Vec<RawSample> = entries
            .iter()
            .filter_map(|(key, value)| {
                let parsed = parse_leaf(key, value);
                if parsed.is_none() {
                    warn!("skipping malformed fast record {partition}/{key}");
                }
                parsed
            })
            .collect();
        samples.sort_by_key(|sample| sample.timestamp);
        Ok(samples)
    }

    async fn write_records(&self, account: &AccountKey, batch: &Batch) -> SyncResult {
        for (index, sample) in batch.iter().enumerate() {
            if let Err(err) = self.durable.upsert(account, sample).await {
                error!(
                    "durable write {}/{} (t={}) of batch {} failed for {account}: {err:?}",
                    index + 1,
                    batch.len(),
                    sample.timestamp,
                    batch.id()
                );
                return Err(SyncErrorKind::NetworkError);
            }
        }
        debug!("batch {} written to durable store", batch.id());
        Ok(())
    }

    async fn overwrite_partition(&self, account: &AccountKey, batch: &Batch) -> SyncResult {
        self.try_overwrite_partition(account, batch)
            .await
            .map_err(|err| {
                error!(
                    "fast store overwrite of batch {} failed for {account}: {err:?}",
                    batch.id()
                );
                SyncErrorKind::CommunicationProblem
            })
    }

    async fn try_overwrite_partition(&self, account: &AccountKey, batch: &Batch) -> Result<()> {
        let partition = partition_path(account)?;

        // The clear must land before any leaf is written.
        self.fast.remove(&partition).await?;

        for sample in batch.iter() {
            let leaf = partition.clone().child(sample.timestamp.to_string())?;
            self.fast.set(&leaf, serde_json::to_value(sample)?).await?;
        }

        debug!("fast partition {partition} now mirrors batch {}", batch.id());
        Ok(())
    }
}

fn partition_path(account: &AccountKey) -> Result<TreePath> {
    TreePath::root().child(account.as_str())?.child(RAW_DATA_NODE)
}

fn parse_leaf(key: &str, value: &Value) -> Option<RawSample> {
    let timestamp = key.parse::<i64>().ok()?;
    let heart_rate = value.get("heartrateSensor")?.as_f64()?;
    let skin_temperature = value.get("skinTemperatureSensor")?.as_f64()?;
    Some(RawSample::new(timestamp, heart_rate, skin_temperature))
}
