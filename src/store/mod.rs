//! Backing stores for synchronized samples.
//!
//! Two stores with different tradeoffs hold the same samples:
//!
//! - [`DurableStore`]: one addressable record per `(account, timestamp)`,
//!   range/limit queries. The record of truth.
//! - [`FastStore`]: a hierarchical key-value tree. Samples live under
//!   `account/RawData/<timestamp>` and the whole partition is overwritten on
//!   every sync, so it mirrors the latest batch rather than logging history.
//!
//! Both traits return `anyhow::Result`; the sync engine maps failures onto its
//! own error kinds.

pub mod durable;
pub mod fast;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::models::{AccountKey, RawSample};

pub use durable::Database;
pub use fast::{JsonTreeStore, TreePath};

/// Half-open timestamp window `[from_ms, to_ms)`; `None` leaves a side open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub from_ms: Option<i64>,
    pub to_ms: Option<i64>,
}

impl TimeRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(from_ms: i64, to_ms: i64) -> Self {
        Self {
            from_ms: Some(from_ms),
            to_ms: Some(to_ms),
        }
    }
}

#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Inserts or replaces the record keyed by `(account, sample.timestamp)`.
    async fn upsert(&self, account: &AccountKey, sample: &RawSample) -> Result<()>;

    /// Up to `limit` records of `account` inside `range`, ascending by timestamp.
    async fn query(
        &self,
        account: &AccountKey,
        range: TimeRange,
        limit: usize,
    ) -> Result<Vec<RawSample>>;
}

#[async_trait]
pub trait FastStore: Send + Sync {
    /// Deletes the node at `path` and everything below it. Missing nodes are fine.
    async fn remove(&self, path: &TreePath) -> Result<()>;

    /// Writes `value` at `path`, creating intermediate nodes.
    async fn set(&self, path: &TreePath, value: Value) -> Result<()>;

    /// Subtree at `path`, or `None` when nothing is stored there.
    async fn get(&self, path: &TreePath) -> Result<Option<Value>>;
}
