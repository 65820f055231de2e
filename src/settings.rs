use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock, time::Duration};

use crate::sync::RetryPolicy;

pub const ENV_ACCOUNT: &str = "PULSESYNC_ACCOUNT";
pub const ENV_DURABLE_DB: &str = "PULSESYNC_DB";
pub const ENV_FAST_STORE: &str = "PULSESYNC_FAST_STORE";

/// Upper bound on `channel_capacity`, counted in batches.
pub const MAX_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncSettings {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 2_000,
        }
    }
}

impl SyncSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub durable_db_path: PathBuf,
    /// Snapshot file for the fast store; `None` keeps it in memory only.
    pub fast_store_path: Option<PathBuf>,
    /// Email of the signed-in principal; the account key is its local part.
    pub account_email: Option<String>,
    /// Capacity of the queues between pipeline stages.
    pub channel_capacity: usize,
    pub sync: SyncSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            durable_db_path: PathBuf::from("pulsesync.sqlite3"),
            fast_store_path: Some(PathBuf::from("pulsesync-fast.json")),
            account_email: None,
            channel_capacity: 4,
            sync: SyncSettings::default(),
        }
    }
}

impl Settings {
    /// Applies `PULSESYNC_*` overrides read through `lookup`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(email) = lookup(ENV_ACCOUNT).filter(|v| !v.trim().is_empty()) {
            self.account_email = Some(email);
        }
        if let Some(path) = lookup(ENV_DURABLE_DB).filter(|v| !v.trim().is_empty()) {
            self.durable_db_path = PathBuf::from(path);
        }
        if let Some(path) = lookup(ENV_FAST_STORE) {
            self.fast_store_path = if path.trim().is_empty() {
                None
            } else {
                Some(PathBuf::from(path))
            };
        }
        self
    }

    pub fn from_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// `channel_capacity` bounded to `1..=MAX_CHANNEL_CAPACITY`.
    pub fn queue_capacity(&self) -> usize {
        if self.channel_capacity > MAX_CHANNEL_CAPACITY {
            warn!(
                "channelCapacity {} exceeds {}; clamping",
                self.channel_capacity, MAX_CHANNEL_CAPACITY
            );
        }
        self.channel_capacity.clamp(1, MAX_CHANNEL_CAPACITY)
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<Settings>,
}

impl SettingsStore {
    /// Loads settings from `path`, falling back to defaults when the file is
    /// missing or unreadable.
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring malformed settings {}: {err}", path.display());
                Settings::default()
            })
        } else {
            Settings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn settings(&self) -> Settings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update_account(&self, email: Option<String>) -> Result<()> {
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.account_email = email;
        self.persist(&guard)
    }

    fn persist(&self, data: &Settings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
