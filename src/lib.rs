pub mod batch;
pub mod feed;
pub mod identity;
pub mod models;
pub mod pipeline;
pub mod sampling;
pub mod settings;
pub mod store;
pub mod sync;
mod utils;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};
use tokio::io::BufReader;
use tokio::sync::watch;

pub use feed::{feed_loop, ForwardingPositioning};
pub use identity::{IdentityProvider, SessionIdentity};
pub use models::{AccountKey, Batch, PositionUpdate, RawSample, Vitals, BATCH_SIZE};
pub use pipeline::Pipeline;
pub use sampling::{estimate_period, SamplingController, SamplingPeriod};
pub use settings::{Settings, SettingsStore};
pub use store::{Database, DurableStore, FastStore, JsonTreeStore};
pub use sync::{SyncEngine, SyncErrorKind, SyncResult, SyncStats};

const DEFAULT_SETTINGS_PATH: &str = "pulsesync.json";

/// Runs the pipeline against events read from stdin until EOF or Ctrl-C.
pub async fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("PulseSync starting up...");

    let settings_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH));
    let settings = SettingsStore::new(settings_path)?.settings().from_env();

    let database = Database::open(settings.durable_db_path.clone())?;
    let fast_store = match &settings.fast_store_path {
        Some(path) => JsonTreeStore::with_snapshot(path.clone())?,
        None => JsonTreeStore::in_memory(),
    };
    let engine = Arc::new(SyncEngine::new(Arc::new(database), Arc::new(fast_store)));

    let identity = Arc::new(SessionIdentity::new());
    match settings.account_email.as_deref() {
        Some(email) => identity
            .sign_in(email)
            .with_context(|| format!("invalid account email '{email}'"))?,
        None => warn!(
            "no account configured; batches will be rejected until {} is set",
            settings::ENV_ACCOUNT
        ),
    }

    let positioning = Arc::new(ForwardingPositioning::new());
    let (vitals_tx, vitals_rx) = watch::channel(None);

    let pipeline = Pipeline::start(
        &settings,
        engine,
        identity,
        positioning.clone(),
        vitals_rx,
    )?;

    let stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        result = feed_loop(stdin, positioning, vitals_tx) => {
            let applied = result?;
            info!("event feed closed after {applied} events");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted; shutting down");
        }
    }

    let stats = pipeline.shutdown().await?;
    info!("sync summary: {}", serde_json::to_string(&stats)?);
    Ok(())
}
