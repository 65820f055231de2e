use std::sync::Arc;
use std::time::Duration;

use pulsesync::store::TimeRange;
use pulsesync::{
    feed_loop, AccountKey, Batch, Database, ForwardingPositioning, JsonTreeStore, Pipeline,
    RawSample, SamplingPeriod, SessionIdentity, Settings, SyncEngine, SyncErrorKind,
};
use tokio::sync::watch;

fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("pulsesync-{name}-{}", uuid::Uuid::new_v4()))
}

#[tokio::test]
async fn batch_lands_in_both_stores_and_survives_restart() {
    let db_path = temp_path("durable.sqlite3");
    let snapshot_path = temp_path("fast.json");
    let alice = AccountKey::from_email("alice@example.com").unwrap();
    let batch = Batch::new(vec![
        RawSample::new(1_000, 70.0, 36.5),
        RawSample::new(2_000, 72.0, 36.6),
    ]);

    {
        let engine = SyncEngine::new(
            Arc::new(Database::open(db_path.clone()).unwrap()),
            Arc::new(JsonTreeStore::with_snapshot(snapshot_path.clone()).unwrap()),
        );
        engine.write(Some(&alice), &batch).await.unwrap();
    }

    let engine = SyncEngine::new(
        Arc::new(Database::open(db_path.clone()).unwrap()),
        Arc::new(JsonTreeStore::with_snapshot(snapshot_path.clone()).unwrap()),
    );

    let durable = engine.read_durable(Some(&alice), 10).await.unwrap();
    assert_eq!(durable, batch.samples().to_vec());

    let fast = engine.read_fast(Some(&alice)).await.unwrap();
    assert_eq!(fast, batch.samples().to_vec());

    let window = engine
        .read_durable_range(Some(&alice), TimeRange::between(1_500, 3_000), 10)
        .await
        .unwrap();
    assert_eq!(window, vec![RawSample::new(2_000, 72.0, 36.6)]);

    let _ = std::fs::remove_file(&db_path);
    let _ = std::fs::remove_file(&snapshot_path);
}

#[tokio::test]
async fn signed_out_session_is_rejected() {
    let engine = SyncEngine::new(
        Arc::new(Database::open_in_memory().unwrap()),
        Arc::new(JsonTreeStore::in_memory()),
    );
    let batch = Batch::new(vec![RawSample::new(1, 60.0, 36.0)]);

    assert_eq!(engine.write(None, &batch).await, Err(SyncErrorKind::NoAccount));
    assert_eq!(engine.read_fast(None).await, Err(SyncErrorKind::NoAccount));
}

#[tokio::test(start_paused = true)]
async fn event_feed_drives_cadence_and_sync() {
    let database = Database::open_in_memory().unwrap();
    let engine = Arc::new(SyncEngine::new(
        Arc::new(database.clone()),
        Arc::new(JsonTreeStore::in_memory()),
    ));
    let identity = Arc::new(SessionIdentity::signed_in("bob@example.com").unwrap());
    let positioning = Arc::new(ForwardingPositioning::new());
    let (vitals_tx, vitals_rx) = watch::channel(None);

    let pipeline = Pipeline::start(
        &Settings::default(),
        engine.clone(),
        identity,
        positioning.clone(),
        vitals_rx,
    )
    .unwrap();

    let mut snapshots = pipeline.sampling_snapshots();
    snapshots.changed().await.unwrap();
    assert_eq!(snapshots.borrow().period, SamplingPeriod::SLOW);

    let events = concat!(
        "{\"type\":\"vitals\",\"heart_rate\":88.0,\"skin_temperature\":36.8}\n",
        "{\"type\":\"fix\",\"latitude\":45.46421,\"longitude\":9.18998,\"speed\":10.0}\n",
    );
    let applied = feed_loop(events.as_bytes(), positioning, vitals_tx)
        .await
        .unwrap();
    assert_eq!(applied, 2);

    snapshots.changed().await.unwrap();
    assert_eq!(snapshots.borrow().period.as_secs(), 10);

    // Ticks at 10s, 20s and 30s.
    tokio::time::sleep(Duration::from_secs(35)).await;

    let stats = pipeline.shutdown().await.unwrap();
    assert_eq!(stats.samples_synced, 3);
    assert_eq!(stats.last_error, None);

    let bob = AccountKey::new("bob").unwrap();
    let stored = engine.read_durable(Some(&bob), 10).await.unwrap();
    assert_eq!(stored.len(), 3);
    assert!(stored.iter().all(|s| s.heart_rate == 88.0));
    assert_eq!(database.count_samples(&bob).await.unwrap(), 3);
}
