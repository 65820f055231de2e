use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Row};

use crate::models::{AccountKey, RawSample};
use crate::store::{DurableStore, TimeRange};

use super::Database;

fn row_to_sample(row: &Row) -> rusqlite::Result<RawSample> {
    Ok(RawSample {
        timestamp: row.get("timestamp")?,
        heart_rate: row.get("heartrate_sensor")?,
        skin_temperature: row.get("skin_temperature_sensor")?,
    })
}

impl Database {
    pub async fn upsert_sample(&self, account: &AccountKey, sample: &RawSample) -> Result<()> {
        let account = account.as_str().to_string();
        let record = *sample;
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO raw_samples (account_key, timestamp, heartrate_sensor, skin_temperature_sensor)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (account_key, timestamp) DO UPDATE SET
                     heartrate_sensor = excluded.heartrate_sensor,
                     skin_temperature_sensor = excluded.skin_temperature_sensor",
                params![
                    account,
                    record.timestamp,
                    record.heart_rate,
                    record.skin_temperature,
                ],
            )
            .with_context(|| format!("failed to upsert sample {}", record.timestamp))?;
            Ok(())
        })
        .await
    }

    pub async fn query_samples(
        &self,
        account: &AccountKey,
        range: TimeRange,
        limit: usize,
    ) -> Result<Vec<RawSample>> {
        let account = account.as_str().to_string();
        let from_ms = range.from_ms.unwrap_or(i64::MIN);
        let to_ms = range.to_ms;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT timestamp, heartrate_sensor, skin_temperature_sensor
                 FROM raw_samples
                 WHERE account_key = ?1
                   AND timestamp >= ?2
                   AND (?3 IS NULL OR timestamp < ?3)
                 ORDER BY timestamp ASC
                 LIMIT ?4",
            )?;

            let rows = stmt.query_map(params![account, from_ms, to_ms, limit], row_to_sample)?;

            let mut samples = Vec::new();
            for row in rows {
                samples.push(row.context("failed to decode raw sample row")?);
            }
            Ok(samples)
        })
        .await
    }

    /// Number of stored records for `account`.
    pub async fn count_samples(&self, account: &AccountKey) -> Result<u64> {
        let account = account.as_str().to_string();
        self.execute(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM raw_samples WHERE account_key = ?1",
                params![account],
                |row| row.get(0),
            )?;
            Ok(count.max(0) as u64)
        })
        .await
    }
}

#[async_trait]
impl DurableStore for Database {
    async fn upsert(&self, account: &AccountKey, sample: &RawSample) -> Result<()> {
        self.upsert_sample(account, sample).await
    }

    async fn query(
        &self,
        account: &AccountKey,
        range: TimeRange,
        limit: usize,
    ) -> Result<Vec<RawSample>> {
        self.query_samples(account, range, limit).await
    }
}
