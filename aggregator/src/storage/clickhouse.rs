//! ClickHouse storage backend
//!
//! Clicks land in a `SummingMergeTree` keyed by `(entity_id, bucket_ms)`.
//! Every flush is a plain append; the engine folds rows with the same key by
//! summing `count` during background merges, and reads aggregate with
//! `sum(count) ... GROUP BY` so not-yet-merged parts are still added up. The
//! merge therefore happens inside the store and concurrent writers can never
//! overwrite each other's increments.

use super::{ClickStore, StorageError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::DateTime;
use clickhouse::{Client, Row};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tally_shared::{ClickRecord, EntityId, StatsRange};

const TABLE_NAME: &str = "tally_clicks";

const DEFAULT_TABLE_ENGINE: &str = "\
SummingMergeTree(count) \
PARTITION BY toYYYYMM(fromUnixTimestamp64Milli(bucket_ms)) \
ORDER BY (entity_id, bucket_ms) \
SETTINGS index_granularity = 8192";

/// One row in the clicks table (matches ClickHouse schema).
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct ClickRow {
    /// Bucket start, milliseconds since Unix epoch.
    pub bucket_ms: i64,
    pub entity_id: i64,
    pub count: u64,
}

impl From<&ClickRecord> for ClickRow {
    fn from(record: &ClickRecord) -> Self {
        Self {
            bucket_ms: record.timestamp_ms(),
            entity_id: record.entity_id,
            count: record.count,
        }
    }
}

impl TryFrom<ClickRow> for ClickRecord {
    type Error = StorageError;

    fn try_from(row: ClickRow) -> Result<Self, StorageError> {
        let ts = DateTime::from_timestamp_millis(row.bucket_ms).ok_or_else(|| {
            StorageError::Corrupt(format!("bucket_ms {} out of range", row.bucket_ms))
        })?;
        Ok(ClickRecord::new(ts, row.entity_id, row.count))
    }
}

/// ClickHouse-backed click store.
pub struct ClickHouseStore {
    client: Client,
    table: String,
}

impl ClickHouseStore {
    pub async fn new(endpoint: &str, database: &str, password: Option<&str>) -> Result<Self> {
        let mut client = Client::default()
            .with_url(endpoint)
            .with_database(database)
            .with_option("connect_timeout", "10")
            .with_option("receive_timeout", "30");
        if let Some(password) = password {
            client = client.with_user("default").with_password(password);
        }

        let store = Self {
            client,
            table: TABLE_NAME.to_string(),
        };

        store.ensure_table().await?;
        Ok(store)
    }

    async fn ensure_table(&self) -> Result<()> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                bucket_ms Int64,
                entity_id Int64,
                count UInt64
            ) ENGINE = {}",
            self.table, DEFAULT_TABLE_ENGINE
        );
        self.client
            .query(&ddl)
            .execute()
            .await
            .context("Create ClickHouse table")?;
        Ok(())
    }

    /// Append all records in a single insert.
    async fn insert_rows(&self, records: &[ClickRecord]) -> Result<()> {
        let mut insert = self
            .client
            .insert::<ClickRow>(&self.table)
            .context("ClickHouse insert")?;
        for record in records {
            insert
                .write(&ClickRow::from(record))
                .await
                .context("Write click row")?;
        }
        insert.end().await.context("Flush insert")?;
        Ok(())
    }

    async fn fetch_rows(&self, entity: EntityId, range: &StatsRange) -> Result<Vec<ClickRow>> {
        let sql = format!(
            "SELECT bucket_ms, entity_id, sum(count) AS total FROM {} \
             WHERE entity_id = ? AND bucket_ms >= ? AND bucket_ms <= ? \
             GROUP BY entity_id, bucket_ms",
            self.table
        );

        #[derive(Debug, Row, Serialize, Deserialize)]
        struct SummedRow {
            bucket_ms: i64,
            entity_id: i64,
            total: u64,
        }

        let mut cursor = self
            .client
            .query(&sql)
            .bind(entity)
            .bind(range.from().timestamp_millis())
            .bind(range.to().timestamp_millis())
            .fetch::<SummedRow>()
            .context("Query clicks")?;
        let mut out = Vec::new();
        while let Some(row) = cursor.next().await? {
            out.push(ClickRow {
                bucket_ms: row.bucket_ms,
                entity_id: row.entity_id,
                count: row.total,
            });
        }
        Ok(out)
    }
}

#[async_trait]
impl ClickStore for ClickHouseStore {
    async fn upsert_merge(&self, records: &[ClickRecord]) -> Result<(), StorageError> {
        let start = Instant::now();
        self.insert_rows(records)
            .await
            .map_err(|e| StorageError::Backend(format!("{:#}", e)))?;
        tracing::debug!(
            "Inserted {} rows into ClickHouse in {:?}",
            records.len(),
            start.elapsed()
        );
        Ok(())
    }

    async fn range_query(
        &self,
        entity: EntityId,
        range: &StatsRange,
    ) -> Result<Vec<ClickRecord>, StorageError> {
        self.fetch_rows(entity, range)
            .await
            .map_err(|e| StorageError::Backend(format!("{:#}", e)))?
            .into_iter()
            .map(ClickRecord::try_from)
            .collect()
    }

    async fn ping(&self) -> Result<(), StorageError> {
        self.client
            .query("SELECT 1")
            .execute()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))
    }
}
