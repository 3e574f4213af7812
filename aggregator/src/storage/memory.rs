//! In-process click store
//!
//! Used when no external database is configured, and as the reference
//! implementation of the merge-upsert contract in tests.

use super::{ClickStore, StorageError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tally_shared::{ClickRecord, EntityId, StatsRange};

/// Rows keyed by `(entity_id, bucket)` so a range query is one ordered scan.
#[derive(Debug, Default)]
pub struct InMemoryClickStore {
    rows: Mutex<BTreeMap<(EntityId, DateTime<Utc>), u64>>,
}

impl InMemoryClickStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct `(bucket, entity)` rows.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every stored row, ordered by entity then bucket.
    pub fn snapshot(&self) -> Vec<ClickRecord> {
        self.lock()
            .iter()
            .map(|(&(entity_id, ts), &count)| ClickRecord::new(ts, entity_id, count))
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<(EntityId, DateTime<Utc>), u64>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ClickStore for InMemoryClickStore {
    async fn upsert_merge(&self, records: &[ClickRecord]) -> Result<(), StorageError> {
        // The whole batch merges under one lock: atomic per key and per batch.
        let mut rows = self.lock();
        for record in records {
            let count = rows.entry((record.entity_id, record.timestamp)).or_insert(0);
            *count = count.saturating_add(record.count);
        }
        Ok(())
    }

    async fn range_query(
        &self,
        entity: EntityId,
        range: &StatsRange,
    ) -> Result<Vec<ClickRecord>, StorageError> {
        let rows = self.lock();
        Ok(rows
            .range((entity, range.from())..=(entity, range.to()))
            .map(|(&(entity_id, ts), &count)| ClickRecord::new(ts, entity_id, count))
            .collect())
    }
}
