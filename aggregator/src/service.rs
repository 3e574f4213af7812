//! Entry points shared by the HTTP and gRPC surfaces.

use crate::counter::CounterStore;
use crate::metrics;
use crate::storage::{ClickStore, StorageError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tally_shared::{ClickRecord, EntityId, StatsRange};

/// Click ingestion and stats lookup over one counter store and one click store.
#[derive(Clone)]
pub struct ClickService {
    counters: Arc<CounterStore>,
    store: Arc<dyn ClickStore>,
    query_timeout: Duration,
}

impl ClickService {
    pub fn new(
        counters: Arc<CounterStore>,
        store: Arc<dyn ClickStore>,
        query_timeout: Duration,
    ) -> Self {
        Self {
            counters,
            store,
            query_timeout,
        }
    }

    pub fn counters(&self) -> &Arc<CounterStore> {
        &self.counters
    }

    /// Count one click. Never blocks on storage.
    pub fn record_click(&self, entity: EntityId) {
        self.counters.record(entity);
    }

    pub fn record_clicks(&self, entity: EntityId, count: u64) {
        self.counters.record_n(entity, count);
    }

    /// Persisted counts for `entity` within `range`, oldest bucket first.
    ///
    /// Only clicks already flushed by a drain are visible. Failures are
    /// returned to the caller as-is; nothing is retried here.
    pub async fn query_stats(
        &self,
        entity: EntityId,
        range: StatsRange,
    ) -> Result<Vec<ClickRecord>, StorageError> {
        let start = Instant::now();
        let result =
            match tokio::time::timeout(self.query_timeout, self.store.range_query(entity, &range))
                .await
            {
                Ok(res) => res,
                Err(_) => Err(StorageError::Timeout(self.query_timeout)),
            };
        metrics::QUERY_DURATION.observe(start.elapsed().as_secs_f64());

        match result {
            Ok(mut records) => {
                metrics::QUERY_TOTAL.with_label_values(&["ok"]).inc();
                records.sort_by_key(|r| r.timestamp);
                Ok(records)
            }
            Err(e) => {
                metrics::QUERY_TOTAL.with_label_values(&["error"]).inc();
                tracing::warn!("Stats query for entity {} failed: {}", entity, e);
                Err(e)
            }
        }
    }

    /// Whether the click store is reachable.
    pub async fn is_ready(&self) -> bool {
        match tokio::time::timeout(self.query_timeout, self.store.ping()).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::debug!("Readiness ping failed: {}", e);
                false
            }
            Err(_) => false,
        }
    }
}
