//! Hands drained batches to the click store.
//!
//! Delivery is at-most-once: a batch that fails to persist (error or timeout)
//! is logged, audited and discarded. Its clicks are not retried here; callers
//! needing stronger guarantees must journal batches before they reach the
//! flusher.

use crate::audit;
use crate::counter::Batch;
use crate::metrics;
use crate::storage::{ClickStore, StorageError};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result of one flush, reported for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    Written {
        records: usize,
        clicks: u64,
    },
    Dropped {
        records: usize,
        clicks: u64,
        reason: String,
    },
}

impl FlushOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, Self::Written { .. })
    }
}

#[derive(Clone)]
pub struct Flusher {
    store: Arc<dyn ClickStore>,
    timeout: Duration,
}

impl Flusher {
    pub fn new(store: Arc<dyn ClickStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Merge-write the whole batch in one store call, then drop it.
    ///
    /// Never returns an error: a failed write must not stop the drain loop.
    pub async fn flush(&self, batch: Batch) -> FlushOutcome {
        let records = batch.len();
        let clicks = batch.clicks();
        let bucket_ms = batch.bucket().timestamp_millis();

        let start = Instant::now();
        let result =
            match tokio::time::timeout(self.timeout, self.store.upsert_merge(batch.records())).await
            {
                Ok(res) => res,
                Err(_) => Err(StorageError::Timeout(self.timeout)),
            };
        metrics::FLUSH_DURATION.observe(start.elapsed().as_secs_f64());

        match result {
            Ok(()) => {
                metrics::FLUSH_TOTAL.with_label_values(&["ok"]).inc();
                metrics::FLUSH_ROWS.inc_by(records as f64);
                tracing::debug!("Flushed {} records ({} clicks)", records, clicks);
                FlushOutcome::Written { records, clicks }
            }
            Err(e) => {
                let status = match &e {
                    StorageError::Timeout(_) => "timeout",
                    _ => "error",
                };
                metrics::FLUSH_TOTAL.with_label_values(&[status]).inc();
                metrics::CLICKS_DROPPED.inc_by(clicks as f64);
                let reason = e.to_string();
                tracing::warn!(
                    "Flush failed, dropping {} records ({} clicks): {}",
                    records,
                    clicks,
                    reason
                );
                audit::batch_dropped(bucket_ms, records, clicks, &reason);
                FlushOutcome::Dropped {
                    records,
                    clicks,
                    reason,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::CounterStore;
    use crate::storage::testing::{BrokenStore, HangingStore};
    use crate::storage::InMemoryClickStore;
    use chrono::{DateTime, TimeZone, Utc};
    use tally_shared::{ClickRecord, EntityId};

    fn bucket() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn batch_of(entries: &[(EntityId, u64)]) -> Batch {
        let counters = CounterStore::new();
        for &(entity, n) in entries {
            counters.record_n(entity, n);
        }
        counters.drain(bucket())
    }

    #[tokio::test]
    async fn test_flush_writes_whole_batch() {
        let store = Arc::new(InMemoryClickStore::new());
        let flusher = Flusher::new(store.clone(), Duration::from_secs(1));

        let outcome = flusher.flush(batch_of(&[(7, 3), (9, 1)])).await;
        assert_eq!(
            outcome,
            FlushOutcome::Written {
                records: 2,
                clicks: 4
            }
        );
        assert_eq!(
            store.snapshot(),
            vec![
                ClickRecord::new(bucket(), 7, 3),
                ClickRecord::new(bucket(), 9, 1),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_flush_is_dropped_once() {
        let store = Arc::new(BrokenStore::default());
        let flusher = Flusher::new(store.clone(), Duration::from_secs(1));

        let outcome = flusher.flush(batch_of(&[(1, 2)])).await;
        match outcome {
            FlushOutcome::Dropped {
                records,
                clicks,
                reason,
            } => {
                assert_eq!(records, 1);
                assert_eq!(clicks, 2);
                assert!(reason.contains("connection refused"));
            }
            other => panic!("expected drop, got {:?}", other),
        }
        // No in-process retry.
        assert_eq!(store.calls(), 1);
    }

    #[tokio::test]
    async fn test_slow_store_times_out() {
        let flusher = Flusher::new(Arc::new(HangingStore), Duration::from_millis(20));
        let outcome = flusher.flush(batch_of(&[(1, 1)])).await;
        match outcome {
            FlushOutcome::Dropped { reason, .. } => assert!(reason.contains("timed out")),
            other => panic!("expected timeout drop, got {:?}", other),
        }
    }
}
