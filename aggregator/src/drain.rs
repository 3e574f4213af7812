//! Periodic drain of the counter store.
//!
//! Each tick snapshots and resets the pending counts, stamps them with the
//! current time bucket and hands the batch to the [`Flusher`]. The storage
//! write happens after the counter lock is released, so a slow database never
//! stalls ingestion. Ticks run sequentially in one task; there is never more
//! than one batch in flight.

use crate::counter::CounterStore;
use crate::flush::{FlushOutcome, Flusher};
use crate::metrics;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tally_shared::BucketGranularity;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Default period between drains.
pub const DEFAULT_DRAIN_INTERVAL: Duration = Duration::from_millis(500);

pub struct DrainCycle {
    counters: Arc<CounterStore>,
    flusher: Flusher,
    granularity: BucketGranularity,
    interval: Duration,
}

impl DrainCycle {
    pub fn new(
        counters: Arc<CounterStore>,
        flusher: Flusher,
        granularity: BucketGranularity,
        interval: Duration,
    ) -> Self {
        Self {
            counters,
            flusher,
            granularity,
            interval,
        }
    }

    /// Drain using the current wall-clock time for the bucket.
    ///
    /// Clicks are bucketed by when they are drained, not when they arrived;
    /// the per-click arrival time is not kept by the counters.
    pub async fn run_once(&self) -> Option<FlushOutcome> {
        self.run_once_at(Utc::now()).await
    }

    /// Drain into the bucket containing `now`. Returns `None` when nothing
    /// was pending, in which case the store is not called.
    pub async fn run_once_at(&self, now: DateTime<Utc>) -> Option<FlushOutcome> {
        let batch = self.counters.drain(self.granularity.truncate(now));
        if batch.is_empty() {
            metrics::DRAIN_TICKS.with_label_values(&["empty"]).inc();
            return None;
        }
        metrics::DRAIN_TICKS.with_label_values(&["non_empty"]).inc();
        Some(self.flusher.flush(batch).await)
    }

    /// Run the drain loop until `cancel` fires.
    ///
    /// Cancellation is observed between ticks. One last drain runs on the way
    /// out so counts recorded before shutdown still reach the store.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            tracing::info!(
                "Drain cycle started (interval {:?}, bucket {:?})",
                self.interval,
                self.granularity.as_duration()
            );

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        if let Some(outcome) = self.run_once().await {
                            tracing::info!("Shutdown drain: {:?}", outcome);
                        }
                        break;
                    }
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                }
            }

            tracing::info!("Drain cycle stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ClickStore, InMemoryClickStore};
    use chrono::TimeZone;
    use tally_shared::{ClickRecord, StatsRange};

    fn cycle(counters: Arc<CounterStore>, store: Arc<InMemoryClickStore>) -> DrainCycle {
        DrainCycle::new(
            counters,
            Flusher::new(store, Duration::from_secs(1)),
            BucketGranularity::MINUTE,
            Duration::from_millis(10),
        )
    }

    #[tokio::test]
    async fn test_bucket_is_truncated_drain_time() {
        let counters = Arc::new(CounterStore::new());
        let store = Arc::new(InMemoryClickStore::new());
        let cycle = cycle(counters.clone(), store.clone());

        counters.record(7);
        let now = Utc.with_ymd_and_hms(2024, 2, 2, 9, 15, 42).unwrap();
        let outcome = cycle.run_once_at(now).await.unwrap();
        assert!(outcome.is_written());

        let bucket = Utc.with_ymd_and_hms(2024, 2, 2, 9, 15, 0).unwrap();
        assert_eq!(store.snapshot(), vec![ClickRecord::new(bucket, 7, 1)]);
    }

    #[tokio::test]
    async fn test_empty_tick_skips_store() {
        let counters = Arc::new(CounterStore::new());
        let store = Arc::new(InMemoryClickStore::new());
        let cycle = cycle(counters, store.clone());

        assert!(cycle.run_once().await.is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_drains_in_same_bucket_merge() {
        let counters = Arc::new(CounterStore::new());
        let store = Arc::new(InMemoryClickStore::new());
        let cycle = cycle(counters.clone(), store.clone());
        let t = Utc.with_ymd_and_hms(2024, 2, 2, 9, 15, 0).unwrap();

        counters.record_n(3, 2);
        cycle.run_once_at(t + chrono::Duration::seconds(1)).await;
        counters.record_n(3, 5);
        cycle.run_once_at(t + chrono::Duration::seconds(30)).await;

        let range = StatsRange::new(t, t).unwrap();
        let rows = store.range_query(3, &range).await.unwrap();
        assert_eq!(rows, vec![ClickRecord::new(t, 3, 7)]);
    }

    #[tokio::test]
    async fn test_spawned_loop_flushes_and_stops() {
        let counters = Arc::new(CounterStore::new());
        let store = Arc::new(InMemoryClickStore::new());
        let cancel = CancellationToken::new();
        let handle = cycle(counters.clone(), store.clone()).spawn(cancel.clone());

        counters.record_n(1, 4);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while store.is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(store.snapshot().iter().map(|r| r.count).sum::<u64>(), 4);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_drains_pending_counts() {
        let counters = Arc::new(CounterStore::new());
        let store = Arc::new(InMemoryClickStore::new());
        let cancel = CancellationToken::new();
        let cycle = DrainCycle::new(
            counters.clone(),
            Flusher::new(store.clone(), Duration::from_secs(1)),
            BucketGranularity::MINUTE,
            // Long enough that no regular tick fires during the test.
            Duration::from_secs(3600),
        );
        let handle = cycle.spawn(cancel.clone());

        counters.record_n(2, 6);
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(store.snapshot().iter().map(|r| r.count).sum::<u64>(), 6);
        assert_eq!(counters.pending_clicks(), 0);
    }
}
