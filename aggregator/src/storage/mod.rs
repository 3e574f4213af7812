//! Persistence backends for aggregated clicks

#[cfg(feature = "clickhouse-storage")]
pub mod clickhouse;
pub mod memory;

use async_trait::async_trait;
use std::time::Duration;
use tally_shared::{ClickRecord, EntityId, StatsRange};
use thiserror::Error;

pub use memory::InMemoryClickStore;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("storage call timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid stored row: {0}")]
    Corrupt(String),
}

/// Durable store of per-bucket click counts.
///
/// Writes are merge-upserts: for every record, an existing row with the same
/// `(timestamp, entity_id)` has `count` added to it, otherwise the row is
/// created. Implementations must express the merge as one store-side
/// primitive so concurrent writers never under-count.
#[async_trait]
pub trait ClickStore: Send + Sync {
    /// Merge a whole batch of records in one call.
    async fn upsert_merge(&self, records: &[ClickRecord]) -> Result<(), StorageError>;

    /// All records for `entity` whose bucket falls inside `range` (inclusive).
    /// Order is unspecified; empty when nothing matches.
    async fn range_query(
        &self,
        entity: EntityId,
        range: &StatsRange,
    ) -> Result<Vec<ClickRecord>, StorageError>;

    /// Cheap reachability check for readiness probes. Default: always reachable.
    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }

    /// Release backend resources. Called once after the final drain.
    async fn shutdown(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Store doubles for exercising failure paths.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts calls and fails every one of them.
    #[derive(Default)]
    pub(crate) struct BrokenStore {
        calls: AtomicUsize,
    }

    impl BrokenStore {
        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ClickStore for BrokenStore {
        async fn upsert_merge(&self, _records: &[ClickRecord]) -> Result<(), StorageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::Backend("connection refused".into()))
        }

        async fn range_query(
            &self,
            _entity: EntityId,
            _range: &StatsRange,
        ) -> Result<Vec<ClickRecord>, StorageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::Backend("connection refused".into()))
        }
    }

    /// Never completes a write or a read.
    pub(crate) struct HangingStore;

    #[async_trait]
    impl ClickStore for HangingStore {
        async fn upsert_merge(&self, _records: &[ClickRecord]) -> Result<(), StorageError> {
            std::future::pending::<()>().await;
            Ok(())
        }

        async fn range_query(
            &self,
            _entity: EntityId,
            _range: &StatsRange,
        ) -> Result<Vec<ClickRecord>, StorageError> {
            std::future::pending::<()>().await;
            Ok(vec![])
        }
    }
}
