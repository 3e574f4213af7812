//! In-memory click counters
//!
//! Every inbound click increments a pending count; the drain cycle swaps the
//! non-zero counts out as a [`Batch`] and resets them. This absorbs bursty
//! traffic so storage sees at most one row per entity per drain.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tally_shared::{ClickRecord, EntityId};

/// Click records produced by a single drain, all sharing one time bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    bucket: DateTime<Utc>,
    records: Vec<ClickRecord>,
}

impl Batch {
    pub fn bucket(&self) -> DateTime<Utc> {
        self.bucket
    }

    pub fn records(&self) -> &[ClickRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<ClickRecord> {
        self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Total clicks represented by the batch.
    pub fn clicks(&self) -> u64 {
        self.records.iter().map(|r| r.count).sum()
    }
}

/// Pending click counts keyed by entity. Thread-safe.
///
/// One mutex guards the map. It is held for a single increment in
/// [`record_n`](Self::record_n) and for the snapshot-and-reset in
/// [`drain`](Self::drain); no I/O ever happens under it.
#[derive(Debug, Default)]
pub struct CounterStore {
    counts: Mutex<HashMap<EntityId, u64>>,
}

impl CounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one click for `entity`.
    pub fn record(&self, entity: EntityId) {
        self.record_n(entity, 1);
    }

    /// Count `delta` clicks for `entity`. Unknown entities start at zero.
    pub fn record_n(&self, entity: EntityId, delta: u64) {
        if delta == 0 {
            return;
        }
        {
            let mut counts = self.lock();
            let pending = counts.entry(entity).or_insert(0);
            *pending = pending.saturating_add(delta);
        }
        crate::metrics::CLICKS_RECORDED.inc_by(delta as f64);
    }

    /// Snapshot every non-zero count into a batch stamped with `bucket`, and
    /// zero those counts, in one critical section.
    ///
    /// Entries are zeroed rather than removed so hot entities keep their slot.
    pub fn drain(&self, bucket: DateTime<Utc>) -> Batch {
        let (records, tracked) = {
            let mut counts = self.lock();
            let mut records = Vec::new();
            for (&entity_id, pending) in counts.iter_mut() {
                if *pending > 0 {
                    records.push(ClickRecord::new(bucket, entity_id, *pending));
                    *pending = 0;
                }
            }
            (records, counts.len())
        };
        crate::metrics::TRACKED_ENTITIES.set(tracked as f64);
        Batch { bucket, records }
    }

    /// Number of entities with clicks waiting for the next drain.
    pub fn pending_entities(&self) -> usize {
        self.lock().values().filter(|&&c| c > 0).count()
    }

    /// Sum of all clicks waiting for the next drain.
    pub fn pending_clicks(&self) -> u64 {
        self.lock().values().sum()
    }

    // A panic elsewhere cannot leave the map half-updated: every mutation is
    // a single assignment, so a poisoned guard is still safe to use.
    fn lock(&self) -> MutexGuard<'_, HashMap<EntityId, u64>> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
