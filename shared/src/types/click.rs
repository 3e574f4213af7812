//! Click data structures
//!
//! A `ClickRecord` is the persisted aggregate: the number of clicks an entity
//! received within one time bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of the thing being clicked (a banner, an ad, a link).
pub type EntityId = i64;

/// Aggregated clicks for one `(timestamp, entity_id)` bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClickRecord {
    /// Start of the time bucket (already truncated)
    pub timestamp: DateTime<Utc>,

    /// Entity the clicks belong to
    #[serde(rename = "entityID")]
    pub entity_id: EntityId,

    /// Number of clicks in the bucket
    pub count: u64,
}

impl ClickRecord {
    pub fn new(timestamp: DateTime<Utc>, entity_id: EntityId, count: u64) -> Self {
        Self {
            timestamp,
            entity_id,
            count,
        }
    }

    /// Bucket start in milliseconds since the Unix epoch.
    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}
