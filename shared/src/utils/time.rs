//! Time-related utilities

use chrono::{DateTime, Utc};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Get the current system time in milliseconds since UNIX epoch
pub fn system_time_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("bucket granularity must be at least 1ms, got {0:?}")]
pub struct InvalidGranularity(pub Duration);

/// Width of a persisted time bucket.
///
/// Timestamps are floored to a multiple of the granularity counted from the
/// Unix epoch, so every process agrees on bucket boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketGranularity {
    millis: i64,
}

impl BucketGranularity {
    pub const MINUTE: Self = Self { millis: 60_000 };

    pub fn new(width: Duration) -> Result<Self, InvalidGranularity> {
        let millis = i64::try_from(width.as_millis()).map_err(|_| InvalidGranularity(width))?;
        if millis == 0 {
            return Err(InvalidGranularity(width));
        }
        Ok(Self { millis })
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.millis as u64)
    }

    /// Floor `ts` to the start of its bucket.
    pub fn truncate(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let ms = ts.timestamp_millis();
        let floored = ms - ms.rem_euclid(self.millis);
        // `floored <= ms` and is a whole multiple, so it stays representable.
        DateTime::from_timestamp_millis(floored).unwrap_or(ts)
    }
}

impl Default for BucketGranularity {
    fn default() -> Self {
        Self::MINUTE
    }
}
