//! Time range used by stats queries

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("range start {from} is after range end {to}")]
    Inverted {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },

    #[error("timestamp {0} ms is out of range")]
    OutOfRange(i64),
}

/// Inclusive `[from, to]` interval over bucket timestamps.
///
/// Construction validates the bounds, so anything holding a `StatsRange`
/// can assume `from <= to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsRange {
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

impl StatsRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self, RangeError> {
        if from > to {
            return Err(RangeError::Inverted { from, to });
        }
        Ok(Self { from, to })
    }

    /// Build a range from millisecond timestamps (the gRPC representation).
    pub fn from_millis(from_ms: i64, to_ms: i64) -> Result<Self, RangeError> {
        let from =
            DateTime::from_timestamp_millis(from_ms).ok_or(RangeError::OutOfRange(from_ms))?;
        let to = DateTime::from_timestamp_millis(to_ms).ok_or(RangeError::OutOfRange(to_ms))?;
        Self::new(from, to)
    }

    pub fn from(&self) -> DateTime<Utc> {
        self.from
    }

    pub fn to(&self) -> DateTime<Utc> {
        self.to
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.from <= ts && ts <= self.to
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_inverted_range_rejected() {
        let a = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap();
        assert!(StatsRange::new(a, b).is_ok());
        assert_eq!(
            StatsRange::new(b, a).unwrap_err(),
            RangeError::Inverted { from: b, to: a }
        );
    }

    #[test]
    fn test_contains_is_inclusive() {
        let a = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2024, 1, 1, 0, 2, 0).unwrap();
        let range = StatsRange::new(a, b).unwrap();
        assert!(range.contains(a));
        assert!(range.contains(b));
        assert!(!range.contains(b + chrono::Duration::milliseconds(1)));
    }

    #[test]
    fn test_single_point_range() {
        let a = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let range = StatsRange::new(a, a).unwrap();
        assert!(range.contains(a));
    }

    #[test]
    fn test_from_millis() {
        let range = StatsRange::from_millis(0, 60_000).unwrap();
        assert_eq!(range.to().timestamp_millis(), 60_000);
        assert!(StatsRange::from_millis(60_000, 0).is_err());
        assert_eq!(
            StatsRange::from_millis(i64::MIN, 0).unwrap_err(),
            RangeError::OutOfRange(i64::MIN)
        );
    }
}
