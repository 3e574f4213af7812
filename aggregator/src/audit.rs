//! Audit logging for security and data-loss events.
//!
//! All events are emitted via `tracing` with a dedicated target so they can be
//! filtered and formatted (e.g. JSON) for audit pipelines.

use tracing::{debug, info, warn};

const AUDIT_TARGET: &str = "tally::audit";

/// Log a request that passed the bearer-token check.
///
/// Debug level: on the HTTP surface this fires once per recorded click.
pub fn auth_success(surface: &str) {
    debug!(
        target: AUDIT_TARGET,
        event = "auth_success",
        surface = %surface,
        result = "ok",
    );
}

/// Log a request rejected by the bearer-token check.
pub fn auth_failure(surface: &str, reason: &str) {
    warn!(
        target: AUDIT_TARGET,
        event = "auth_failure",
        surface = %surface,
        result = "denied",
        reason = %reason,
    );
}

/// Log admin HTTP request (sensitive endpoints: metrics, readiness).
pub fn admin_http_request(path: &str, status: u16) {
    info!(
        target: AUDIT_TARGET,
        event = "admin_http_request",
        path = %path,
        status = %status,
    );
}

/// Log a batch whose clicks were discarded after a failed merge-write.
pub fn batch_dropped(bucket_ms: i64, records: usize, clicks: u64, reason: &str) {
    warn!(
        target: AUDIT_TARGET,
        event = "batch_dropped",
        bucket_ms = bucket_ms,
        records = records,
        clicks = clicks,
        reason = %reason,
    );
}
