//! Prometheus metrics for the aggregator service

use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram,
    Counter, CounterVec, Encoder, Gauge, Histogram, TextEncoder,
};

// ── Ingestion metrics ────────────────────────────────────────────────────────

pub static CLICKS_RECORDED: Lazy<Counter> = Lazy::new(|| {
    register_counter!("tally_clicks_recorded_total", "Clicks accepted by the counter store")
        .unwrap()
});

pub static TRACKED_ENTITIES: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "tally_tracked_entities",
        "Entities held by the counter store, zeroed entries included"
    )
    .unwrap()
});

// ── Drain / flush metrics ────────────────────────────────────────────────────

pub static DRAIN_TICKS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tally_drain_ticks_total",
        "Drain cycle ticks, split by whether a batch was produced",
        &["batch"]
    )
    .unwrap()
});

pub static FLUSH_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!("tally_flush_total", "Merge-write attempts", &["status"]).unwrap()
});

pub static FLUSH_ROWS: Lazy<Counter> = Lazy::new(|| {
    register_counter!("tally_flush_rows_total", "Click records merge-written").unwrap()
});

pub static CLICKS_DROPPED: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "tally_clicks_dropped_total",
        "Clicks lost because their batch failed to persist"
    )
    .unwrap()
});

pub static FLUSH_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "tally_flush_duration_seconds",
        "Merge-write latency",
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .unwrap()
});

// ── Query metrics ────────────────────────────────────────────────────────────

pub static QUERY_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!("tally_query_total", "Stats range queries", &["status"]).unwrap()
});

pub static QUERY_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "tally_query_duration_seconds",
        "Stats range query latency",
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .unwrap()
});

/// Render all registered metrics to Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        tracing::warn!("Metrics encoding failed: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}
