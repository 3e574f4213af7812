//! Click aggregation service library
//!
//! Clicks are counted in memory ([`counter`]), drained on a timer
//! ([`drain`]) and merge-written to a [`storage::ClickStore`] by the
//! [`flush`] stage. [`service`] and [`server`] expose ingestion and stats
//! queries over HTTP and gRPC.

pub mod audit;
pub mod config;
pub mod counter;
pub mod drain;
pub mod flush;
pub mod metrics;
pub mod server;
pub mod service;
pub mod storage;
