//! Shared types and utilities for Tally
//!
//! This crate contains the data structures and helpers used by both the
//! aggregator service and the command-line client.

pub mod types;
pub mod utils;

// Re-export commonly used types
pub use types::{click::*, range::*};
pub use utils::time::BucketGranularity;
