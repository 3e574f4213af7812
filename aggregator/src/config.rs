//! Aggregator configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional file
//! named by `TALLY_CONFIG`, then `TALLY_*` environment variables. Nested keys
//! use a double underscore, e.g. `TALLY_STORAGE__TYPE=clickhouse`.

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tally_shared::BucketGranularity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Listen address for gRPC server
    pub grpc_addr: String,

    /// Listen address for the HTTP API (click/stats + health checks + metrics)
    pub http_addr: String,

    /// Period between drains of the in-memory counters
    pub drain_interval_ms: u64,

    /// Width of a persisted time bucket
    pub bucket_granularity_ms: u64,

    /// Deadline for one merge-write; expiry drops the batch
    pub flush_timeout_ms: u64,

    /// Deadline for one stats range query
    pub query_timeout_ms: u64,

    /// Optional bearer token required on ingestion and query endpoints
    pub auth_token: Option<String>,

    /// Storage backend configuration
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    ClickHouse {
        endpoint: String,
        database: String,
        password: Option<String>,
    },
    Memory,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            grpc_addr: "0.0.0.0:50051".to_string(),
            http_addr: "0.0.0.0:8080".to_string(),
            drain_interval_ms: crate::drain::DEFAULT_DRAIN_INTERVAL.as_millis() as u64,
            bucket_granularity_ms: 60_000,
            flush_timeout_ms: 5_000,
            query_timeout_ms: 5_000,
            auth_token: None,
            storage: StorageConfig::Memory,
        }
    }
}

impl AggregatorConfig {
    /// Load configuration from defaults, optional file and environment.
    pub fn load() -> Result<Self> {
        let file = std::env::var("TALLY_CONFIG").ok();
        Self::load_from(file.as_deref(), Environment::with_prefix("TALLY"))
    }

    fn load_from(file: Option<&str>, env: Environment) -> Result<Self> {
        let defaults = Config::try_from(&Self::default()).context("Encode default config")?;
        let mut builder = Config::builder().add_source(defaults);
        if let Some(path) = file {
            builder = builder.add_source(File::with_name(path));
        }
        let config: Self = builder
            .add_source(
                env.prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.drain_interval_ms == 0 {
            anyhow::bail!("drain_interval_ms must be greater than 0");
        }
        if self.flush_timeout_ms == 0 || self.query_timeout_ms == 0 {
            anyhow::bail!("flush_timeout_ms and query_timeout_ms must be greater than 0");
        }
        self.bucket_granularity()?;
        if self.bucket_granularity_ms <= self.drain_interval_ms {
            tracing::warn!(
                "Bucket granularity ({}ms) is not coarser than the drain interval ({}ms); \
                 every drain will start a new bucket",
                self.bucket_granularity_ms,
                self.drain_interval_ms
            );
        }
        Ok(())
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn bucket_granularity(&self) -> Result<BucketGranularity> {
        BucketGranularity::new(Duration::from_millis(self.bucket_granularity_ms))
            .context("Invalid bucket_granularity_ms")
    }
}
