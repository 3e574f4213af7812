//! Tally aggregator service
//!
//! Counts clicks in memory, drains them every few hundred milliseconds into
//! per-minute buckets and merge-writes them to storage (in-memory by default,
//! ClickHouse with the `clickhouse-storage` feature). Serves the click/stats
//! API over HTTP and gRPC.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tally_aggregator::{
    config::{AggregatorConfig, StorageConfig},
    counter::CounterStore,
    drain::DrainCycle,
    flush::Flusher,
    server::{auth, grpc, http},
    service::ClickService,
    storage::{ClickStore, InMemoryClickStore},
};
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn build_store(config: &StorageConfig) -> Result<Arc<dyn ClickStore>> {
    match config {
        StorageConfig::Memory => {
            info!("Using in-memory click storage (not persisted across restarts)");
            Ok(Arc::new(InMemoryClickStore::new()))
        }
        #[cfg(feature = "clickhouse-storage")]
        StorageConfig::ClickHouse {
            endpoint,
            database,
            password,
        } => {
            let store = tally_aggregator::storage::clickhouse::ClickHouseStore::new(
                endpoint,
                database,
                password.as_deref(),
            )
            .await
            .context("ClickHouse connection failed")?;
            info!("ClickHouse storage enabled: {} / {}", endpoint, database);
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "clickhouse-storage"))]
        StorageConfig::ClickHouse { .. } => {
            anyhow::bail!("ClickHouse storage requested but built without `clickhouse-storage`")
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AggregatorConfig::load()?;
    info!(
        "Starting Tally aggregator (gRPC {}, HTTP {})",
        config.grpc_addr, config.http_addr
    );

    let grpc_addr: SocketAddr = config.grpc_addr.parse().context("Invalid gRPC address")?;
    let http_addr: SocketAddr = config.http_addr.parse().context("Invalid HTTP address")?;

    let store = build_store(&config.storage).await?;
    let counters = Arc::new(CounterStore::new());
    let cancel = CancellationToken::new();

    let drain_handle = DrainCycle::new(
        counters.clone(),
        Flusher::new(store.clone(), config.flush_timeout()),
        config.bucket_granularity()?,
        config.drain_interval(),
    )
    .spawn(cancel.clone());

    let service = ClickService::new(counters, store.clone(), config.query_timeout());

    let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<grpc::proto::clicks_server::ClicksServer<grpc::ClicksService>>()
        .await;

    let grpc_service = grpc::proto::clicks_server::ClicksServer::with_interceptor(
        grpc::ClicksService::new(service.clone()),
        auth::make_auth_interceptor(config.auth_token.clone()),
    );
    let grpc_task = {
        let cancel = cancel.clone();
        let shutdown = cancel.clone();
        async move {
            let res = Server::builder()
                .add_service(health_service)
                .add_service(grpc_service)
                .serve_with_shutdown(grpc_addr, async move { shutdown.cancelled().await })
                .await;
            // Either server stopping takes the other one down with it.
            cancel.cancel();
            res
        }
    };

    let http_state = Arc::new(http::HttpState {
        service,
        auth_token: config.auth_token.clone(),
    });
    let http_task = {
        let cancel = cancel.clone();
        let shutdown = cancel.clone();
        async move {
            let res =
                http::serve_http(http_addr, http_state, async move { shutdown.cancelled().await })
                    .await;
            cancel.cancel();
            res
        }
    };

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutdown signal received");
        signal_cancel.cancel();
    });

    let (grpc_result, http_result) = tokio::join!(grpc_task, http_task);

    if let Err(e) = drain_handle.await {
        warn!("Drain task ended abnormally: {}", e);
    }
    if let Err(e) = store.shutdown().await {
        warn!("Storage shutdown failed: {}", e);
    }

    grpc_result.context("gRPC server error")?;
    http_result.context("HTTP server error")?;
    info!("Tally aggregator stopped");
    Ok(())
}
