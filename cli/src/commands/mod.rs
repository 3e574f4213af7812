//! Subcommand implementations

pub mod record;
pub mod stats;

use anyhow::{Context, Result};
use clap::Args;
use tally_aggregator::server::grpc::proto::clicks_client::ClicksClient;
use tonic::metadata::MetadataValue;
use tonic::transport::Channel;

/// Connection options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct ConnectArgs {
    /// Aggregator gRPC endpoint
    #[arg(short, long, default_value = "http://127.0.0.1:50051")]
    pub endpoint: String,

    /// Bearer token, when the aggregator requires one
    #[arg(long, env = "TALLY_AUTH_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

impl ConnectArgs {
    pub async fn connect(&self) -> Result<ClicksClient<Channel>> {
        ClicksClient::<Channel>::connect(self.endpoint.clone())
            .await
            .with_context(|| format!("Failed to connect to aggregator at {}", self.endpoint))
    }

    /// Wrap `message` in a request carrying the bearer token, if any.
    pub fn request<T>(&self, message: T) -> Result<tonic::Request<T>> {
        let mut request = tonic::Request::new(message);
        if let Some(token) = &self.token {
            let value: MetadataValue<_> = format!("Bearer {}", token)
                .parse()
                .context("Auth token is not a valid header value")?;
            request.metadata_mut().insert("authorization", value);
        }
        Ok(request)
    }
}
