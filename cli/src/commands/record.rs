//! Record command implementation

use super::ConnectArgs;
use crate::output;
use anyhow::{Context, Result};
use clap::Args;
use tally_aggregator::server::grpc::proto::RecordRequest;
use tally_shared::EntityId;

#[derive(Args, Debug)]
pub struct RecordArgs {
    /// Entity that was clicked
    #[arg(long)]
    pub entity: EntityId,

    /// Number of clicks to record
    #[arg(short, long, default_value = "1", value_parser = clap::value_parser!(u64).range(1..))]
    pub count: u64,

    #[command(flatten)]
    pub connect: ConnectArgs,
}

pub async fn run(args: RecordArgs) -> Result<()> {
    let mut client = args.connect.connect().await?;
    tracing::debug!(entity = args.entity, count = args.count, "recording clicks");

    client
        .record(args.connect.request(RecordRequest {
            entity_id: args.entity,
            count: args.count,
        })?)
        .await
        .context("Record failed")?;

    output::success(&format!(
        "Recorded {} click(s) for entity {}",
        args.count, args.entity
    ));
    Ok(())
}
