//! Stats command implementation

use super::ConnectArgs;
use crate::output;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use tally_aggregator::server::grpc::proto::{ClickStat, QueryStatsRequest};
use tally_shared::utils::{parse_duration, time::system_time_millis};
use tally_shared::{ClickRecord, EntityId, StatsRange};

#[derive(Args, Debug)]
pub struct StatsArgs {
    /// Entity to query
    #[arg(long)]
    pub entity: EntityId,

    /// Range start (RFC 3339, e.g. 2024-01-01T10:00:00Z)
    #[arg(long, requires = "to", conflicts_with = "last")]
    pub from: Option<DateTime<Utc>>,

    /// Range end, inclusive (RFC 3339)
    #[arg(long, requires = "from")]
    pub to: Option<DateTime<Utc>>,

    /// Look back this far from now instead (e.g. 15m, 2h)
    #[arg(long, default_value = "1h")]
    pub last: String,

    /// Print the raw JSON array instead of a table
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub connect: ConnectArgs,
}

impl StatsArgs {
    fn range(&self) -> Result<StatsRange> {
        if let (Some(from), Some(to)) = (self.from, self.to) {
            return StatsRange::new(from, to).context("Invalid range");
        }
        let window = parse_duration(&self.last)
            .with_context(|| format!("Invalid --last value '{}'", self.last))?;
        let now = system_time_millis();
        let window_ms = i64::try_from(window.as_millis()).context("--last is too large")?;
        StatsRange::from_millis(now.saturating_sub(window_ms), now).context("Invalid range")
    }
}

fn to_record(stat: ClickStat) -> Result<ClickRecord> {
    let timestamp = DateTime::from_timestamp_millis(stat.timestamp_ms)
        .with_context(|| format!("Aggregator returned bad timestamp {}", stat.timestamp_ms))?;
    Ok(ClickRecord::new(timestamp, stat.entity_id, stat.count))
}

pub async fn run(args: StatsArgs) -> Result<()> {
    let range = args.range()?;
    let mut client = args.connect.connect().await?;

    let response = client
        .query_stats(args.connect.request(QueryStatsRequest {
            entity_id: args.entity,
            from_ms: range.from().timestamp_millis(),
            to_ms: range.to().timestamp_millis(),
        })?)
        .await
        .context("Stats query failed")?;

    let records = response
        .into_inner()
        .stats
        .into_iter()
        .map(to_record)
        .collect::<Result<Vec<_>>>()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        output::info(&format!(
            "No clicks for entity {} between {} and {}",
            args.entity,
            range.from(),
            range.to()
        ));
        return Ok(());
    }

    println!("{}", output::stats_table(&records));
    Ok(())
}
