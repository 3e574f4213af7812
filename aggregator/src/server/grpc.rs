//! gRPC service implementation

use crate::service::ClickService;
use crate::storage::StorageError;
use tally_shared::{ClickRecord, StatsRange};
use tonic::{Request, Response, Status};

pub mod proto {
    tonic::include_proto!("tally.clicks.v1");
}

use proto::{
    clicks_server::Clicks,
    ClickStat, QueryStatsRequest, QueryStatsResponse, RecordRequest, RecordResponse,
};

impl From<ClickRecord> for ClickStat {
    fn from(record: ClickRecord) -> Self {
        Self {
            timestamp_ms: record.timestamp_ms(),
            entity_id: record.entity_id,
            count: record.count,
        }
    }
}

fn storage_status(e: StorageError) -> Status {
    match e {
        StorageError::Timeout(_) => Status::deadline_exceeded(e.to_string()),
        _ => Status::internal(e.to_string()),
    }
}

/// gRPC server state
pub struct ClicksService {
    service: ClickService,
}

impl ClicksService {
    pub fn new(service: ClickService) -> Self {
        Self { service }
    }
}

#[tonic::async_trait]
impl Clicks for ClicksService {
    async fn record(
        &self,
        request: Request<RecordRequest>,
    ) -> Result<Response<RecordResponse>, Status> {
        let req = request.into_inner();
        let count = req.count.max(1);
        self.service.record_clicks(req.entity_id, count);
        Ok(Response::new(RecordResponse { ok: true }))
    }

    async fn query_stats(
        &self,
        request: Request<QueryStatsRequest>,
    ) -> Result<Response<QueryStatsResponse>, Status> {
        let req = request.into_inner();
        let range = StatsRange::from_millis(req.from_ms, req.to_ms)
            .map_err(|e| Status::invalid_argument(e.to_string()))?;

        let records = self
            .service
            .query_stats(req.entity_id, range)
            .await
            .map_err(storage_status)?;

        Ok(Response::new(QueryStatsResponse {
            stats: records.into_iter().map(ClickStat::from).collect(),
        }))
    }
}
