//! HTTP click API.
//! Serves /counter/{id} (record a click) and /stats/{id} (range query) with JSON.

use crate::server::auth;
use crate::service::ClickService;
use crate::storage::StorageError;
use chrono::{DateTime, Utc};
use hyper::{body::to_bytes, header, Body, Request, Response, StatusCode};
use tally_shared::{EntityId, StatsRange};

const COUNTER_PREFIX: &str = "/counter/";
const STATS_PREFIX: &str = "/stats/";

fn json_response(body: String, status: StatusCode) -> Response<Body> {
    let mut res = Response::new(Body::from(body));
    *res.status_mut() = status;
    res.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    add_cors_headers(res)
}

fn error_response(message: &str, status: StatusCode) -> Response<Body> {
    json_response(serde_json::json!({ "error": message }).to_string(), status)
}

fn add_cors_headers(mut res: Response<Body>) -> Response<Body> {
    res.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        header::HeaderValue::from_static("*"),
    );
    res
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsRequest {
    ts_from: DateTime<Utc>,
    ts_to: DateTime<Utc>,
}

fn parse_entity_id(rest: &str) -> Option<EntityId> {
    rest.trim_end_matches('/').parse().ok()
}

/// Whether `path` belongs to this API.
pub fn handles(path: &str) -> bool {
    path.starts_with(COUNTER_PREFIX) || path.starts_with(STATS_PREFIX)
}

pub async fn handle_api(
    req: Request<Body>,
    service: &ClickService,
    auth_token: Option<&str>,
) -> Result<Response<Body>, hyper::Error> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .map(|v| v.to_str().map_err(|_| ()));
    if let Err(e) = auth::check_bearer("http", auth_token, auth_header) {
        return Ok(error_response(&e.to_string(), StatusCode::UNAUTHORIZED));
    }

    let path = req.uri().path().to_string();

    if let Some(rest) = path.strip_prefix(COUNTER_PREFIX) {
        let Some(entity) = parse_entity_id(rest) else {
            return Ok(error_response("invalid entity id", StatusCode::BAD_REQUEST));
        };
        service.record_click(entity);
        return Ok(add_cors_headers(Response::new(Body::empty())));
    }

    if let Some(rest) = path.strip_prefix(STATS_PREFIX) {
        let Some(entity) = parse_entity_id(rest) else {
            return Ok(error_response("invalid entity id", StatusCode::BAD_REQUEST));
        };
        let body_bytes = to_bytes(req.into_body()).await?;
        let stats_req: StatsRequest = match serde_json::from_slice(&body_bytes) {
            Ok(r) => r,
            Err(e) => {
                return Ok(error_response(
                    &format!("invalid request body: {}", e),
                    StatusCode::BAD_REQUEST,
                ));
            }
        };
        let range = match StatsRange::new(stats_req.ts_from, stats_req.ts_to) {
            Ok(r) => r,
            Err(e) => return Ok(error_response(&e.to_string(), StatusCode::BAD_REQUEST)),
        };

        return Ok(match service.query_stats(entity, range).await {
            Ok(records) => match serde_json::to_string(&records) {
                Ok(body) => json_response(body, StatusCode::OK),
                Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR),
            },
            Err(e @ StorageError::Timeout(_)) => {
                error_response(&e.to_string(), StatusCode::GATEWAY_TIMEOUT)
            }
            Err(_) => error_response(
                "failed to fetch stats",
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        });
    }

    Ok(error_response("not found", StatusCode::NOT_FOUND))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::capture::AuditCapture;
    use crate::counter::CounterStore;
    use crate::storage::testing::{BrokenStore, HangingStore};
    use crate::storage::{ClickStore, InMemoryClickStore};
    use chrono::TimeZone;
    use std::sync::Arc;
    use std::time::Duration;
    use tally_shared::ClickRecord;
    use tracing::Level;

    const ONE_MINUTE_RANGE: &str = r#"{"tsFrom":"2024-01-01T10:00:00Z","tsTo":"2024-01-01T10:01:00Z"}"#;

    fn service_over(store: Arc<dyn ClickStore>, query_timeout: Duration) -> ClickService {
        ClickService::new(Arc::new(CounterStore::new()), store, query_timeout)
    }

    fn service() -> (ClickService, Arc<InMemoryClickStore>) {
        let store = Arc::new(InMemoryClickStore::new());
        let service = ClickService::new(
            Arc::new(CounterStore::new()),
            store.clone(),
            Duration::from_secs(1),
        );
        (service, store)
    }

    fn request(method: &str, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(res: Response<Body>) -> serde_json::Value {
        let bytes = to_bytes(res.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_counter_records_click() {
        let (service, _) = service();
        let res = handle_api(request("GET", "/counter/7", ""), &service, None)
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(service.counters().pending_clicks(), 1);
    }

    #[tokio::test]
    async fn test_counter_rejects_bad_id() {
        let (service, _) = service();
        let res = handle_api(request("POST", "/counter/abc", ""), &service, None)
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(service.counters().pending_clicks(), 0);
    }

    #[tokio::test]
    async fn test_stats_returns_records() {
        let (service, store) = service();
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        store
            .upsert_merge(&[ClickRecord::new(t, 7, 3)])
            .await
            .unwrap();

        let body = r#"{"tsFrom":"2024-01-01T10:00:00Z","tsTo":"2024-01-01T10:00:00Z"}"#;
        let res = handle_api(request("POST", "/stats/7", body), &service, None)
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            body_json(res).await,
            serde_json::json!([
                { "timestamp": "2024-01-01T10:00:00Z", "entityID": 7, "count": 3 }
            ])
        );
    }

    #[tokio::test]
    async fn test_stats_rejects_bad_body_and_range() {
        let (service, _) = service();
        let res = handle_api(request("POST", "/stats/7", "not json"), &service, None)
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let body = r#"{"tsFrom":"2024-01-02T00:00:00Z","tsTo":"2024-01-01T00:00:00Z"}"#;
        let res = handle_api(request("POST", "/stats/7", body), &service, None)
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_token_required_when_configured() {
        let (service, _) = service();
        let res = handle_api(request("GET", "/counter/1", ""), &service, Some("tok"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let req = Request::builder()
            .uri("/counter/1")
            .header("authorization", "Bearer tok")
            .body(Body::empty())
            .unwrap();
        let res = handle_api(req, &service, Some("tok")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_clicks_without_auth_write_no_audit_events() {
        let (capture, _guard) = AuditCapture::install();
        let (service, _) = service();
        for _ in 0..1000 {
            let res = handle_api(request("GET", "/counter/7", ""), &service, None)
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::OK);
        }
        assert_eq!(service.counters().pending_clicks(), 1000);
        assert!(capture.events().is_empty());
    }

    #[tokio::test]
    async fn test_authorized_clicks_audit_at_debug() {
        let (capture, _guard) = AuditCapture::install();
        let (service, _) = service();
        let req = Request::builder()
            .uri("/counter/7")
            .header("authorization", "Bearer tok")
            .body(Body::empty())
            .unwrap();
        handle_api(req, &service, Some("tok")).await.unwrap();

        let events = capture.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, Level::DEBUG);
        assert_eq!(events[0].field("event"), Some("auth_success"));
    }

    #[tokio::test]
    async fn test_stats_storage_failure_is_500() {
        let service = service_over(Arc::new(BrokenStore::default()), Duration::from_secs(1));
        let res = handle_api(request("POST", "/stats/7", ONE_MINUTE_RANGE), &service, None)
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(res).await,
            serde_json::json!({ "error": "failed to fetch stats" })
        );
    }

    #[tokio::test]
    async fn test_stats_timeout_is_504() {
        let service = service_over(Arc::new(HangingStore), Duration::from_millis(20));
        let res = handle_api(request("POST", "/stats/7", ONE_MINUTE_RANGE), &service, None)
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
