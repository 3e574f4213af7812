//! HTTP server: click API plus health checks and metrics

use crate::audit;
use crate::metrics;
use crate::server::api;
use crate::service::ClickService;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

/// Shared state for every HTTP connection.
pub struct HttpState {
    pub service: ClickService,
    pub auth_token: Option<String>,
}

/// Serve the click API, /healthz, /readyz and /metrics until `shutdown` resolves.
pub async fn serve_http(
    addr: SocketAddr,
    state: Arc<HttpState>,
    shutdown: impl Future<Output = ()>,
) -> Result<(), hyper::Error> {
    let make_svc = make_service_fn(move |_| {
        let state = state.clone();
        async move {
            Ok::<_, hyper::Error>(service_fn(move |req: Request<Body>| {
                let state = state.clone();
                async move { handle(req, &state).await }
            }))
        }
    });

    let server = Server::try_bind(&addr)?.serve(make_svc);
    tracing::info!("HTTP server listening on {}", addr);
    server.with_graceful_shutdown(shutdown).await
}

async fn handle(req: Request<Body>, state: &HttpState) -> Result<Response<Body>, hyper::Error> {
    let path = req.uri().path().to_string();
    if api::handles(&path) {
        return api::handle_api(req, &state.service, state.auth_token.as_deref()).await;
    }

    let (mut response, status) = match path.as_str() {
        "/healthz" => (Response::new(Body::from("ok\n")), StatusCode::OK),

        "/readyz" => {
            if state.service.is_ready().await {
                let counters = state.service.counters();
                let body = format!(
                    "ready\npending_entities {}\npending_clicks {}\n",
                    counters.pending_entities(),
                    counters.pending_clicks()
                );
                (Response::new(Body::from(body)), StatusCode::OK)
            } else {
                (
                    Response::new(Body::from("not ready\n")),
                    StatusCode::SERVICE_UNAVAILABLE,
                )
            }
        }

        "/metrics" => {
            let mut res = Response::new(Body::from(metrics::encode_metrics()));
            res.headers_mut().insert(
                hyper::header::CONTENT_TYPE,
                hyper::header::HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            (res, StatusCode::OK)
        }

        _ => (Response::new(Body::from("not found\n")), StatusCode::NOT_FOUND),
    };

    *response.status_mut() = status;

    if path == "/metrics" || path == "/readyz" {
        audit::admin_http_request(&path, status.as_u16());
    }
    Ok(response)
}
