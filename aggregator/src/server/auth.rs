//! Bearer token authentication for the HTTP and gRPC surfaces

use crate::audit;
use thiserror::Error;
use tonic::{Request, Status};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Missing authorization header")]
    MissingHeader,
    #[error("Invalid authorization header encoding")]
    InvalidEncoding,
    #[error("Missing Bearer prefix")]
    MissingBearerPrefix,
    #[error("Invalid token")]
    InvalidToken,
}

/// Check an `authorization` header value against the expected token.
///
/// `header` is `None` when the header is absent and `Some(Err(()))` when it is
/// not valid visible ASCII. If `expected` is `None`, authentication is
/// disabled and every request passes without an audit event. Otherwise the
/// outcome is written to the audit log under `surface`.
pub fn check_bearer(
    surface: &str,
    expected: Option<&str>,
    header: Option<Result<&str, ()>>,
) -> Result<(), AuthError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let result = match header {
        None => Err(AuthError::MissingHeader),
        Some(Err(())) => Err(AuthError::InvalidEncoding),
        Some(Ok(value)) => match value.strip_prefix("Bearer ") {
            None => Err(AuthError::MissingBearerPrefix),
            Some(token) if token == expected => Ok(()),
            Some(_) => Err(AuthError::InvalidToken),
        },
    };
    match &result {
        Ok(()) => audit::auth_success(surface),
        Err(e) => audit::auth_failure(surface, &e.to_string()),
    }
    result
}

/// Create a tonic interceptor that validates bearer tokens.
pub fn make_auth_interceptor(
    expected_token: Option<String>,
) -> impl Fn(Request<()>) -> Result<Request<()>, Status> + Clone {
    move |req: Request<()>| {
        let header = req
            .metadata()
            .get("authorization")
            .map(|v| v.to_str().map_err(|_| ()));
        check_bearer("grpc", expected_token.as_deref(), header)
            .map_err(|e| Status::unauthenticated(e.to_string()))?;
        Ok(req)
    }
}
