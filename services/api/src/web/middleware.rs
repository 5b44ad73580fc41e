//! services/api/src/web/middleware.rs
//!
//! Request filtering applied in front of every route.

use axum::{
    body::Body,
    extract::Request,
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

/// Path fragments that only ever come from vulnerability scanners.
const SCANNER_PATTERNS: [&str; 4] = [".php", ".env", "wp-login", "wp-admin"];

/// Answers scanner probes before they reach the router.
///
/// Probe paths get an empty 404, and `POST /` (a common health-check and
/// scanner target) gets a plain `OK`. Everything else passes through.
pub async fn scanner_guard(req: Request, next: Next) -> Response {
    let path = req.uri().path().to_ascii_lowercase();

    if SCANNER_PATTERNS.iter().any(|pattern| path.contains(pattern)) {
        debug!(%path, "Blocked scanner request");
        return (StatusCode::NOT_FOUND, Body::empty()).into_response();
    }

    if req.method() == Method::POST && path == "/" {
        return (StatusCode::OK, "OK").into_response();
    }

    next.run(req).await
}
