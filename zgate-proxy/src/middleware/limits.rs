//! Limiter stage
//!
//! The body cap wraps the request body in a length-limited stream: a
//! declared `Content-Length` over the cap is refused with 413 up front, and
//! a streamed body fails as soon as it crosses the cap. Nothing buffers the
//! whole body to check it.

use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tower_http::limit::RequestBodyLimitLayer;

use crate::config::{BODY_LIMIT, MAX_HEADER_BYTES};

/// Request body cap
pub fn body_limit() -> RequestBodyLimitLayer {
    RequestBodyLimitLayer::new(BODY_LIMIT)
}

/// Size of a header block as it appears on the wire
pub fn header_bytes(req: &Request) -> usize {
    req.headers()
        .iter()
        .map(|(name, value)| name.as_str().len() + value.len() + 4)
        .sum()
}

/// Header ceiling, 431 when exceeded
pub async fn header_limit(req: Request, next: Next) -> Response {
    let size = header_bytes(&req);
    if size > MAX_HEADER_BYTES {
        tracing::warn!(size, limit = MAX_HEADER_BYTES, "middleware: Request headers too large");
        return (
            StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
            "Request headers too large",
        )
            .into_response();
    }
    next.run(req).await
}
