//! Plain HTTP to HTTPS redirect listener

use axum::extract::Request;
use axum::http::{header, StatusCode};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use std::time::Duration;

use axum::Router;
use tower_http::timeout::TimeoutLayer;

use crate::middleware::{limits, recovery};
use crate::node::request_host;

/// 301 to the same host and path over https
pub async fn redirect_https(req: Request) -> Response {
    let Some(host) = request_host(&req) else {
        return (StatusCode::BAD_REQUEST, "Missing host").into_response();
    };
    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let location = format!("https://{}{}", host, path);
    (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response()
}

pub fn create_redirect_router(timeout: Duration) -> Router {
    Router::new()
        .fallback(redirect_https)
        .layer(TimeoutLayer::new(timeout))
        .layer(middleware::from_fn(limits::header_limit))
        .layer(recovery::layer())
}
