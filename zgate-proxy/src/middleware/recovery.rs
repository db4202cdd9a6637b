//! Recovery stage

use std::any::Any;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tower_http::catch_panic::CatchPanicLayer;

use crate::error::status_body;

pub type PanicHandler = fn(Box<dyn Any + Send + 'static>) -> Response;

/// Convert a caught panic into a bare 500
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };

    tracing::error!(panic = %detail, "middleware: Handler panic");

    let status = StatusCode::INTERNAL_SERVER_ERROR;
    (status, status_body(status)).into_response()
}

/// Outermost layer of every listener
pub fn layer() -> CatchPanicLayer<PanicHandler> {
    CatchPanicLayer::custom(panic_response as PanicHandler)
}
