//! HTTP error responses
//!
//! Handlers and gate stages return [`ApiError`]. Bodies are fixed strings;
//! internal error text only reaches the log, through the [`HandlerError`]
//! extension the gate chain inspects on the way out.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use zgate_core::{ErrorData, GateError};

/// A fault reported by a handler, attached to its response for logging
#[derive(Debug, Clone)]
pub struct HandlerError(pub Arc<GateError>);

/// Request-terminating error
#[derive(Debug)]
pub enum ApiError {
    /// Bare status abort
    Status(StatusCode),
    /// Structured credential or policy denial, 401 JSON
    Denied(ErrorData),
    /// Internal fault with a status and the underlying error
    Fault { status: StatusCode, error: GateError },
}

impl ApiError {
    pub fn unauthorized() -> Self {
        ApiError::Status(StatusCode::UNAUTHORIZED)
    }

    pub fn not_found() -> Self {
        ApiError::Status(StatusCode::NOT_FOUND)
    }

    pub fn fault(status: StatusCode, error: GateError) -> Self {
        ApiError::Fault { status, error }
    }

    /// 500 carrying `error`
    pub fn server(error: GateError) -> Self {
        Self::fault(StatusCode::INTERNAL_SERVER_ERROR, error)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Status(status) => *status,
            ApiError::Denied(_) => StatusCode::UNAUTHORIZED,
            ApiError::Fault { status, .. } => *status,
        }
    }
}

impl From<GateError> for ApiError {
    fn from(error: GateError) -> Self {
        let status = StatusCode::from_u16(error.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        ApiError::Fault { status, error }
    }
}

/// Fixed body text for a status
pub fn status_body(status: StatusCode) -> &'static str {
    match status {
        StatusCode::UNAUTHORIZED => "Unauthorized",
        StatusCode::NOT_FOUND => "Not found",
        StatusCode::INTERNAL_SERVER_ERROR => "Server error",
        other => other.canonical_reason().unwrap_or("Error"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Status(status) => (status, status_body(status)).into_response(),
            ApiError::Denied(data) => (StatusCode::UNAUTHORIZED, Json(data)).into_response(),
            ApiError::Fault { status, error } => {
                let mut response = (status, status_body(status)).into_response();
                response
                    .extensions_mut()
                    .insert(HandlerError(Arc::new(error)));
                response
            }
        }
    }
}
