//! Management routes
//!
//! Only the session plumbing lives here. Admin UI handlers are mounted by
//! the embedding application through
//! [`Dispatcher::with_management_routes`](crate::dispatch::Dispatcher::with_management_routes).

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::Response;
use axum::Json;
use serde::Serialize;

use crate::context::RequestContext;
use crate::error::ApiError;
use crate::events;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CsrfResponse {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub user_id: String,
    pub username: String,
    pub administrator: bool,
    pub api: bool,
    pub requests: u64,
}

/// Issue a CSRF token for the current session
pub async fn csrf_get(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
) -> Result<Json<CsrfResponse>, ApiError> {
    let session_id = ctx.authorizer.session_id();
    if !ctx.authorizer.is_valid() || session_id.is_empty() {
        return Err(ApiError::unauthorized());
    }

    let token = state
        .csrf
        .new_token(&ctx.db, session_id)
        .await
        .map_err(ApiError::server)?;

    Ok(Json(CsrfResponse { token }))
}

/// Who am I, for an authenticated and authorized caller
pub async fn check_get(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
) -> Result<Json<CheckResponse>, ApiError> {
    let user = ctx.user.as_ref().ok_or_else(ApiError::unauthorized)?;

    Ok(Json(CheckResponse {
        user_id: user.id.clone(),
        username: user.username.clone(),
        administrator: user.administrator,
        api: ctx.authorizer.is_api(),
        requests: state.node.requests(),
    }))
}

/// Node event stream
pub async fn events_get(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    let receiver = state.events.subscribe();
    ws.on_upgrade(move |socket| events::stream(socket, receiver))
}
