//! HTTP route handlers
//!
//! Two sub-routers:
//!
//! - **management**: `/auth/state`, `/csrf`, `/logout` behind the Session
//!   stage; `/check`, `/events` and any embedder routes behind Session,
//!   Auth and CsrfToken.
//! - **proxy**: the public login surface served for a host when the
//!   request carries no usable session. SessionProxy resolves the
//!   identity for the bound service.

pub mod auth;
pub mod management;
pub mod public;

use std::sync::Arc;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use zgate_core::GateError;

use crate::error::ApiError;
use crate::middleware::{GateChain, Stage};
use crate::state::AppState;

/// 302 to `location`
pub fn found(location: &str) -> Response {
    match HeaderValue::try_from(location) {
        Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
        Err(_) => ApiError::server(GateError::internal("redirect location is not a valid header")).into_response(),
    }
}

fn with_request_log(router: Router, state: &AppState) -> Router {
    if state.config.production {
        router
    } else {
        router.layer(TraceLayer::new_for_http())
    }
}

/// Create the management sub-router, merging `extra` into the protected
/// group
pub fn create_management_router(state: Arc<AppState>, extra: Router<Arc<AppState>>) -> Router {
    let open = GateChain::new(Arc::clone(&state), &[Stage::Session]).apply(
        Router::new()
            .route("/auth/state", get(auth::auth_state_get))
            .route("/csrf", get(management::csrf_get))
            .route("/logout", get(auth::logout_get)),
    );

    let protected = GateChain::new(
        Arc::clone(&state),
        &[Stage::Session, Stage::Auth, Stage::CsrfToken],
    )
    .apply(
        Router::new()
            .route("/check", get(management::check_get))
            .route("/events", get(management::events_get))
            .merge(extra),
    );

    let router = Router::new()
        .route("/robots.txt", get(public::robots_get))
        .merge(open)
        .merge(protected)
        .fallback(public::not_found)
        .with_state(Arc::clone(&state));

    with_request_log(router, &state)
}

/// Create the public proxy sub-router
pub fn create_proxy_router(state: Arc<AppState>) -> Router {
    let gated = GateChain::new(Arc::clone(&state), &[Stage::SessionProxy]).apply(
        Router::new()
            .route("/auth/state", get(auth::auth_state_get))
            .route("/auth/session", post(auth::auth_session_post))
            .route("/auth/request", get(auth::auth_request_get))
            .route("/auth/callback", get(auth::auth_callback_get))
            .route("/logout", get(auth::logout_get)),
    );

    let router = Router::new()
        .route("/", get(public::login_page_get))
        .route("/login", get(public::login_page_get))
        .route("/robots.txt", get(public::robots_get))
        .merge(gated)
        .fallback(public::not_found)
        .with_state(Arc::clone(&state));

    with_request_log(router, &state)
}
