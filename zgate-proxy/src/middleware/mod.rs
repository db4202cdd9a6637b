//! The gate chain
//!
//! Layers around every request, outermost first:
//!
//! ```text
//! Recovery ── panics become 500 (recovery.rs)
//!  └ Limiter ── 1,000,000 byte body cap, 4096 byte header cap (limits.rs)
//!     └ Counter ── node request counter
//!        └ Database ── one DbHandle per request, released on every path
//!           └ Session | SessionProxy ── resolve the Authorizer
//!              └ Auth ── policy check
//!                 └ CsrfToken
//! ```
//!
//! Database and the identity stages run inside [`gate`], configured per
//! route group by a [`GateChain`]. Stages run on the request's head only
//! and share a single cookie jar, so any cookie a stage clears is written
//! to the response whether the chain aborts or completes.

pub mod limits;
pub mod recovery;
pub mod stages;

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use axum_extra::extract::cookie::CookieJar;
use zgate_core::DbHandle;

use crate::context::{client_addr, BoundService, RequestContext};
use crate::error::HandlerError;
use crate::node::Node;
use crate::state::AppState;

/// One identity stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Resolve a management Authorizer (API signature or session cookie)
    Session,
    /// Resolve a proxy Authorizer for the bound service
    SessionProxy,
    /// Require a valid user passing policy
    Auth,
    /// Require a valid CSRF token unless API-authenticated
    CsrfToken,
}

/// Ordered identity stages for one route group
#[derive(Clone)]
pub struct GateChain {
    state: Arc<AppState>,
    stages: Arc<[Stage]>,
}

impl GateChain {
    pub fn new(state: Arc<AppState>, stages: &[Stage]) -> Self {
        Self {
            state,
            stages: stages.into(),
        }
    }

    /// Gate every route of `router`. The fallback is not gated.
    pub fn apply<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.route_layer(middleware::from_fn_with_state(self, gate))
    }
}

/// Counter stage
pub async fn count_requests(State(node): State<Arc<Node>>, req: Request, next: Next) -> Response {
    node.add_request();
    next.run(req).await
}

/// Database and identity stages
///
/// The dispatcher may already hold a handle for this request; it is
/// reused so one request never holds two.
pub async fn gate(State(chain): State<GateChain>, req: Request, next: Next) -> Response {
    let state = Arc::clone(&chain.state);
    let (mut parts, body) = req.into_parts();

    let db = parts
        .extensions
        .get::<Arc<DbHandle>>()
        .cloned()
        .unwrap_or_else(|| Arc::new(DbHandle::acquire(&state.database)));
    let service = parts
        .extensions
        .get::<BoundService>()
        .and_then(|bound| bound.0.clone());
    let remote = client_addr(&parts);

    let mut ctx = RequestContext::new(db, service, remote.clone());
    let mut jar = CookieJar::from_headers(&parts.headers);

    let result = stages::run(&state, &chain.stages, &mut ctx, &parts, &mut jar).await;

    let response = match result {
        Ok(()) => {
            parts.extensions.insert(ctx);
            let response = next.run(Request::from_parts(parts, body)).await;
            (jar, response).into_response()
        }
        Err(err) => (jar, err).into_response(),
    };

    log_handler_error(&response, remote.as_deref());
    response
}

fn log_handler_error(response: &Response, remote: Option<&str>) {
    let Some(HandlerError(error)) = response.extensions().get::<HandlerError>() else {
        return;
    };
    let client = remote.unwrap_or("unknown");
    let status = response.status().as_u16();

    if response.status().is_server_error() {
        tracing::error!(client, status, code = error.code(), error = %error, "middleware: Handler error");
    } else {
        tracing::info!(client, status, code = error.code(), error = %error, "middleware: Request rejected");
    }
}
