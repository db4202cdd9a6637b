//! Request dispatch
//!
//! Entry point of the web listener. Picks the management sub-router or the
//! proxy path by node mode and Host, then for proxy requests:
//!
//! 1. unknown host or empty backend pool: 404
//! 2. acquire the request's database handle
//! 3. resolve the `zgate-proxy` session (error: 500)
//! 4. no session: clear the stale cookie, serve the public sub-router
//! 5. fetch the session's user (error: 500; none: as 4)
//! 6. policy check against the host's service (error: 500; deny: as 4)
//! 7. forward to one backend chosen uniformly at random

use std::sync::Arc;

use axum::extract::Request;
use axum::http::header::SET_COOKIE;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::Router;
use axum_extra::extract::cookie::CookieJar;
use tower::ServiceExt;
use tower_http::timeout::TimeoutLayer;
use zgate_core::{DbHandle, GateError, PolicyResult, Service};

use crate::context::BoundService;
use crate::cookie::{self, PROXY_COOKIE};
use crate::error::ApiError;
use crate::middleware::{count_requests, limits, recovery};
use crate::node::{request_host, NodeMode};
use crate::routes;
use crate::state::AppState;

/// Routes web listener requests
#[derive(Clone)]
pub struct Dispatcher {
    state: Arc<AppState>,
    management: Router,
    proxy: Router,
}

impl Dispatcher {
    pub fn new(state: Arc<AppState>) -> Self {
        Self::with_management_routes(state, Router::new())
    }

    /// Dispatcher whose management sub-router also serves `extra` behind
    /// the authenticated gate chain
    pub fn with_management_routes(state: Arc<AppState>, extra: Router<Arc<AppState>>) -> Self {
        Self {
            management: routes::create_management_router(Arc::clone(&state), extra),
            proxy: routes::create_proxy_router(Arc::clone(&state)),
            state,
        }
    }

    /// Dispatch one request. Every branch answers it.
    pub async fn serve(&self, req: Request) -> Response {
        let node = self.state.node.load();

        match node.mode {
            NodeMode::Management => self.management(req).await,
            NodeMode::ManagementProxy
                if request_host(&req) == Some(node.management_domain.as_str()) =>
            {
                self.management(req).await
            }
            NodeMode::ManagementProxy | NodeMode::Proxy => self.proxy(req).await,
        }
    }

    async fn management(&self, req: Request) -> Response {
        self.management
            .clone()
            .oneshot(req)
            .await
            .unwrap_or_else(|never| match never {})
    }

    async fn proxy(&self, req: Request) -> Response {
        let node = self.state.node.load();
        let host = request_host(&req).unwrap_or_default();

        let (Some(host_config), Some(backends)) = (node.hosts.get(host), node.backends.get(host))
        else {
            return ApiError::not_found().into_response();
        };
        if backends.is_empty() {
            return ApiError::not_found().into_response();
        }
        let service = Arc::clone(&host_config.service);

        let db = Arc::new(DbHandle::acquire(&self.state.database));
        let jar = CookieJar::from_headers(req.headers());
        let stale_cookie = jar.get(PROXY_COOKIE).is_some();

        let session = match cookie::load(&jar, PROXY_COOKIE) {
            Some(session_id) => match self.state.sessions.get(&db, &session_id).await {
                Ok(session) => session.filter(|s| s.scope.is_service(&service.id)),
                Err(e) => return fault(e),
            },
            None => None,
        };
        let Some(session) = session else {
            return self.public(req, service, db, jar, stale_cookie).await;
        };

        let user = match self.state.users.get(&db, &session.user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => return self.public(req, service, db, jar, true).await,
            Err(e) => return fault(e),
        };

        match self.state.policy.validate(&db, &user, &service).await {
            Ok(PolicyResult::Pass) => {}
            Ok(PolicyResult::Deny(data)) => {
                tracing::info!(user_id = %user.id, service_id = %service.id, error = %data.error, "router: Proxy policy denied");
                return self.public(req, service, db, jar, true).await;
            }
            Err(e) => return fault(e),
        }

        let Some(backend) = self.state.balancer.pick(backends) else {
            return ApiError::not_found().into_response();
        };
        tracing::debug!(backend = backend.address(), host, "router: Forwarding");
        backend.forward(req).await
    }

    /// Serve the public proxy sub-router, clearing the session cookie
    /// unless the sub-router set one itself
    async fn public(
        &self,
        mut req: Request,
        service: Arc<Service>,
        db: Arc<DbHandle>,
        jar: CookieJar,
        remove_cookie: bool,
    ) -> Response {
        req.extensions_mut().insert(BoundService(Some(service)));
        req.extensions_mut().insert(db);

        let response = self
            .proxy
            .clone()
            .oneshot(req)
            .await
            .unwrap_or_else(|never| match never {});

        if !remove_cookie {
            return response;
        }
        let already_set = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| cookie::sets_cookie(v, PROXY_COOKIE));
        if already_set {
            return response;
        }

        (cookie::remove(jar, PROXY_COOKIE), response).into_response()
    }

    /// The web listener's router: dispatch plus the outer gate stages
    pub fn into_router(self) -> Router {
        let node = Arc::clone(&self.state.node);
        let timeout = self.state.config.web_timeout;

        Router::new()
            .fallback(move |req: Request| {
                let dispatcher = self.clone();
                async move { dispatcher.serve(req).await }
            })
            .layer(middleware::from_fn_with_state(node, count_requests))
            .layer(TimeoutLayer::new(timeout))
            .layer(middleware::from_fn(limits::header_limit))
            .layer(limits::body_limit())
            .layer(recovery::layer())
    }
}

fn fault(error: GateError) -> Response {
    tracing::error!(code = error.code(), error = %error, "router: Proxy dispatch failed");
    ApiError::server(error).into_response()
}
