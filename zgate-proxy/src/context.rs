//! Request-scoped context
//!
//! The gate chain builds one [`RequestContext`] per request and inserts it
//! as a request extension before the handler runs. Handlers take it as an
//! extractor.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::async_trait;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use zgate_core::{DbHandle, GateError, Service, User};

use crate::authorizer::Authorizer;
use crate::error::ApiError;

/// Service a proxy sub-router request is bound to, set by the dispatcher
#[derive(Debug, Clone, Default)]
pub struct BoundService(pub Option<Arc<Service>>);

/// Everything the gate chain resolved for one request
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub db: Arc<DbHandle>,
    pub authorizer: Authorizer,
    /// Bound service, proxy sub-router only
    pub service: Option<Arc<Service>>,
    /// The authorizer's user, once a stage fetched it
    pub user: Option<User>,
    pub remote_addr: Option<String>,
}

impl RequestContext {
    pub fn new(db: Arc<DbHandle>, service: Option<Arc<Service>>, remote_addr: Option<String>) -> Self {
        Self {
            db,
            authorizer: Authorizer::Invalid,
            service,
            user: None,
            remote_addr,
        }
    }
}

/// Client address from connection info, when the listener recorded it
pub fn client_addr(parts: &Parts) -> Option<String> {
    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .ok_or_else(|| ApiError::server(GateError::internal("handler mounted outside a gate chain")))
    }
}
