//! Login flow routes

use std::sync::Arc;

use axum::extract::{Query, RawQuery, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use zgate_core::{
    AuditEvent, AuditKind, LoginOutcome, PolicyResult, ProviderInfo, Service, SessionOrigin,
    SessionScope, User,
};

use super::found;
use crate::context::RequestContext;
use crate::cookie::{self, PROXY_COOKIE};
use crate::error::ApiError;
use crate::state::AppState;

/// Local login body
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// SSO initiation query
#[derive(Debug, Deserialize)]
pub struct SsoRequest {
    /// Provider ID
    pub id: String,
}

/// List identity providers
pub async fn auth_state_get(State(state): State<Arc<AppState>>) -> Json<Vec<ProviderInfo>> {
    let mut providers = state.sso.providers();
    if state.config.demo {
        providers.push(ProviderInfo::demo());
    }
    Json(providers)
}

async fn record(
    state: &AppState,
    ctx: &RequestContext,
    kind: AuditKind,
    user: Option<&User>,
    method: &str,
    service: &Service,
) -> Result<(), ApiError> {
    let event = AuditEvent::new(kind, user.map(|u| u.id.clone()))
        .with_field("method", method)
        .with_field("service_id", service.id.as_str())
        .with_remote_addr(ctx.remote_addr.clone());

    state
        .audit
        .record(&ctx.db, event)
        .await
        .map_err(ApiError::server)
}

fn origin(ctx: &RequestContext, headers: &HeaderMap) -> SessionOrigin {
    SessionOrigin {
        remote_addr: ctx.remote_addr.clone(),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string()),
    }
}

/// Create a service-scoped session and queue its cookie
async fn mint_session(
    state: &AppState,
    ctx: &RequestContext,
    jar: CookieJar,
    user: &User,
    service: &Service,
    origin: SessionOrigin,
) -> Result<CookieJar, ApiError> {
    let session = state
        .sessions
        .create(&ctx.db, &user.id, SessionScope::Service(service.id.clone()), origin)
        .await
        .map_err(ApiError::server)?;

    tracing::info!(user_id = %user.id, service_id = %service.id, "router: Session created");
    Ok(jar.add(cookie::session_cookie(
        PROXY_COOKIE,
        session.id,
        state.secure_cookies(),
    )))
}

/// Local username/password login for the bound service
pub async fn auth_session_post(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    jar: CookieJar,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let service = ctx.service.clone().ok_or_else(ApiError::not_found)?;

    let outcome = state
        .local_auth
        .authenticate(&ctx.db, &body.username, &body.password)
        .await
        .map_err(ApiError::server)?;

    let user = match outcome {
        LoginOutcome::Authenticated(user) => user,
        LoginOutcome::Rejected(data) => {
            record(&state, &ctx, AuditKind::LoginFailed, None, "local", &service).await?;
            return Err(ApiError::Denied(data));
        }
    };

    let result = state
        .policy
        .validate(&ctx.db, &user, &service)
        .await
        .map_err(ApiError::server)?;
    if let PolicyResult::Deny(data) = result {
        record(&state, &ctx, AuditKind::LoginFailed, Some(&user), "local", &service).await?;
        return Err(ApiError::Denied(data));
    }

    record(&state, &ctx, AuditKind::Login, Some(&user), "local", &service).await?;
    let jar = mint_session(&state, &ctx, jar, &user, &service, origin(&ctx, &headers)).await?;

    Ok((jar, StatusCode::OK).into_response())
}

/// Full logout, then back to the root path
pub async fn logout_get(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let mut authorizer = ctx.authorizer.clone();
    let jar = if authorizer.is_valid() {
        authorizer
            .remove(state.sessions.as_ref(), &ctx.db, jar)
            .await
            .map_err(ApiError::server)?
    } else {
        jar
    };

    Ok((jar, found("/")).into_response())
}

/// Start an SSO login with the named provider
pub async fn auth_request_get(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    headers: HeaderMap,
    Query(params): Query<SsoRequest>,
) -> Result<Response, ApiError> {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(ApiError::not_found)?;
    let scheme = state.node.load().protocol.scheme();
    let callback_url = format!("{}://{}/auth/callback", scheme, host);

    let redirect = state
        .sso
        .request(&ctx.db, &params.id, &callback_url)
        .await?;

    Ok(found(&redirect))
}

/// Split a callback query into the signed prefix and the `sig` value
pub fn split_signature(query: &str) -> Option<(&str, String)> {
    let idx = query.rfind("&sig=")?;
    let signed = &query[..idx];
    let sig = url::form_urlencoded::parse(query[idx + 1..].as_bytes())
        .find(|(key, _)| key == "sig")
        .map(|(_, value)| value.into_owned())?;
    Some((signed, sig))
}

/// Return leg of an SSO login
pub async fn auth_callback_get(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    jar: CookieJar,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Result<Response, ApiError> {
    let service = ctx.service.clone().ok_or_else(ApiError::not_found)?;

    let query = query.unwrap_or_default();
    let Some((signed, sig)) = split_signature(&query) else {
        tracing::info!("router: SSO callback without signature");
        return Ok(found("/"));
    };

    let outcome = match state.sso.callback(&ctx.db, &sig, signed).await {
        Ok(outcome) => outcome,
        Err(e) if e.is_invalid_state() => {
            tracing::info!(reason = %e, "router: SSO callback state rejected");
            return Ok(found("/"));
        }
        Err(e) => return Err(ApiError::server(e)),
    };

    let user = match outcome {
        LoginOutcome::Authenticated(user) => user,
        LoginOutcome::Rejected(data) => return Err(ApiError::Denied(data)),
    };

    let result = state
        .policy
        .validate(&ctx.db, &user, &service)
        .await
        .map_err(ApiError::server)?;
    if let PolicyResult::Deny(data) = result {
        return Err(ApiError::Denied(data));
    }

    record(&state, &ctx, AuditKind::Login, Some(&user), "sso", &service).await?;
    let jar = mint_session(&state, &ctx, jar, &user, &service, origin(&ctx, &headers)).await?;

    Ok((jar, found("/")).into_response())
}
