use axum::http::request::Parts;
use axum::http::{header, HeaderMap, StatusCode};
use axum_extra::extract::cookie::CookieJar;
use zgate_core::PolicyResult;

use super::Stage;
use crate::authorizer::{self, Authorizer};
use crate::context::RequestContext;
use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the CSRF token on ordinary requests
pub const CSRF_HEADER: &str = "Csrf-Token";

/// Query parameter carrying the CSRF token on websocket upgrades
pub const CSRF_QUERY: &str = "csrf_token";

pub(super) async fn run(
    state: &AppState,
    stages: &[Stage],
    ctx: &mut RequestContext,
    parts: &Parts,
    jar: &mut CookieJar,
) -> Result<(), ApiError> {
    for stage in stages {
        match stage {
            Stage::Session => session(state, ctx, parts, jar).await?,
            Stage::SessionProxy => session_proxy(state, ctx, jar).await?,
            Stage::Auth => auth(state, ctx, jar).await?,
            Stage::CsrfToken => csrf_token(state, ctx, parts).await?,
        }
    }
    Ok(())
}

/// What to do when invalidating a deactivated user's sessions fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RemoveAllFailure {
    Surface,
    Swallow,
}

async fn session(
    state: &AppState,
    ctx: &mut RequestContext,
    parts: &Parts,
    jar: &mut CookieJar,
) -> Result<(), ApiError> {
    ctx.authorizer = authorizer::authorize(state, &ctx.db, parts, jar)
        .await
        .map_err(|e| {
            if e.is_authentication() {
                ApiError::fault(StatusCode::UNAUTHORIZED, e)
            } else {
                ApiError::server(e)
            }
        })?;

    sync_active_user(state, ctx, jar, RemoveAllFailure::Surface).await
}

async fn session_proxy(
    state: &AppState,
    ctx: &mut RequestContext,
    jar: &mut CookieJar,
) -> Result<(), ApiError> {
    let Some(service) = ctx.service.clone() else {
        ctx.authorizer = Authorizer::anonymous();
        return Ok(());
    };

    ctx.authorizer = authorizer::authorize_proxy(state, &ctx.db, jar, &service)
        .await
        .map_err(ApiError::server)?;

    sync_active_user(state, ctx, jar, RemoveAllFailure::Swallow).await
}

/// Fetch the authorizer's user and drop the identity if the user was
/// deactivated upstream
async fn sync_active_user(
    state: &AppState,
    ctx: &mut RequestContext,
    jar: &mut CookieJar,
    on_failure: RemoveAllFailure,
) -> Result<(), ApiError> {
    if !ctx.authorizer.is_valid() {
        return Ok(());
    }

    let user = ctx
        .authorizer
        .get_user(state.users.as_ref(), &ctx.db)
        .await
        .map_err(ApiError::server)?;
    let Some(user) = user else {
        return Ok(());
    };

    let active = state
        .users
        .sync(&ctx.db, &user)
        .await
        .map_err(ApiError::server)?;
    if active {
        ctx.user = Some(user);
        return Ok(());
    }

    tracing::info!(user_id = %user.id, "middleware: User no longer active, clearing sessions");
    *jar = ctx.authorizer.clear(std::mem::take(jar));

    if let Err(e) = state.sessions.remove_all(&ctx.db, &user.id).await {
        match on_failure {
            RemoveAllFailure::Surface => return Err(ApiError::server(e)),
            RemoveAllFailure::Swallow => {
                tracing::warn!(user_id = %user.id, error = %e, "middleware: Failed to remove sessions");
            }
        }
    }

    Ok(())
}

async fn auth(state: &AppState, ctx: &mut RequestContext, jar: &mut CookieJar) -> Result<(), ApiError> {
    let user = match &ctx.user {
        Some(user) if ctx.authorizer.is_valid() => user.clone(),
        _ => return Err(ApiError::unauthorized()),
    };

    let result = match &ctx.service {
        Some(service) => state.policy.validate(&ctx.db, &user, service).await,
        None => state.policy.validate_admin(&ctx.db, &user).await,
    }
    .map_err(ApiError::server)?;

    if let PolicyResult::Deny(data) = result {
        tracing::info!(user_id = %user.id, error = %data.error, "middleware: Policy denied");
        *jar = ctx.authorizer.clear(std::mem::take(jar));
        return Err(ApiError::Denied(data));
    }

    Ok(())
}

fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
}

fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

async fn csrf_token(state: &AppState, ctx: &RequestContext, parts: &Parts) -> Result<(), ApiError> {
    if !ctx.authorizer.is_valid() {
        return Err(ApiError::unauthorized());
    }
    if ctx.authorizer.is_api() {
        return Ok(());
    }

    let token = if is_websocket_upgrade(&parts.headers) {
        query_param(parts.uri.query(), CSRF_QUERY)
    } else {
        parts
            .headers
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string())
    }
    .unwrap_or_default();

    match state
        .csrf
        .validate(&ctx.db, ctx.authorizer.session_id(), &token)
        .await
    {
        Ok(true) => Ok(()),
        Ok(false) => Err(ApiError::unauthorized()),
        Err(e) if e.is_not_found() => Err(ApiError::fault(StatusCode::UNAUTHORIZED, e)),
        Err(e) => Err(ApiError::server(e)),
    }
}
