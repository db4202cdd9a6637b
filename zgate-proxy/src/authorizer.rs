//! Per-request identity
//!
//! Exactly one [`Authorizer`] is resolved for every request that passes
//! through a gate chain. It is built by the Session or SessionProxy stage
//! and read by everything after it.
//!
//! | variant | from | valid |
//! |---|---|---|
//! | `Invalid` | no or stale credentials | no |
//! | `Session` | `zgate-session` cookie | yes |
//! | `Api` | signed `Auth-*` headers | yes |
//! | `Proxy` | `zgate-proxy` cookie scoped to the bound service | with a session |

use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum_extra::extract::cookie::CookieJar;
use zgate_core::signature::{NONCE_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER, TOKEN_HEADER};
use zgate_core::{
    ApiKey, DbHandle, GateError, RequestSignature, Result, Service, Session, SessionScope,
    SessionStore, User, UserStore,
};

use crate::cookie::{self, PROXY_COOKIE, SESSION_COOKIE};
use crate::state::AppState;

/// Resolved identity of one request
#[derive(Debug, Clone, PartialEq)]
pub enum Authorizer {
    Invalid,
    /// Management session
    Session(Session),
    /// Signed API request
    Api(ApiKey),
    /// Proxy context. `service_id` is `None` for anonymous service-less
    /// routes; `session` is `None` until the user logs in.
    Proxy {
        service_id: Option<String>,
        session: Option<Session>,
    },
}

impl Authorizer {
    /// Identity for proxy routes with no bound service
    pub fn anonymous() -> Self {
        Authorizer::Proxy {
            service_id: None,
            session: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        match self {
            Authorizer::Invalid => false,
            Authorizer::Session(_) | Authorizer::Api(_) => true,
            Authorizer::Proxy { session, .. } => session.is_some(),
        }
    }

    pub fn is_api(&self) -> bool {
        matches!(self, Authorizer::Api(_))
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Authorizer::Proxy { service_id: None, .. })
    }

    /// Session ID, empty for API and anonymous identities
    pub fn session_id(&self) -> &str {
        self.session().map(|s| s.id.as_str()).unwrap_or("")
    }

    fn session(&self) -> Option<&Session> {
        match self {
            Authorizer::Session(session) => Some(session),
            Authorizer::Proxy { session, .. } => session.as_ref(),
            Authorizer::Invalid | Authorizer::Api(_) => None,
        }
    }

    fn user_id(&self) -> Option<&str> {
        match self {
            Authorizer::Api(key) => Some(key.user_id.as_str()),
            _ => self.session().map(|s| s.user_id.as_str()),
        }
    }

    fn cookie_name(&self) -> Option<&'static str> {
        match self {
            Authorizer::Session(_) => Some(SESSION_COOKIE),
            Authorizer::Proxy { .. } => Some(PROXY_COOKIE),
            Authorizer::Invalid | Authorizer::Api(_) => None,
        }
    }

    /// Fetch the identity's user. `None` for invalid identities or users
    /// that no longer exist.
    pub async fn get_user(&self, users: &dyn UserStore, db: &DbHandle) -> Result<Option<User>> {
        match self.user_id() {
            Some(user_id) if self.is_valid() => users.get(db, user_id).await,
            _ => Ok(None),
        }
    }

    /// Drop the cookie and mark this identity invalid. The session record
    /// is left in place.
    pub fn clear(&mut self, jar: CookieJar) -> CookieJar {
        let jar = match self.cookie_name() {
            Some(name) if self.session().is_some() => cookie::remove(jar, name),
            _ => jar,
        };
        *self = Authorizer::Invalid;
        jar
    }

    /// Full logout: destroy the session record, then clear
    pub async fn remove(
        &mut self,
        sessions: &dyn SessionStore,
        db: &DbHandle,
        jar: CookieJar,
    ) -> Result<CookieJar> {
        if let Some(session) = self.session() {
            sessions.remove(db, &session.id).await?;
        }
        Ok(self.clear(jar))
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

/// Read the `Auth-*` signature headers. `Ok(None)` when the request is
/// not an API request at all.
fn signature_headers(headers: &HeaderMap) -> Result<Option<RequestSignature>> {
    let Some(token) = header_value(headers, TOKEN_HEADER) else {
        return Ok(None);
    };

    let missing = |name: &str| GateError::authentication(format!("missing {} header", name));
    Ok(Some(RequestSignature {
        token,
        timestamp: header_value(headers, TIMESTAMP_HEADER).ok_or_else(|| missing(TIMESTAMP_HEADER))?,
        nonce: header_value(headers, NONCE_HEADER).ok_or_else(|| missing(NONCE_HEADER))?,
        signature: header_value(headers, SIGNATURE_HEADER).ok_or_else(|| missing(SIGNATURE_HEADER))?,
    }))
}

async fn authorize_api(
    state: &AppState,
    db: &DbHandle,
    parts: &Parts,
    signature: RequestSignature,
) -> Result<Authorizer> {
    let key = state
        .api_keys
        .get_by_token(db, &signature.token)
        .await?
        .ok_or_else(|| GateError::authentication("unknown api token"))?;

    let now = chrono::Utc::now().timestamp();
    signature.verify(&key, parts.method.as_str(), parts.uri.path(), now)?;

    if !state.api_keys.use_nonce(db, &key.token, &signature.nonce).await? {
        return Err(GateError::authentication("nonce already used"));
    }

    Ok(Authorizer::Api(key))
}

/// Resolve a management identity: API signature first, then the
/// `zgate-session` cookie
///
/// A bad signature is an authentication error. A missing, unknown or
/// proxy-scoped session cookie is simply [`Authorizer::Invalid`].
pub async fn authorize(
    state: &AppState,
    db: &DbHandle,
    parts: &Parts,
    jar: &CookieJar,
) -> Result<Authorizer> {
    if let Some(signature) = signature_headers(&parts.headers)? {
        return authorize_api(state, db, parts, signature).await;
    }

    let Some(session_id) = cookie::load(jar, SESSION_COOKIE) else {
        return Ok(Authorizer::Invalid);
    };

    match state.sessions.get(db, &session_id).await? {
        Some(session) if session.scope == SessionScope::Management => Ok(Authorizer::Session(session)),
        _ => Ok(Authorizer::Invalid),
    }
}

/// Resolve a proxy identity bound to `service` from the `zgate-proxy`
/// cookie. Sessions scoped to another service do not count.
pub async fn authorize_proxy(
    state: &AppState,
    db: &DbHandle,
    jar: &CookieJar,
    service: &Service,
) -> Result<Authorizer> {
    let session = match cookie::load(jar, PROXY_COOKIE) {
        Some(session_id) => state
            .sessions
            .get(db, &session_id)
            .await?
            .filter(|s| s.scope.is_service(&service.id)),
        None => None,
    };

    Ok(Authorizer::Proxy {
        service_id: Some(service.id.clone()),
        session,
    })
}
