//! Single sign-on state and callback verification
//!
//! ## Flow
//!
//! ```text
//! browser ── GET /auth/request?id=<provider> ──▶ gateway
//!            issue StateToken {id, provider, secret, issued_at, nonce}
//!            store it, redirect to provider with state=<id>
//! provider ── authenticates user, signs the callback query with the secret
//! browser ── GET /auth/callback?state=<id>&...&sig=<signature> ──▶ gateway
//!            look up token, check age, recompute signature over everything
//!            before "&sig=", consume the token (single use), hand params
//!            to the provider
//! ```
//!
//! Every failure to match a live token (unknown, expired, bad signature)
//! is [`GateError::InvalidState`]. Handlers answer it with a redirect to
//! the root path and never show an error page.
//!
//! The provider-specific wire protocols stay behind [`SsoProvider`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE, Engine};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::database::DbHandle;
use crate::error::{GateError, Result};
use crate::model::LoginOutcome;

type HmacSha256 = Hmac<Sha256>;

/// How long a state token stays valid
pub const STATE_TTL_SECS: i64 = 300;

/// Listing entry for an identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub label: String,
}

impl ProviderInfo {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            label: label.into(),
        }
    }

    /// The synthetic entry listed in demo mode
    pub fn demo() -> Self {
        Self::new("demo", "demo", "demo")
    }
}

/// Signed, time-bound value authenticating the return leg of an SSO login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateToken {
    /// Sent to the provider as `state`
    pub id: String,
    pub provider_id: String,
    /// Shared with the provider for signing the callback
    pub secret: String,
    pub issued_at: DateTime<Utc>,
    pub nonce: String,
}

impl StateToken {
    /// Issue a fresh token for `provider_id`
    pub fn issue(provider_id: impl Into<String>) -> Self {
        Self {
            id: random_hex(16),
            provider_id: provider_id.into(),
            secret: random_hex(32),
            issued_at: Utc::now(),
            nonce: random_hex(16),
        }
    }

    /// Has the token outlived `ttl` at `now`?
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.issued_at > ttl
    }
}

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

fn query_mac(secret: &str) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| GateError::internal(format!("hmac key: {}", e)))
}

/// Sign a canonical callback query with a token secret
pub fn sign_query(secret: &str, query: &str) -> Result<String> {
    let mut mac = query_mac(secret)?;
    mac.update(query.as_bytes());
    Ok(URL_SAFE.encode(mac.finalize().into_bytes()))
}

fn verify_query(secret: &str, query: &str, sig: &str) -> Result<bool> {
    let Ok(provided) = URL_SAFE.decode(sig.as_bytes()) else {
        return Ok(false);
    };
    let mut mac = query_mac(secret)?;
    mac.update(query.as_bytes());
    Ok(mac.verify_slice(&provided).is_ok())
}

/// Parsed callback parameters, excluding `sig`
pub type CallbackParams = HashMap<String, String>;

/// Pending state token storage
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn insert(&self, db: &DbHandle, token: StateToken) -> Result<()>;

    /// Look a token up without consuming it
    async fn get(&self, db: &DbHandle, id: &str) -> Result<Option<StateToken>>;

    /// Remove and return a token. Tokens are single use.
    async fn take(&self, db: &DbHandle, id: &str) -> Result<Option<StateToken>>;
}

/// A provider-specific SSO wire protocol
#[async_trait]
pub trait SsoProvider: Send + Sync {
    fn info(&self) -> ProviderInfo;

    /// URL to send the browser to, embedding the state token
    async fn authorize_url(&self, token: &StateToken, callback_url: &str) -> Result<String>;

    /// Map verified callback parameters to a user
    async fn resolve_user(&self, db: &DbHandle, params: &CallbackParams) -> Result<LoginOutcome>;
}

/// Registry of providers plus the state-token verifier
pub struct SsoGateway {
    providers: Vec<Arc<dyn SsoProvider>>,
    states: Arc<dyn StateStore>,
    ttl: Duration,
}

impl SsoGateway {
    pub fn new(states: Arc<dyn StateStore>) -> Self {
        Self {
            providers: Vec::new(),
            states,
            ttl: Duration::seconds(STATE_TTL_SECS),
        }
    }

    /// Register a provider
    pub fn with_provider(mut self, provider: Arc<dyn SsoProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Override the state token lifetime
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Configured providers, in registration order
    pub fn providers(&self) -> Vec<ProviderInfo> {
        self.providers.iter().map(|p| p.info()).collect()
    }

    fn provider(&self, id: &str) -> Option<&Arc<dyn SsoProvider>> {
        self.providers.iter().find(|p| p.info().id == id)
    }

    /// Start a login: issue and store a state token, return the provider URL
    pub async fn request(&self, db: &DbHandle, provider_id: &str, callback_url: &str) -> Result<String> {
        let provider = self
            .provider(provider_id)
            .ok_or_else(|| GateError::not_found(format!("sso provider '{}'", provider_id)))?;

        let token = StateToken::issue(provider_id);
        let url = provider.authorize_url(&token, callback_url).await?;
        self.states.insert(db, token).await?;

        Ok(url)
    }

    /// Verify a callback and resolve its user
    ///
    /// `query` is the raw query string with the trailing `&sig=...` removed;
    /// `sig` is the signature the provider appended.
    pub async fn callback(&self, db: &DbHandle, sig: &str, query: &str) -> Result<LoginOutcome> {
        let params: CallbackParams = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();

        let state = params
            .get("state")
            .ok_or_else(|| GateError::invalid_state("missing state parameter"))?;

        let token = self
            .states
            .get(db, state)
            .await?
            .ok_or_else(|| GateError::invalid_state("unknown state token"))?;

        if token.is_expired(Utc::now(), self.ttl) {
            self.states.take(db, state).await?;
            return Err(GateError::invalid_state("state token expired"));
        }

        // a bad signature leaves the pending login intact
        if !verify_query(&token.secret, query, sig)? {
            return Err(GateError::invalid_state("callback signature mismatch"));
        }

        // lost a race with a concurrent callback for the same state
        if self.states.take(db, state).await?.is_none() {
            return Err(GateError::invalid_state("state token already used"));
        }

        let provider = self
            .provider(&token.provider_id)
            .ok_or_else(|| GateError::invalid_state("state token names an unknown provider"))?;

        provider.resolve_user(db, &params).await
    }
}
