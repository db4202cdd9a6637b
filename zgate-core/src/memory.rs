//! In-memory collaborators
//!
//! Process-local implementations of every store trait. The `zgate` binary
//! runs on these when no external identity backend is wired in, and the
//! test suites use them throughout.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::{Mutex, RwLock};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::audit::{AuditEvent, AuditLogger};
use crate::csrf::CsrfStore;
use crate::database::{Database, DbHandle};
use crate::error::{GateError, Result};
use crate::model::{ApiKey, ErrorData, LoginOutcome, Session, SessionOrigin, SessionScope, User};
use crate::signature::MAX_SKEW_SECS;
use crate::sso::{StateStore, StateToken, STATE_TTL_SECS};
use crate::store::{ApiKeyStore, LocalAuthenticator, SessionStore, UserStore};

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

// ═══════════════════════════════════════════════════════════════════════════
// Database
// ═══════════════════════════════════════════════════════════════════════════

/// Handle counter standing in for a connection pool
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    next_id: AtomicU64,
    open: AtomicUsize,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles acquired and not yet released
    pub fn open_handles(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

impl Database for MemoryDatabase {
    fn open(&self) -> u64 {
        self.open.fetch_add(1, Ordering::SeqCst);
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn release(&self, _id: u64) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Sessions
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an existing session record
    pub fn insert(&self, session: Session) {
        self.sessions.write().insert(session.id.clone(), session);
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().contains_key(session_id)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, _db: &DbHandle, session_id: &str) -> Result<Option<Session>> {
        Ok(self.sessions.read().get(session_id).cloned())
    }

    async fn create(
        &self,
        _db: &DbHandle,
        user_id: &str,
        scope: SessionScope,
        origin: SessionOrigin,
    ) -> Result<Session> {
        let session = Session::new(user_id, scope, origin);
        self.insert(session.clone());
        Ok(session)
    }

    async fn remove(&self, _db: &DbHandle, session_id: &str) -> Result<()> {
        self.sessions.write().remove(session_id);
        Ok(())
    }

    async fn remove_all(&self, _db: &DbHandle, user_id: &str) -> Result<()> {
        self.sessions.write().retain(|_, s| s.user_id != user_id);
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Users
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
struct LocalAccount {
    user: User,
    salt: String,
    password_hash: String,
    active: bool,
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// User directory with salted SHA-256 local passwords
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    accounts: RwLock<HashMap<String, LocalAccount>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a user with a local password
    pub fn add_user(&self, user: User, password: &str) {
        let salt = random_hex(16);
        let account = LocalAccount {
            password_hash: hash_password(&salt, password),
            salt,
            user: user.clone(),
            active: true,
        };
        self.accounts.write().insert(user.id, account);
    }

    /// Mark an account inactive upstream; the next sync reports it
    pub fn deactivate(&self, user_id: &str) {
        if let Some(account) = self.accounts.write().get_mut(user_id) {
            account.active = false;
        }
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get(&self, _db: &DbHandle, user_id: &str) -> Result<Option<User>> {
        Ok(self.accounts.read().get(user_id).map(|a| a.user.clone()))
    }

    async fn sync(&self, _db: &DbHandle, user: &User) -> Result<bool> {
        Ok(self
            .accounts
            .read()
            .get(&user.id)
            .map(|a| a.active)
            .unwrap_or(false))
    }
}

#[async_trait]
impl LocalAuthenticator for MemoryUserStore {
    async fn authenticate(
        &self,
        _db: &DbHandle,
        username: &str,
        password: &str,
    ) -> Result<LoginOutcome> {
        let accounts = self.accounts.read();
        let account = accounts.values().find(|a| a.user.username == username);

        match account {
            Some(a) if a.active && hash_password(&a.salt, password) == a.password_hash => {
                Ok(LoginOutcome::Authenticated(a.user.clone()))
            }
            _ => Ok(LoginOutcome::Rejected(ErrorData::invalid_credentials())),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// API keys
// ═══════════════════════════════════════════════════════════════════════════

/// How long a used nonce is remembered. A request stamped at the far
/// edge of the future skew stays fresh for twice the skew after first use.
const NONCE_RETENTION_SECS: i64 = 2 * MAX_SKEW_SECS;

#[derive(Debug, Default)]
pub struct MemoryApiKeyStore {
    keys: RwLock<HashMap<String, ApiKey>>,
    /// (token, nonce) to first-use time in unix seconds
    nonces: Mutex<HashMap<(String, String), i64>>,
}

impl MemoryApiKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_key(&self, key: ApiKey) {
        self.keys.write().insert(key.token.clone(), key);
    }

    /// Record a nonce as used at `now`, forgetting nonces past retention.
    /// False when the nonce is already on record.
    pub fn use_nonce_at(&self, token: &str, nonce: &str, now: i64) -> bool {
        let mut nonces = self.nonces.lock();
        nonces.retain(|_, used_at| now - *used_at <= NONCE_RETENTION_SECS);

        let key = (token.to_string(), nonce.to_string());
        if nonces.contains_key(&key) {
            return false;
        }
        nonces.insert(key, now);
        true
    }

    /// Nonces currently remembered
    pub fn nonce_count(&self) -> usize {
        self.nonces.lock().len()
    }
}

#[async_trait]
impl ApiKeyStore for MemoryApiKeyStore {
    async fn get_by_token(&self, _db: &DbHandle, token: &str) -> Result<Option<ApiKey>> {
        Ok(self.keys.read().get(token).cloned())
    }

    async fn use_nonce(&self, _db: &DbHandle, token: &str, nonce: &str) -> Result<bool> {
        Ok(self.use_nonce_at(token, nonce, Utc::now().timestamp()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// CSRF
// ═══════════════════════════════════════════════════════════════════════════

/// CSRF tokens keyed by session ID
///
/// When bound to a [`MemorySessionStore`], tokens of sessions that no
/// longer exist are dropped on the next issue and never validate.
#[derive(Debug, Default)]
pub struct MemoryCsrfStore {
    tokens: RwLock<HashMap<String, String>>,
    sessions: Option<Arc<MemorySessionStore>>,
}

impl MemoryCsrfStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tie token lifetime to the sessions in `sessions`
    pub fn bound_to(sessions: Arc<MemorySessionStore>) -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
            sessions: Some(sessions),
        }
    }

    fn session_live(&self, session_id: &str) -> bool {
        self.sessions
            .as_ref()
            .map_or(true, |sessions| sessions.contains(session_id))
    }

    /// Tokens currently held
    pub fn len(&self) -> usize {
        self.tokens.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.read().is_empty()
    }
}

#[async_trait]
impl CsrfStore for MemoryCsrfStore {
    async fn new_token(&self, _db: &DbHandle, session_id: &str) -> Result<String> {
        let token = random_hex(32);
        let mut tokens = self.tokens.write();
        if self.sessions.is_some() {
            tokens.retain(|id, _| self.session_live(id));
        }
        tokens.insert(session_id.to_string(), token.clone());
        Ok(token)
    }

    async fn validate(&self, _db: &DbHandle, session_id: &str, token: &str) -> Result<bool> {
        if !self.session_live(session_id) {
            self.tokens.write().remove(session_id);
            return Err(GateError::not_found(format!("csrf token for session {}", session_id)));
        }

        match self.tokens.read().get(session_id) {
            Some(expected) => Ok(expected == token),
            None => Err(GateError::not_found(format!("csrf token for session {}", session_id))),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SSO state
// ═══════════════════════════════════════════════════════════════════════════

/// Pending SSO state tokens. Tokens past their lifetime are dropped
/// whenever a new one is stored.
#[derive(Debug)]
pub struct MemoryStateStore {
    tokens: Mutex<HashMap<String, StateToken>>,
    ttl: Duration,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
            ttl: Duration::seconds(STATE_TTL_SECS),
        }
    }

    /// Override how long an abandoned token is kept
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Pending tokens, for inspection
    pub fn snapshot(&self) -> Vec<StateToken> {
        self.tokens.lock().values().cloned().collect()
    }
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn insert(&self, _db: &DbHandle, token: StateToken) -> Result<()> {
        let now = Utc::now();
        let mut tokens = self.tokens.lock();
        tokens.retain(|_, t| !t.is_expired(now, self.ttl));
        tokens.insert(token.id.clone(), token);
        Ok(())
    }

    async fn get(&self, _db: &DbHandle, id: &str) -> Result<Option<StateToken>> {
        Ok(self.tokens.lock().get(id).cloned())
    }

    async fn take(&self, _db: &DbHandle, id: &str) -> Result<Option<StateToken>> {
        Ok(self.tokens.lock().remove(id))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Audit
// ═══════════════════════════════════════════════════════════════════════════

/// Collects audit events in memory
#[derive(Debug, Default)]
pub struct MemoryAudit {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl AuditLogger for MemoryAudit {
    async fn record(&self, _db: &DbHandle, event: AuditEvent) -> Result<()> {
        tracing::debug!(kind = event.kind.as_str(), "audit: recorded");
        self.events.lock().push(event);
        Ok(())
    }
}
