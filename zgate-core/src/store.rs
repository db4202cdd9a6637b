//! Identity store collaborators
//!
//! The gateway never owns identity data. These traits are the seams to the
//! session store, the user directory, API key storage and the local
//! credential verifier. All methods take `&self` to allow for interior
//! mutability patterns, and every call is scoped to the request's
//! [`DbHandle`].

use async_trait::async_trait;

use crate::database::DbHandle;
use crate::error::Result;
use crate::model::{ApiKey, LoginOutcome, Session, SessionOrigin, SessionScope, User};

/// Session persistence
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Look up a session by the opaque ID carried in its cookie
    async fn get(&self, db: &DbHandle, session_id: &str) -> Result<Option<Session>>;

    /// Create a new session for `user_id`
    async fn create(
        &self,
        db: &DbHandle,
        user_id: &str,
        scope: SessionScope,
        origin: SessionOrigin,
    ) -> Result<Session>;

    /// Destroy one session. Removing an unknown ID is not an error.
    async fn remove(&self, db: &DbHandle, session_id: &str) -> Result<()>;

    /// Destroy every session belonging to `user_id`
    async fn remove_all(&self, db: &DbHandle, user_id: &str) -> Result<()>;
}

/// User directory
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get(&self, db: &DbHandle, user_id: &str) -> Result<Option<User>>;

    /// Synchronize with the upstream identity source
    ///
    /// Returns `false` when the account is no longer active.
    async fn sync(&self, db: &DbHandle, user: &User) -> Result<bool>;
}

/// API key lookup and replay protection
#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    async fn get_by_token(&self, db: &DbHandle, token: &str) -> Result<Option<ApiKey>>;

    /// Record a nonce for `token`. Returns `false` if it was already used.
    async fn use_nonce(&self, db: &DbHandle, token: &str, nonce: &str) -> Result<bool>;
}

/// Username/password verification
#[async_trait]
pub trait LocalAuthenticator: Send + Sync {
    /// A wrong password is `Ok(LoginOutcome::Rejected(..))`, not an error
    async fn authenticate(
        &self,
        db: &DbHandle,
        username: &str,
        password: &str,
    ) -> Result<LoginOutcome>;
}
