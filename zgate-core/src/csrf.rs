//! CSRF token storage
//!
//! Tokens are bound to a session ID. Storage is external; the gateway only
//! issues and validates.

use async_trait::async_trait;

use crate::database::DbHandle;
use crate::error::Result;

/// Per-session CSRF token store
#[async_trait]
pub trait CsrfStore: Send + Sync {
    /// Issue (or reissue) the token for `session_id`
    async fn new_token(&self, db: &DbHandle, session_id: &str) -> Result<String>;

    /// Check `token` against the token stored for `session_id`
    ///
    /// Returns [`GateError::NotFound`](crate::error::GateError::NotFound)
    /// when the session has no token at all.
    async fn validate(&self, db: &DbHandle, session_id: &str, token: &str) -> Result<bool>;
}
