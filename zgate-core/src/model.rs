//! Identity model
//!
//! Users, services and sessions as the gateway sees them. Records are owned
//! by external stores; the gateway only reads them and asks the stores to
//! create or destroy sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An account that can log in through the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Stable user ID
    pub id: String,
    /// Login name
    pub username: String,
    /// Roles matched against a service's roles
    #[serde(default)]
    pub roles: Vec<String>,
    /// Whether the user may use the management interface
    #[serde(default)]
    pub administrator: bool,
    /// Disabled users fail every policy check
    #[serde(default)]
    pub disabled: bool,
}

impl User {
    /// Create an enabled, non-administrator user
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            roles: Vec::new(),
            administrator: false,
            disabled: false,
        }
    }

    /// Set the user's roles
    pub fn with_roles(mut self, roles: &[&str]) -> Self {
        self.roles = roles.iter().map(|r| r.to_string()).collect();
        self
    }

    /// Grant management access
    pub fn with_administrator(mut self, administrator: bool) -> Self {
        self.administrator = administrator;
        self
    }
}

/// A backend target and the policy rules bound to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    /// Stable service ID, also the scope of proxy sessions
    pub id: String,
    /// Display name
    pub name: String,
    /// Users need at least one of these roles
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Service {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            roles: Vec::new(),
        }
    }

    /// Set the roles allowed to reach this service
    pub fn with_roles(mut self, roles: &[&str]) -> Self {
        self.roles = roles.iter().map(|r| r.to_string()).collect();
        self
    }
}

/// What a session grants access to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "service_id", rename_all = "snake_case")]
pub enum SessionScope {
    /// Management interface session
    Management,
    /// Proxy-scoped session bound to one service
    Service(String),
}

impl SessionScope {
    /// Returns true when this scope grants access to `service_id`
    pub fn is_service(&self, service_id: &str) -> bool {
        matches!(self, SessionScope::Service(id) if id == service_id)
    }
}

/// Where a login came from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOrigin {
    pub remote_addr: Option<String>,
    pub user_agent: Option<String>,
}

/// A logged-in session referenced by an opaque cookie value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque session ID carried by the cookie
    pub id: String,
    pub user_id: String,
    pub scope: SessionScope,
    pub origin: SessionOrigin,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Create a session with a fresh random ID
    pub fn new(user_id: impl Into<String>, scope: SessionScope, origin: SessionOrigin) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            user_id: user_id.into(),
            scope,
            origin,
            created_at: Utc::now(),
        }
    }
}

/// Credentials for signed API requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: String,
    /// Public token sent in `Auth-Token`
    pub token: String,
    /// Shared HMAC secret, never sent on the wire
    pub secret: String,
    /// Owner of the key
    pub user_id: String,
}

/// Structured failure returned to clients as a 401 JSON payload
///
/// Serializes as `{ "error": <code>, "message": <text> }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorData {
    pub error: String,
    pub message: String,
}

impl ErrorData {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }

    /// The generic denial used by the role policy
    pub fn unauthorized() -> Self {
        Self::new("unauthorized", "Not authorized")
    }

    /// Wrong username or password
    pub fn invalid_credentials() -> Self {
        Self::new("auth_invalid", "Username or password is invalid")
    }
}

/// Outcome of a policy check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyResult {
    Pass,
    Deny(ErrorData),
}

impl PolicyResult {
    pub fn is_pass(&self) -> bool {
        matches!(self, PolicyResult::Pass)
    }
}

/// Outcome of a credential or SSO verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Authenticated(User),
    Rejected(ErrorData),
}
