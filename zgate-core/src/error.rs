//! Error types for gateway operations
//!
//! The gateway distinguishes errors by how they must be surfaced, not by
//! which subsystem produced them:
//!
//! - **Authentication** errors are public-safe and become a 401.
//! - **NotFound** errors name a missing record (a CSRF token, an SSO
//!   provider). Callers decide the status; the CSRF gate maps it to 401.
//! - **InvalidState** is reserved for expired or tampered SSO callbacks and
//!   is never shown to the client; handlers turn it into a silent redirect.
//! - Everything else is an infrastructure fault: logged with full context,
//!   answered with a bare 500.
//!
//! Policy denials are *not* errors. They travel as
//! [`PolicyResult::Deny`](crate::model::PolicyResult) so callers can render
//! them as a structured 401 payload.
//!
//! # Example
//!
//! ```rust
//! use zgate_core::error::{ErrorCategory, GateError};
//!
//! let err = GateError::authentication("signature mismatch");
//! assert_eq!(err.category(), ErrorCategory::Authentication);
//! assert_eq!(err.http_status_code(), 401);
//! assert_eq!(err.code(), "AUTHENTICATION_FAILED");
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GateError>;

/// Error category for grouping related errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Caller could not be authenticated (401)
    Authentication,
    /// A referenced record does not exist (404 unless remapped)
    NotFound,
    /// Callback state expired or was tampered with (redirect)
    InvalidState,
    /// Database, listener, filesystem or certificate failure (500)
    Infrastructure,
    /// Bug or unexpected condition (500)
    Internal,
}

/// Errors that can occur while gating a request
#[derive(Error, Debug)]
pub enum GateError {
    // ═══════════════════════════════════════════════════════════════════════
    // Caller-facing errors
    // ═══════════════════════════════════════════════════════════════════════

    /// Credentials or request signature could not be verified
    #[error("Authentication failed: {reason}")]
    Authentication { reason: String },

    /// A record required by the operation does not exist
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// SSO callback state is unknown, expired or its signature is wrong
    #[error("Invalid callback state: {reason}")]
    InvalidState { reason: String },

    // ═══════════════════════════════════════════════════════════════════════
    // Infrastructure errors
    // ═══════════════════════════════════════════════════════════════════════

    /// Backing store failed
    #[error("Database error: {reason}")]
    Database { reason: String },

    /// Web or redirect listener could not be built or bound
    #[error("Listener error: {reason}")]
    Listener { reason: String },

    /// TLS certificate or key could not be checked, generated or loaded
    #[error("Certificate error: {reason}")]
    Certificate { reason: String },

    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization or deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error that shouldn't happen
    #[error("Internal error: {reason}. This is a bug; please report it.")]
    Internal { reason: String },
}

impl GateError {
    /// Build an authentication failure
    pub fn authentication(reason: impl Into<String>) -> Self {
        GateError::Authentication {
            reason: reason.into(),
        }
    }

    /// Build a not-found error
    pub fn not_found(resource: impl Into<String>) -> Self {
        GateError::NotFound {
            resource: resource.into(),
        }
    }

    /// Build an invalid callback state error
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        GateError::InvalidState {
            reason: reason.into(),
        }
    }

    /// Build a database error
    pub fn database(reason: impl Into<String>) -> Self {
        GateError::Database {
            reason: reason.into(),
        }
    }

    /// Build a listener error
    pub fn listener(reason: impl Into<String>) -> Self {
        GateError::Listener {
            reason: reason.into(),
        }
    }

    /// Build a certificate error
    pub fn certificate(reason: impl Into<String>) -> Self {
        GateError::Certificate {
            reason: reason.into(),
        }
    }

    /// Build an internal error
    pub fn internal(reason: impl Into<String>) -> Self {
        GateError::Internal {
            reason: reason.into(),
        }
    }

    /// Returns true for authentication failures
    pub fn is_authentication(&self) -> bool {
        matches!(self, GateError::Authentication { .. })
    }

    /// Returns true when a referenced record is missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, GateError::NotFound { .. })
    }

    /// Returns true for expired or tampered SSO state
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, GateError::InvalidState { .. })
    }

    /// Get the stable error code for this error
    pub fn code(&self) -> &'static str {
        match self {
            GateError::Authentication { .. } => "AUTHENTICATION_FAILED",
            GateError::NotFound { .. } => "NOT_FOUND",
            GateError::InvalidState { .. } => "INVALID_STATE",
            GateError::Database { .. } => "DATABASE_ERROR",
            GateError::Listener { .. } => "LISTENER_ERROR",
            GateError::Certificate { .. } => "CERTIFICATE_ERROR",
            GateError::Io(_) => "IO_ERROR",
            GateError::Json(_) => "JSON_ERROR",
            GateError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Get the category of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            GateError::Authentication { .. } => ErrorCategory::Authentication,
            GateError::NotFound { .. } => ErrorCategory::NotFound,
            GateError::InvalidState { .. } => ErrorCategory::InvalidState,
            GateError::Database { .. }
            | GateError::Listener { .. }
            | GateError::Certificate { .. }
            | GateError::Io(_)
            | GateError::Json(_) => ErrorCategory::Infrastructure,
            GateError::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Get the default HTTP status code for this error
    pub fn http_status_code(&self) -> u16 {
        match self.category() {
            ErrorCategory::Authentication => 401,
            ErrorCategory::NotFound => 404,
            ErrorCategory::InvalidState => 400,
            ErrorCategory::Infrastructure | ErrorCategory::Internal => 500,
        }
    }
}
