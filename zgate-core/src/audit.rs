//! Audit events for login attempts

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::database::DbHandle;
use crate::error::Result;

/// Audited event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// Successful login
    Login,
    /// Rejected credentials or policy denial during login
    LoginFailed,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::Login => "login",
            AuditKind::LoginFailed => "login_failed",
        }
    }
}

/// One audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    /// Absent when the username did not resolve to a user
    pub user_id: Option<String>,
    pub kind: AuditKind,
    /// Free-form details such as `method` and `service_id`
    pub fields: Map<String, Value>,
    pub remote_addr: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(kind: AuditKind, user_id: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            kind,
            fields: Map::new(),
            remote_addr: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach a detail field
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn with_remote_addr(mut self, addr: Option<String>) -> Self {
        self.remote_addr = addr;
        self
    }
}

/// Audit sink
#[async_trait]
pub trait AuditLogger: Send + Sync {
    async fn record(&self, db: &DbHandle, event: AuditEvent) -> Result<()>;
}

/// Writes audit events to the `zgate_core::audit` tracing target
#[derive(Debug, Default, Clone)]
pub struct TracingAudit;

#[async_trait]
impl AuditLogger for TracingAudit {
    async fn record(&self, _db: &DbHandle, event: AuditEvent) -> Result<()> {
        let fields = serde_json::to_string(&event.fields)?;
        tracing::info!(
            target: "zgate_core::audit",
            event_id = %event.id,
            kind = event.kind.as_str(),
            user_id = event.user_id.as_deref().unwrap_or(""),
            remote_addr = event.remote_addr.as_deref().unwrap_or(""),
            fields = %fields,
            "audit: {}",
            event.kind.as_str()
        );
        Ok(())
    }
}
