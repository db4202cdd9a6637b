//! ZGate Core - identity, policy and session primitives
//!
//! Everything the gateway needs to decide *who* a request belongs to and
//! *whether* it may pass, without any HTTP types:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        zgate-core                         │
//! │                                                           │
//! │  model ── User, Service, Session, ApiKey, PolicyResult    │
//! │  database ── DbHandle (scoped, released on drop)          │
//! │                                                           │
//! │  store ─── SessionStore  UserStore  ApiKeyStore           │
//! │            LocalAuthenticator                             │
//! │  policy ── PolicyValidator (RolePolicy)                   │
//! │  csrf ──── CsrfStore                                      │
//! │  audit ─── AuditLogger (TracingAudit)                     │
//! │  sso ───── SsoGateway: state tokens + callback signatures │
//! │  signature ── signed API requests                         │
//! │  balancer ─── seedable uniform backend choice             │
//! │                                                           │
//! │  memory ── in-memory implementation of every trait        │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The HTTP gate chain that drives these lives in `zgate-proxy`.

pub mod audit;
pub mod balancer;
pub mod csrf;
pub mod database;
pub mod error;
pub mod memory;
pub mod model;
pub mod policy;
pub mod signature;
pub mod sso;
pub mod store;

pub use audit::{AuditEvent, AuditKind, AuditLogger, TracingAudit};
pub use balancer::Balancer;
pub use csrf::CsrfStore;
pub use database::{Database, DbHandle};
pub use error::{ErrorCategory, GateError, Result};
pub use model::{
    ApiKey, ErrorData, LoginOutcome, PolicyResult, Service, Session, SessionOrigin, SessionScope,
    User,
};
pub use policy::{PolicyValidator, RolePolicy};
pub use signature::RequestSignature;
pub use sso::{CallbackParams, ProviderInfo, SsoGateway, SsoProvider, StateStore, StateToken};
pub use store::{ApiKeyStore, LocalAuthenticator, SessionStore, UserStore};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
