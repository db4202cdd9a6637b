//! ZGate Proxy - request-gating reverse proxy
//!
//! Decides, before any byte of backend traffic flows, whether the caller
//! holds a valid identity that passes policy for the target host. Callers
//! without one are served the host's public login surface instead.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      ListenerManager                          │
//! │   redirect listener :80  (301 → https)                        │
//! │   web listener :443 ──▶ Recovery ▶ Limiter ▶ Counter          │
//! │                              │                                │
//! │                         Dispatcher                            │
//! │            ┌─────────────────┴──────────────────┐             │
//! │     management sub-router              proxy dispatch         │
//! │   Session ▶ Auth ▶ CsrfToken     session ▶ user ▶ policy      │
//! │                                     │ ok            │ no       │
//! │                                  Balancer   public sub-router  │
//! │                                     │        (SessionProxy,    │
//! │                                  Backend      login flows)     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Identity stores, policy and audit are `zgate-core` traits injected
//! through [`AppState`].

pub mod authorizer;
pub mod backend;
pub mod config;
pub mod context;
pub mod cookie;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod listener;
pub mod middleware;
pub mod node;
pub mod redirect;
pub mod registry;
pub mod routes;
pub mod state;
pub mod tls;

pub use authorizer::Authorizer;
pub use backend::{Backend, HttpBackend};
pub use config::{ServerConfig, ServerConfigBuilder};
pub use context::{BoundService, RequestContext};
pub use dispatch::Dispatcher;
pub use error::ApiError;
pub use listener::{ListenerManager, ListenerState};
pub use node::{HostConfig, Node, NodeMode, NodeState, Protocol};
pub use registry::Registry;
pub use state::{AppState, MemoryStack};
