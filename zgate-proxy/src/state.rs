//! Shared application state
//!
//! Every collaborator is injected here at construction. Nothing on the
//! request path reads a global.

use std::sync::Arc;

use zgate_core::memory::{
    MemoryApiKeyStore, MemoryCsrfStore, MemoryDatabase, MemorySessionStore,
    MemoryStateStore, MemoryUserStore,
};
use zgate_core::{
    ApiKeyStore, AuditLogger, Balancer, CsrfStore, Database, LocalAuthenticator, PolicyValidator,
    RolePolicy, SessionStore, SsoGateway, TracingAudit, UserStore,
};

use crate::config::ServerConfig;
use crate::events::{EventBroadcaster, WebSocketEvents};
use crate::node::{Node, NodeState};
use crate::tls::{CertificateGenerator, SelfSignedGenerator};

/// Collaborators and configuration shared by all requests
pub struct AppState {
    pub config: ServerConfig,
    pub node: Arc<Node>,
    pub database: Arc<dyn Database>,
    pub sessions: Arc<dyn SessionStore>,
    pub users: Arc<dyn UserStore>,
    pub api_keys: Arc<dyn ApiKeyStore>,
    pub local_auth: Arc<dyn LocalAuthenticator>,
    pub policy: Arc<dyn PolicyValidator>,
    pub csrf: Arc<dyn CsrfStore>,
    pub audit: Arc<dyn AuditLogger>,
    pub sso: Arc<SsoGateway>,
    pub balancer: Arc<Balancer>,
    pub events: Arc<dyn EventBroadcaster>,
    pub certificates: Arc<dyn CertificateGenerator>,
}

impl AppState {
    /// Is the session cookie marked `Secure`?
    pub fn secure_cookies(&self) -> bool {
        !self.node.load().protocol.is_http()
    }
}

/// The in-memory collaborator set, with concrete handles kept for seeding
/// and inspection
#[derive(Clone)]
pub struct MemoryStack {
    pub database: Arc<MemoryDatabase>,
    pub sessions: Arc<MemorySessionStore>,
    pub users: Arc<MemoryUserStore>,
    pub api_keys: Arc<MemoryApiKeyStore>,
    pub csrf: Arc<MemoryCsrfStore>,
    pub states: Arc<MemoryStateStore>,
}

impl MemoryStack {
    pub fn new() -> Self {
        let sessions = Arc::new(MemorySessionStore::new());
        Self {
            database: Arc::new(MemoryDatabase::new()),
            csrf: Arc::new(MemoryCsrfStore::bound_to(sessions.clone())),
            sessions,
            users: Arc::new(MemoryUserStore::new()),
            api_keys: Arc::new(MemoryApiKeyStore::new()),
            states: Arc::new(MemoryStateStore::new()),
        }
    }

    /// Build an [`AppState`] on this stack with the role policy, an
    /// entropy-seeded balancer, audit records on the log and no SSO
    /// providers
    pub fn into_state(self, config: ServerConfig, node: NodeState) -> AppState {
        let sso = SsoGateway::new(self.states.clone());
        AppState {
            config,
            node: Arc::new(Node::new(node)),
            database: self.database,
            sessions: self.sessions,
            users: self.users.clone(),
            api_keys: self.api_keys,
            local_auth: self.users,
            policy: Arc::new(RolePolicy::new()),
            csrf: self.csrf,
            audit: Arc::new(TracingAudit),
            sso: Arc::new(sso),
            balancer: Arc::new(Balancer::new()),
            events: Arc::new(WebSocketEvents::new()),
            certificates: Arc::new(SelfSignedGenerator),
        }
    }
}

impl Default for MemoryStack {
    fn default() -> Self {
        Self::new()
    }
}
