//! Registry file loader
//!
//! Standalone nodes read their routing table and local accounts from one
//! JSON file:
//!
//! ```json
//! {
//!   "mode": "management_proxy",
//!   "protocol": "https",
//!   "management_domain": "admin.example.com",
//!   "services": [{"id": "wiki", "name": "Wiki", "roles": ["eng"]}],
//!   "hosts": [
//!     {"domain": "wiki.example.com", "service": "wiki",
//!      "backends": ["http://10.0.0.5:8080", "http://10.0.0.6:8080"]}
//!   ],
//!   "users": [
//!     {"id": "u1", "username": "alice", "password": "...", "roles": ["eng"]}
//!   ]
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use zgate_core::{ApiKey, GateError, Result, Service, User};

use crate::backend::{Backend, HttpBackend};
use crate::node::{NodeMode, NodeState, Protocol};
use crate::state::MemoryStack;

fn default_mode() -> NodeMode {
    NodeMode::Proxy
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostEntry {
    pub domain: String,
    /// Service ID
    pub service: String,
    #[serde(default)]
    pub backends: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserEntry {
    #[serde(flatten)]
    pub user: User,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Registry {
    #[serde(default = "default_mode")]
    pub mode: NodeMode,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default)]
    pub management_domain: String,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub hosts: Vec<HostEntry>,
    #[serde(default)]
    pub users: Vec<UserEntry>,
    #[serde(default)]
    pub api_keys: Vec<ApiKey>,
}

impl Registry {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)?;
        let registry = Self::parse(&data)?;
        tracing::info!(
            path = %path.display(),
            hosts = registry.hosts.len(),
            users = registry.users.len(),
            "node: Registry loaded"
        );
        Ok(registry)
    }

    pub fn parse(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Build the routing table
    ///
    /// Fails if a host names an unknown service or a backend URL does not
    /// parse.
    pub fn node_state(&self) -> Result<NodeState> {
        let services: HashMap<&str, &Service> =
            self.services.iter().map(|s| (s.id.as_str(), s)).collect();

        let mut state = NodeState::new(self.mode)
            .with_protocol(self.protocol)
            .with_management_domain(self.management_domain.clone());
        state.port = self.port;

        for host in &self.hosts {
            let service = services.get(host.service.as_str()).ok_or_else(|| {
                GateError::not_found(format!("service '{}' for host '{}'", host.service, host.domain))
            })?;

            let backends = host
                .backends
                .iter()
                .map(|url| HttpBackend::new(url).map(|b| Arc::new(b) as Arc<dyn Backend>))
                .collect::<Result<Vec<_>>>()?;

            state = state.with_host(host.domain.clone(), (*service).clone(), backends);
        }

        Ok(state)
    }

    /// Load accounts and API keys into the in-memory stores
    pub fn seed(&self, stack: &MemoryStack) {
        for entry in &self.users {
            stack.users.add_user(entry.user.clone(), &entry.password);
        }
        for key in &self.api_keys {
            stack.api_keys.add_key(key.clone());
        }
    }
}
