//! Node state
//!
//! The routing table of one gateway node. It is populated from outside
//! (the registry loader, an admin API) and only read on the request path.
//! Requests take an `Arc` snapshot at dispatch time, so a replacement never
//! changes the table under an in-flight request.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::http::{header, Request};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use zgate_core::Service;

use crate::backend::Backend;

/// Which sub-router a node serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeMode {
    /// Management interface only
    Management,
    /// Proxy only
    Proxy,
    /// Management on its own domain, proxy everywhere else
    ManagementProxy,
}

/// Web listener protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    #[default]
    Https,
}

impl Protocol {
    pub fn is_http(&self) -> bool {
        matches!(self, Protocol::Http)
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

/// Per-host configuration
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Policy target for this host
    pub service: Arc<Service>,
}

/// Snapshot of a node's routing table
#[derive(Clone)]
pub struct NodeState {
    pub mode: NodeMode,
    /// Web listener port; `None` means 443
    pub port: Option<u16>,
    pub protocol: Protocol,
    pub management_domain: String,
    pub hosts: HashMap<String, HostConfig>,
    /// Ordered backend handlers per host
    pub backends: HashMap<String, Vec<Arc<dyn Backend>>>,
}

impl NodeState {
    pub fn new(mode: NodeMode) -> Self {
        Self {
            mode,
            port: None,
            protocol: Protocol::default(),
            management_domain: String::new(),
            hosts: HashMap::new(),
            backends: HashMap::new(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_management_domain(mut self, domain: impl Into<String>) -> Self {
        self.management_domain = domain.into();
        self
    }

    /// Bind `domain` to `service` and its backend pool
    pub fn with_host(
        mut self,
        domain: impl Into<String>,
        service: Service,
        backends: Vec<Arc<dyn Backend>>,
    ) -> Self {
        let domain = domain.into();
        self.hosts.insert(
            domain.clone(),
            HostConfig {
                service: Arc::new(service),
            },
        );
        self.backends.insert(domain, backends);
        self
    }

    /// Port the web listener binds to
    pub fn web_port(&self) -> u16 {
        self.port.unwrap_or(443)
    }

    /// Every domain a certificate should cover
    pub fn domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = self.hosts.keys().cloned().collect();
        if !self.management_domain.is_empty() && !domains.contains(&self.management_domain) {
            domains.push(self.management_domain.clone());
        }
        domains.sort();
        domains
    }
}

impl fmt::Debug for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let backends: HashMap<&String, usize> =
            self.backends.iter().map(|(k, v)| (k, v.len())).collect();
        f.debug_struct("NodeState")
            .field("mode", &self.mode)
            .field("port", &self.port)
            .field("protocol", &self.protocol)
            .field("management_domain", &self.management_domain)
            .field("hosts", &self.hosts)
            .field("backends", &backends)
            .finish()
    }
}

/// Shared, replaceable node state plus the inbound request counter
#[derive(Debug)]
pub struct Node {
    state: RwLock<Arc<NodeState>>,
    requests: AtomicU64,
}

impl Node {
    pub fn new(state: NodeState) -> Self {
        Self {
            state: RwLock::new(Arc::new(state)),
            requests: AtomicU64::new(0),
        }
    }

    /// Current snapshot
    pub fn load(&self) -> Arc<NodeState> {
        Arc::clone(&self.state.read())
    }

    /// Swap in a new routing table
    pub fn replace(&self, state: NodeState) {
        *self.state.write() = Arc::new(state);
        tracing::info!("node: Routing table replaced");
    }

    pub fn add_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Inbound requests seen since start
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }
}

/// Strip an optional `:port` from a Host value
pub fn host_name(value: &str) -> &str {
    if let Some(rest) = value.strip_prefix('[') {
        // [v6]:port
        return match rest.find(']') {
            Some(end) => &value[..end + 2],
            None => value,
        };
    }
    match value.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => value,
    }
}

/// The request's routing key: the Host header without port, falling back
/// to the URI authority for HTTP/2
pub fn request_host<B>(req: &Request<B>) -> Option<&str> {
    req.headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| req.uri().authority().map(|a| a.as_str()))
        .map(host_name)
}
