//! Server configuration

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

/// Largest accepted request body, in bytes
pub const BODY_LIMIT: usize = 1_000_000;

/// Largest accepted header block, in bytes
pub const MAX_HEADER_BYTES: usize = 4096;

/// Default request and header-read bound on the web listener
pub const WEB_TIMEOUT: Duration = Duration::from_secs(10);

/// Default request and header-read bound on the redirect listener
pub const REDIRECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Graceful shutdown bound per listener
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Wait after starting or stopping listeners for the OS to bind or
/// release the sockets
pub const SETTLE_INTERVAL: Duration = Duration::from_millis(250);

/// Delay between failed listener initializations
pub const INIT_RETRY: Duration = Duration::from_secs(1);

const DEFAULT_REDIRECT_PORT: u16 = 80;
const DEFAULT_CERT_PATH: &str = "/var/lib/zgate/server.crt";
const DEFAULT_KEY_PATH: &str = "/var/lib/zgate/server.key";

/// Process-level server configuration
///
/// Routing (mode, web port, protocol, hosts) lives in
/// [`NodeState`](crate::node::NodeState); this only covers how the process
/// itself runs.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address both listeners bind to
    pub bind_address: IpAddr,
    /// Plain HTTP redirect listener port
    pub redirect_port: u16,
    /// PEM certificate for the web listener
    pub cert_path: PathBuf,
    /// PEM private key for the web listener
    pub key_path: PathBuf,
    /// Production mode disables request logging
    pub production: bool,
    /// Demo mode lists a synthetic SSO provider
    pub demo: bool,
    /// Bound on reading a request head and on answering it, web listener
    pub web_timeout: Duration,
    /// Same bound for the redirect listener
    pub redirect_timeout: Duration,
}

impl ServerConfig {
    /// Create a new configuration builder
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Read configuration from `ZGATE_*` environment variables
    ///
    /// Unset or unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        let mut builder = Self::builder();

        if let Some(addr) = env_parse::<IpAddr>("ZGATE_BIND") {
            builder = builder.bind_address(addr);
        }
        if let Some(port) = env_parse::<u16>("ZGATE_REDIRECT_PORT") {
            builder = builder.redirect_port(port);
        }
        if let Ok(path) = std::env::var("ZGATE_CERT_PATH") {
            builder = builder.cert_path(path);
        }
        if let Ok(path) = std::env::var("ZGATE_KEY_PATH") {
            builder = builder.key_path(path);
        }
        if let Some(flag) = env_flag("ZGATE_PRODUCTION") {
            builder = builder.production(flag);
        }
        if let Some(flag) = env_flag("ZGATE_DEMO") {
            builder = builder.demo(flag);
        }

        builder.build()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn env_flag(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Builder for ServerConfig
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    bind_address: Option<IpAddr>,
    redirect_port: Option<u16>,
    cert_path: Option<PathBuf>,
    key_path: Option<PathBuf>,
    production: Option<bool>,
    demo: Option<bool>,
    web_timeout: Option<Duration>,
    redirect_timeout: Option<Duration>,
}

impl ServerConfigBuilder {
    /// Set the bind address
    pub fn bind_address(mut self, addr: IpAddr) -> Self {
        self.bind_address = Some(addr);
        self
    }

    /// Set the redirect listener port (0 picks an ephemeral port)
    pub fn redirect_port(mut self, port: u16) -> Self {
        self.redirect_port = Some(port);
        self
    }

    pub fn cert_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cert_path = Some(path.into());
        self
    }

    pub fn key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_path = Some(path.into());
        self
    }

    pub fn production(mut self, production: bool) -> Self {
        self.production = Some(production);
        self
    }

    pub fn demo(mut self, demo: bool) -> Self {
        self.demo = Some(demo);
        self
    }

    pub fn web_timeout(mut self, timeout: Duration) -> Self {
        self.web_timeout = Some(timeout);
        self
    }

    pub fn redirect_timeout(mut self, timeout: Duration) -> Self {
        self.redirect_timeout = Some(timeout);
        self
    }

    /// Build the configuration
    pub fn build(self) -> ServerConfig {
        ServerConfig {
            bind_address: self
                .bind_address
                .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            redirect_port: self.redirect_port.unwrap_or(DEFAULT_REDIRECT_PORT),
            cert_path: self
                .cert_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CERT_PATH)),
            key_path: self
                .key_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_KEY_PATH)),
            production: self.production.unwrap_or(false),
            demo: self.demo.unwrap_or(false),
            web_timeout: self.web_timeout.unwrap_or(WEB_TIMEOUT),
            redirect_timeout: self.redirect_timeout.unwrap_or(REDIRECT_TIMEOUT),
        }
    }
}
