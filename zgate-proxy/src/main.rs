//! ZGate binary
//!
//! Runs one gateway node on the in-memory collaborator stack.
//!
//! ## Usage
//!
//! ```bash
//! # Routing table and local accounts from a registry file
//! ZGATE_REGISTRY=/etc/zgate/registry.json zgate
//!
//! # Local testing without root: plain http, high ports
//! ZGATE_REGISTRY=./registry.json ZGATE_REDIRECT_PORT=8080 zgate
//! ```
//!
//! On unix, SIGHUP reloads the registry and restarts the listeners.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zgate_proxy::{
    Dispatcher, ListenerManager, MemoryStack, NodeMode, NodeState, Registry, ServerConfig,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn load_node(stack: &MemoryStack) -> Result<NodeState, BoxError> {
    match std::env::var("ZGATE_REGISTRY") {
        Ok(path) => {
            let registry = Registry::load(&path)?;
            registry.seed(stack);
            Ok(registry.node_state()?)
        }
        Err(_) => {
            tracing::warn!("node: ZGATE_REGISTRY not set, serving an empty proxy node");
            Ok(NodeState::new(NodeMode::Proxy))
        }
    }
}

#[cfg(unix)]
async fn reload_on_hangup(manager: Arc<ListenerManager>, stack: MemoryStack, state: Arc<zgate_proxy::AppState>) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            tracing::warn!(error = %e, "node: SIGHUP handler unavailable");
            return;
        }
    };

    while hangup.recv().await.is_some() {
        match load_node(&stack) {
            Ok(node) => {
                state.node.replace(node);
                manager.restart().await;
            }
            Err(e) => tracing::error!(error = %e, "node: Registry reload failed"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "zgate_proxy=info,zgate_core=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();
    let stack = MemoryStack::new();
    let node = load_node(&stack)?;

    tracing::info!(
        "Starting ZGate v{} ({:?} mode, {} hosts)",
        env!("CARGO_PKG_VERSION"),
        node.mode,
        node.hosts.len()
    );

    let state = Arc::new(stack.clone().into_state(config, node));
    let manager = Arc::new(ListenerManager::new(
        Arc::clone(&state),
        Dispatcher::new(Arc::clone(&state)),
    ));

    #[cfg(unix)]
    tokio::spawn(reload_on_hangup(Arc::clone(&manager), stack, Arc::clone(&state)));

    tokio::select! {
        _ = manager.run() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("node: Shutting down");
            manager.restart().await;
        }
    }

    Ok(())
}
