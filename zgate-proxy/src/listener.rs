//! Listener manager
//!
//! Owns the web listener and the redirect listener and supervises their
//! restart.
//!
//! ```text
//!            init_servers            start_servers
//!  Stopped ───────────────▶ Starting ─────────────▶ Running
//!     ▲                                               │
//!     │            restart / listener error           │
//!     └──────────────── Restarting ◀──────────────────┘
//! ```
//!
//! One mutex guards the server handles and brackets each transition. It is
//! never held while waiting on a connection; [`ListenerManager::run`] waits
//! for a [`Generation`] to exit without it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use zgate_core::{GateError, Result};

use crate::config::{INIT_RETRY, SETTLE_INTERVAL, SHUTDOWN_TIMEOUT};
use crate::dispatch::Dispatcher;
use crate::redirect;
use crate::state::AppState;
use crate::tls;

/// Lifecycle of the listener pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Stopped,
    Starting,
    Running,
    Restarting,
}

/// Built, not yet listening
struct Prepared {
    web_app: Router,
    web_addr: SocketAddr,
    web_timeout: Duration,
    tls: Option<RustlsConfig>,
    redirect_app: Router,
    redirect_addr: SocketAddr,
    redirect_timeout: Duration,
}

struct Active {
    web: Handle,
    redirect: Handle,
}

#[derive(Default)]
struct Inner {
    prepared: Option<Prepared>,
    active: Option<Active>,
}

/// The two listener tasks of one start
pub struct Generation {
    web: JoinHandle<bool>,
    redirect: JoinHandle<bool>,
}

impl Generation {
    /// Wait until both listeners have exited. Returns true if either
    /// failed.
    pub async fn wait(self) -> bool {
        let web_failed = self.web.await.unwrap_or(true);
        let redirect_failed = self.redirect.await.unwrap_or(true);
        web_failed || redirect_failed
    }
}

pub struct ListenerManager {
    state: Arc<AppState>,
    dispatcher: Dispatcher,
    inner: Mutex<Inner>,
    status: watch::Sender<ListenerState>,
}

impl ListenerManager {
    pub fn new(state: Arc<AppState>, dispatcher: Dispatcher) -> Self {
        let (status, _) = watch::channel(ListenerState::Stopped);
        Self {
            state,
            dispatcher,
            inner: Mutex::new(Inner::default()),
            status,
        }
    }

    pub fn state(&self) -> ListenerState {
        *self.status.borrow()
    }

    /// Watch lifecycle transitions
    pub fn subscribe(&self) -> watch::Receiver<ListenerState> {
        self.status.subscribe()
    }

    fn set_state(&self, state: ListenerState) {
        self.status.send_replace(state);
    }

    /// Build both servers without listening. Over https the certificate
    /// pair is generated first if missing.
    pub async fn init_servers(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.set_state(ListenerState::Starting);

        let node = self.state.node.load();
        let config = &self.state.config;

        let tls = if node.protocol.is_http() {
            None
        } else {
            let generated = tls::ensure_certificate(
                self.state.certificates.as_ref(),
                &config.cert_path,
                &config.key_path,
                &node.domains(),
            )
            .await?;
            if generated {
                tracing::info!(cert = %config.cert_path.display(), "router: Certificate generated");
            }

            let rustls = RustlsConfig::from_pem_file(&config.cert_path, &config.key_path)
                .await
                .map_err(|e| GateError::certificate(format!("load: {}", e)))?;
            Some(rustls)
        };

        inner.prepared = Some(Prepared {
            web_app: self.dispatcher.clone().into_router(),
            web_addr: SocketAddr::new(config.bind_address, node.web_port()),
            web_timeout: config.web_timeout,
            tls,
            redirect_app: redirect::create_redirect_router(config.redirect_timeout),
            redirect_addr: SocketAddr::new(config.bind_address, config.redirect_port),
            redirect_timeout: config.redirect_timeout,
        });

        Ok(())
    }

    /// Start both listeners, then wait the settle interval for the binds
    ///
    /// `None` when [`init_servers`](Self::init_servers) has not prepared
    /// a pair.
    pub async fn start_servers(&self) -> Option<Generation> {
        let mut inner = self.inner.lock().await;
        let prepared = inner.prepared.take()?;

        let web_handle = Handle::new();
        let redirect_handle = Handle::new();

        tracing::info!(
            web = %prepared.web_addr,
            redirect = %prepared.redirect_addr,
            tls = prepared.tls.is_some(),
            "router: Starting servers"
        );

        let web = tokio::spawn(serve_web(
            prepared.web_app,
            prepared.web_addr,
            prepared.web_timeout,
            prepared.tls,
            web_handle.clone(),
            redirect_handle.clone(),
        ));
        let redirect = tokio::spawn(serve_redirect(
            prepared.redirect_app,
            prepared.redirect_addr,
            prepared.redirect_timeout,
            redirect_handle.clone(),
            web_handle.clone(),
        ));

        inner.active = Some(Active {
            web: web_handle,
            redirect: redirect_handle,
        });

        tokio::time::sleep(SETTLE_INTERVAL).await;
        self.set_state(ListenerState::Running);

        Some(Generation { web, redirect })
    }

    /// Stop both listeners
    ///
    /// Graceful shutdown bounded by [`SHUTDOWN_TIMEOUT`] per listener, then
    /// a forced close. Event streams are closed and the handles cleared.
    /// A no-op when nothing is running.
    pub async fn restart(&self) {
        let mut inner = self.inner.lock().await;
        let Some(active) = inner.active.take() else {
            tracing::debug!("router: Restart with no servers running");
            return;
        };

        self.set_state(ListenerState::Restarting);
        tracing::info!("router: Restarting servers");

        tokio::join!(shutdown(&active.web), shutdown(&active.redirect));
        self.state.events.close();
        inner.prepared = None;

        tokio::time::sleep(SETTLE_INTERVAL).await;
        self.set_state(ListenerState::Stopped);
    }

    /// Supervise forever: init, start, wait for both listeners to exit,
    /// repeat. Init failures retry after [`INIT_RETRY`].
    pub async fn run(&self) {
        loop {
            if let Err(e) = self.init_servers().await {
                tracing::error!(code = e.code(), error = %e, "router: Failed to init servers");
                self.set_state(ListenerState::Stopped);
                tokio::time::sleep(INIT_RETRY).await;
                continue;
            }

            let Some(generation) = self.start_servers().await else {
                tokio::time::sleep(INIT_RETRY).await;
                continue;
            };

            let failed = generation.wait().await;

            {
                let mut inner = self.inner.lock().await;
                inner.active = None;
                self.set_state(ListenerState::Stopped);
            }

            if failed {
                tokio::time::sleep(INIT_RETRY).await;
            }
        }
    }

    /// Address the web listener is bound to
    pub async fn web_addr(&self) -> Option<SocketAddr> {
        let handle = self.inner.lock().await.active.as_ref()?.web.clone();
        handle.listening().await
    }

    /// Address the redirect listener is bound to
    pub async fn redirect_addr(&self) -> Option<SocketAddr> {
        let handle = self.inner.lock().await.active.as_ref()?.redirect.clone();
        handle.listening().await
    }
}

async fn shutdown(handle: &Handle) {
    handle.graceful_shutdown(Some(SHUTDOWN_TIMEOUT));

    let deadline = Instant::now() + SHUTDOWN_TIMEOUT;
    while handle.connection_count() > 0 && Instant::now() < deadline {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    // already-closed servers ignore this
    handle.shutdown();
}

/// Log a listener exit. A failure takes the sibling down too, so the
/// supervising loop sees the whole generation exit.
fn finish(name: &str, addr: SocketAddr, result: std::io::Result<()>, sibling: &Handle) -> bool {
    match result {
        Ok(()) => {
            tracing::info!(listener = name, %addr, "router: Server closed");
            false
        }
        Err(e) => {
            tracing::error!(listener = name, %addr, error = %e, "router: Server failed");
            sibling.shutdown();
            true
        }
    }
}

/// Drop connections whose request head has not fully arrived in time
fn bound_head_reads(builder: &mut ConnBuilder<TokioExecutor>, timeout: Duration) {
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(timeout);
}

async fn serve_web(
    app: Router,
    addr: SocketAddr,
    timeout: Duration,
    tls: Option<RustlsConfig>,
    handle: Handle,
    sibling: Handle,
) -> bool {
    let service = app.into_make_service_with_connect_info::<SocketAddr>();
    let result = match tls {
        Some(config) => {
            let mut server = axum_server::bind_rustls(addr, config).handle(handle);
            bound_head_reads(server.http_builder(), timeout);
            server.serve(service).await
        }
        None => {
            let mut server = axum_server::bind(addr).handle(handle);
            bound_head_reads(server.http_builder(), timeout);
            server.serve(service).await
        }
    };
    finish("web", addr, result, &sibling)
}

async fn serve_redirect(
    app: Router,
    addr: SocketAddr,
    timeout: Duration,
    handle: Handle,
    sibling: Handle,
) -> bool {
    let mut server = axum_server::bind(addr).handle(handle);
    bound_head_reads(server.http_builder(), timeout);
    let result = server.serve(app.into_make_service()).await;
    finish("redirect", addr, result, &sibling)
}
