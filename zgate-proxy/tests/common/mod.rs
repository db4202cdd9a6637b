//! Shared fixtures for the gateway integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tower::ServiceExt;
use zgate_core::memory::{MemoryAudit, MemorySessionStore};
use zgate_core::{
    ApiKey, Balancer, Database, DbHandle, GateError, Result, Service, Session, SessionOrigin,
    SessionScope, SessionStore, User,
};
use zgate_proxy::{
    AppState, Backend, Dispatcher, MemoryStack, NodeMode, NodeState, Protocol, ServerConfig,
};

pub const HOST: &str = "a.example.com";
pub const EMPTY_HOST: &str = "empty.example.com";
pub const ADMIN_HOST: &str = "admin.example.com";

pub const ALICE_PASSWORD: &str = "alice-password";
pub const BOB_PASSWORD: &str = "bob-password";

/// Answers with its own name and counts what it receives
pub struct RecordingBackend {
    name: String,
    hits: AtomicUsize,
}

impl RecordingBackend {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            hits: AtomicUsize::new(0),
        }
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Backend for RecordingBackend {
    fn address(&self) -> &str {
        &self.name
    }

    async fn forward(&self, req: Request) -> Response {
        self.hits.fetch_add(1, Ordering::Relaxed);
        let path = req.uri().path().to_string();
        match axum::body::to_bytes(req.into_body(), usize::MAX).await {
            Ok(body) => (StatusCode::OK, format!("{} {} {}", self.name, path, body.len()))
                .into_response(),
            Err(_) => StatusCode::PAYLOAD_TOO_LARGE.into_response(),
        }
    }
}

/// Session store whose `remove_all` always fails
pub struct BrokenRemoveAll(pub Arc<MemorySessionStore>);

#[async_trait]
impl SessionStore for BrokenRemoveAll {
    async fn get(&self, db: &DbHandle, session_id: &str) -> Result<Option<Session>> {
        self.0.get(db, session_id).await
    }

    async fn create(
        &self,
        db: &DbHandle,
        user_id: &str,
        scope: SessionScope,
        origin: SessionOrigin,
    ) -> Result<Session> {
        self.0.create(db, user_id, scope, origin).await
    }

    async fn remove(&self, db: &DbHandle, session_id: &str) -> Result<()> {
        self.0.remove(db, session_id).await
    }

    async fn remove_all(&self, _db: &DbHandle, _user_id: &str) -> Result<()> {
        Err(GateError::database("session table locked"))
    }
}

/// Session store that cannot be read
pub struct UnavailableSessions;

#[async_trait]
impl SessionStore for UnavailableSessions {
    async fn get(&self, _db: &DbHandle, _session_id: &str) -> Result<Option<Session>> {
        Err(GateError::database("connection refused"))
    }

    async fn create(
        &self,
        _db: &DbHandle,
        _user_id: &str,
        _scope: SessionScope,
        _origin: SessionOrigin,
    ) -> Result<Session> {
        Err(GateError::database("connection refused"))
    }

    async fn remove(&self, _db: &DbHandle, _session_id: &str) -> Result<()> {
        Err(GateError::database("connection refused"))
    }

    async fn remove_all(&self, _db: &DbHandle, _user_id: &str) -> Result<()> {
        Err(GateError::database("connection refused"))
    }
}

pub fn wiki() -> Service {
    Service::new("wiki", "Wiki").with_roles(&["eng"])
}

/// alice: eng, administrator. bob: sales only.
pub fn seed_users(stack: &MemoryStack) {
    stack.users.add_user(
        User::new("u1", "alice")
            .with_roles(&["eng"])
            .with_administrator(true),
        ALICE_PASSWORD,
    );
    stack
        .users
        .add_user(User::new("u2", "bob").with_roles(&["sales"]), BOB_PASSWORD);
}

pub struct Harness {
    pub stack: MemoryStack,
    pub audit: Arc<MemoryAudit>,
    pub state: Arc<AppState>,
    pub backends: Vec<Arc<RecordingBackend>>,
    pub app: Router,
}

pub struct HarnessBuilder {
    mode: NodeMode,
    config: ServerConfig,
    seed: u64,
    extra: Router<Arc<AppState>>,
    customize: Option<Box<dyn FnOnce(&mut AppState, &MemoryStack)>>,
}

impl HarnessBuilder {
    pub fn mode(mut self, mode: NodeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn management_routes(mut self, extra: Router<Arc<AppState>>) -> Self {
        self.extra = extra;
        self
    }

    pub fn customize(mut self, f: impl FnOnce(&mut AppState, &MemoryStack) + 'static) -> Self {
        self.customize = Some(Box::new(f));
        self
    }

    pub fn build(self) -> Harness {
        let stack = MemoryStack::new();
        seed_users(&stack);

        let backends: Vec<Arc<RecordingBackend>> = (0..2)
            .map(|i| Arc::new(RecordingBackend::new(&format!("backend-{}", i))))
            .collect();
        let pool: Vec<Arc<dyn Backend>> = backends
            .iter()
            .map(|b| Arc::clone(b) as Arc<dyn Backend>)
            .collect();

        let node = NodeState::new(self.mode)
            .with_protocol(Protocol::Http)
            .with_management_domain(ADMIN_HOST)
            .with_host(HOST, wiki(), pool)
            .with_host(EMPTY_HOST, Service::new("empty", "Empty"), Vec::new());

        let audit = Arc::new(MemoryAudit::new());
        let mut state = stack.clone().into_state(self.config, node);
        state.balancer = Arc::new(Balancer::seeded(self.seed));
        state.audit = audit.clone();
        if let Some(customize) = self.customize {
            customize(&mut state, &stack);
        }

        let state = Arc::new(state);
        let app = Dispatcher::with_management_routes(Arc::clone(&state), self.extra).into_router();

        Harness {
            stack,
            audit,
            state,
            backends,
            app,
        }
    }
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            mode: NodeMode::Proxy,
            config: ServerConfig::builder().production(true).build(),
            seed: 7,
            extra: Router::new(),
            customize: None,
        }
    }

    pub fn proxy() -> Self {
        Self::builder().build()
    }

    pub fn management() -> Self {
        Self::builder().mode(NodeMode::Management).build()
    }

    pub async fn send(&self, req: Request) -> Response {
        self.app.clone().oneshot(req).await.unwrap()
    }

    pub fn db(&self) -> DbHandle {
        let database: Arc<dyn Database> = self.stack.database.clone();
        DbHandle::acquire(&database)
    }

    pub async fn session(&self, user_id: &str, scope: SessionScope) -> String {
        self.stack
            .sessions
            .create(&self.db(), user_id, scope, SessionOrigin::default())
            .await
            .unwrap()
            .id
    }

    pub async fn proxy_session(&self, user_id: &str) -> String {
        self.session(user_id, SessionScope::Service("wiki".to_string()))
            .await
    }

    pub async fn management_session(&self, user_id: &str) -> String {
        self.session(user_id, SessionScope::Management).await
    }

    pub async fn csrf_token(&self, session_id: &str) -> String {
        use zgate_core::CsrfStore;
        self.stack.csrf.new_token(&self.db(), session_id).await.unwrap()
    }

    pub fn api_key(&self, user_id: &str) -> ApiKey {
        let key = ApiKey {
            id: format!("key-{}", user_id),
            token: format!("token-{}", user_id),
            secret: format!("secret-{}", user_id),
            user_id: user_id.to_string(),
        };
        self.stack.api_keys.add_key(key.clone());
        key
    }

    pub fn hits(&self) -> Vec<usize> {
        self.backends.iter().map(|b| b.hits()).collect()
    }

    pub fn total_hits(&self) -> usize {
        self.hits().iter().sum()
    }
}

pub fn get(host: &str, path: &str) -> axum::http::request::Builder {
    Request::builder()
        .method("GET")
        .uri(path)
        .header(header::HOST, host)
}

pub fn with_cookie(
    builder: axum::http::request::Builder,
    name: &str,
    value: &str,
) -> axum::http::request::Builder {
    builder.header(header::COOKIE, format!("{}={}", name, value))
}

pub fn empty(builder: axum::http::request::Builder) -> Request {
    builder.body(Body::empty()).unwrap()
}

pub async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

pub fn set_cookies(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|v| v.to_string())
        .collect()
}

/// The `Set-Cookie` value for `name`, if the response sets or clears it
pub fn cookie_for(headers: &HeaderMap, name: &str) -> Option<String> {
    set_cookies(headers)
        .into_iter()
        .find(|v| v.starts_with(&format!("{}=", name)))
}

/// Does this `Set-Cookie` value clear the cookie?
pub fn is_removal(set_cookie: &str) -> bool {
    set_cookie
        .split(';')
        .next()
        .and_then(|pair| pair.split_once('='))
        .map(|(_, value)| value.trim().is_empty())
        .unwrap_or(false)
}

/// The cookie value carried by a `Set-Cookie` header
pub fn cookie_value(set_cookie: &str) -> String {
    set_cookie
        .split(';')
        .next()
        .and_then(|pair| pair.split_once('='))
        .map(|(_, value)| value.to_string())
        .unwrap_or_default()
}
