//! Backend handlers
//!
//! A [`Backend`] receives an authorized request and produces the upstream
//! response. [`HttpBackend`] streams both directions through `reqwest`
//! without buffering bodies.

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use url::Url;
use zgate_core::{GateError, Result};

/// One upstream target of a host's pool
#[async_trait]
pub trait Backend: Send + Sync {
    /// Address for logging
    fn address(&self) -> &str;

    /// Forward `req` and return the upstream response
    ///
    /// Upstream failures are answered here (502); this never errors.
    async fn forward(&self, req: Request) -> Response;
}

const HOP_BY_HOP: [HeaderName; 6] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
];

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}

/// Forwards to an HTTP(S) origin
#[derive(Debug, Clone)]
pub struct HttpBackend {
    base: Url,
    address: String,
    client: reqwest::Client,
}

impl HttpBackend {
    /// Backend for `base`, e.g. `http://10.0.0.5:8080`
    pub fn new(base: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| GateError::internal(format!("http client: {}", e)))?;
        Self::with_client(base, client)
    }

    pub fn with_client(base: &str, client: reqwest::Client) -> Result<Self> {
        let base = Url::parse(base)
            .map_err(|e| GateError::internal(format!("backend url '{}': {}", base, e)))?;
        Ok(Self {
            address: base.to_string(),
            base,
            client,
        })
    }

    fn target(&self, req: &Request) -> Result<Url> {
        let path_and_query = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        self.base
            .join(path_and_query)
            .map_err(|e| GateError::internal(format!("backend target: {}", e)))
    }
}

#[async_trait]
impl Backend for HttpBackend {
    fn address(&self) -> &str {
        &self.address
    }

    async fn forward(&self, req: Request) -> Response {
        let target = match self.target(&req) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(backend = %self.address, error = %e, "router: Invalid backend target");
                return StatusCode::BAD_GATEWAY.into_response();
            }
        };

        let (parts, body) = req.into_parts();
        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);

        let upstream = self
            .client
            .request(parts.method, target)
            .headers(headers)
            .body(reqwest::Body::wrap_stream(body.into_data_stream()))
            .send()
            .await;

        match upstream {
            Ok(resp) => {
                let status = resp.status();
                let mut headers = resp.headers().clone();
                strip_hop_by_hop(&mut headers);

                let mut response = Body::from_stream(resp.bytes_stream()).into_response();
                *response.status_mut() = status;
                *response.headers_mut() = headers;
                response
            }
            Err(e) => {
                tracing::warn!(backend = %self.address, error = %e, "router: Backend request failed");
                (StatusCode::BAD_GATEWAY, "Bad gateway").into_response()
            }
        }
    }
}
