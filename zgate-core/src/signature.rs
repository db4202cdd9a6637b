//! Signed API requests
//!
//! API clients authenticate every request with four headers:
//!
//! ```text
//! Auth-Token:     <public key token>
//! Auth-Timestamp: <unix seconds>
//! Auth-Nonce:     <random, at least 16 chars, single use>
//! Auth-Signature: base64(HMAC-SHA256(secret, "token&timestamp&nonce&METHOD&path"))
//! ```

use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{GateError, Result};
use crate::model::ApiKey;

type HmacSha256 = Hmac<Sha256>;

/// Maximum clock skew between client and gateway, in seconds
pub const MAX_SKEW_SECS: i64 = 300;

/// Minimum nonce length
pub const MIN_NONCE_LEN: usize = 16;

pub const TOKEN_HEADER: &str = "Auth-Token";
pub const TIMESTAMP_HEADER: &str = "Auth-Timestamp";
pub const NONCE_HEADER: &str = "Auth-Nonce";
pub const SIGNATURE_HEADER: &str = "Auth-Signature";

/// The signature headers of one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSignature {
    pub token: String,
    pub timestamp: String,
    pub nonce: String,
    pub signature: String,
}

impl RequestSignature {
    /// Build the string covered by the signature
    pub fn canonical(&self, method: &str, path: &str) -> String {
        [
            self.token.as_str(),
            self.timestamp.as_str(),
            self.nonce.as_str(),
            method,
            path,
        ]
        .join("&")
    }

    /// Verify against `key` at time `now` (unix seconds)
    ///
    /// Nonce reuse is the caller's job; this only checks
    /// shape, freshness and the MAC.
    pub fn verify(&self, key: &ApiKey, method: &str, path: &str, now: i64) -> Result<()> {
        if self.token != key.token {
            return Err(GateError::authentication("token mismatch"));
        }

        if self.nonce.len() < MIN_NONCE_LEN {
            return Err(GateError::authentication("nonce too short"));
        }

        let timestamp: i64 = self
            .timestamp
            .parse()
            .map_err(|_| GateError::authentication("invalid timestamp"))?;
        if (now - timestamp).abs() > MAX_SKEW_SECS {
            return Err(GateError::authentication("timestamp outside allowed window"));
        }

        let provided = STANDARD
            .decode(self.signature.as_bytes())
            .map_err(|_| GateError::authentication("malformed signature"))?;

        let mut mac = HmacSha256::new_from_slice(key.secret.as_bytes())
            .map_err(|e| GateError::internal(format!("hmac key: {}", e)))?;
        mac.update(self.canonical(method, path).as_bytes());
        mac.verify_slice(&provided)
            .map_err(|_| GateError::authentication("signature mismatch"))
    }
}

/// Compute the signature a client would send
pub fn sign(
    secret: &str,
    token: &str,
    timestamp: &str,
    nonce: &str,
    method: &str,
    path: &str,
) -> Result<String> {
    let canonical = [token, timestamp, nonce, method, path].join("&");
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| GateError::internal(format!("hmac key: {}", e)))?;
    mac.update(canonical.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}
