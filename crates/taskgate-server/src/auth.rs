//! API key gate for the protected task routes.
//!
//! The key travels in `X-API-Key`. A request without one is always
//! rejected; what counts as a *valid* key depends on the configured
//! `CredentialVerifier`.

use std::collections::HashSet;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::config::{AuthMode, ServerConfig};
use crate::error::ApiError;

pub const API_KEY_HEADER: &str = "x-api-key";

pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, key: &str) -> bool;
}

/// Accepts every non-empty key.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysAllow;

impl CredentialVerifier for AlwaysAllow {
    fn verify(&self, _key: &str) -> bool {
        true
    }
}

/// Accepts only keys from a fixed set.
#[derive(Debug, Clone)]
pub struct KeyLookup {
    keys: HashSet<String>,
}

impl KeyLookup {
    pub fn new(keys: impl IntoIterator<Item = String>) -> Self {
        Self {
            keys: keys.into_iter().filter(|k| !k.is_empty()).collect(),
        }
    }
}

impl CredentialVerifier for KeyLookup {
    fn verify(&self, key: &str) -> bool {
        // every candidate is compared so timing does not depend on which key matched
        self.keys
            .iter()
            .fold(false, |found, candidate| constant_time_eq(key, candidate) | found)
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}

pub fn verifier_from_config(config: &ServerConfig) -> Arc<dyn CredentialVerifier> {
    match config.auth_mode {
        AuthMode::AlwaysAllow => Arc::new(AlwaysAllow),
        AuthMode::KeyLookup => Arc::new(KeyLookup::new(config.api_keys.iter().cloned())),
    }
}

pub async fn require_api_key(
    State(verifier): State<Arc<dyn CredentialVerifier>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let key = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .unwrap_or("");

    if key.is_empty() || !verifier.verify(key) {
        tracing::warn!(path = %req.uri().path(), "rejected request: invalid or missing API key");
        return ApiError::Unauthorized.into_response();
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_lookup_matches_exact_keys_only() {
        let verifier = KeyLookup::new(["alpha".to_string(), String::new()]);
        assert!(verifier.verify("alpha"));
        assert!(!verifier.verify("alph"));
        assert!(!verifier.verify("alphaa"));
        assert!(!verifier.verify(""));
    }

    #[test]
    fn always_allow_accepts_anything() {
        assert!(AlwaysAllow.verify("whatever"));
    }

    #[test]
    fn constant_time_eq_basics() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "ab"));
    }
}
