//! Per-route admission middleware in front of the shared `RateLimiter`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use taskgate_core::{Admission, LimitSpec, RateLimiter};

use crate::error::ApiError;

pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Budget for one operation. Each route gets its own gate and therefore its
/// own bucket per client.
#[derive(Clone)]
pub struct RateGate {
    limiter: Arc<RateLimiter>,
    operation: &'static str,
    spec: LimitSpec,
    trust_forwarded_for: bool,
}

impl RateGate {
    pub fn new(
        limiter: Arc<RateLimiter>,
        operation: &'static str,
        spec: LimitSpec,
        trust_forwarded_for: bool,
    ) -> Self {
        Self {
            limiter,
            operation,
            spec,
            trust_forwarded_for,
        }
    }
}

/// Who the request counts against: the first `X-Forwarded-For` hop when
/// trusted, else the peer address, else `"unknown"`.
pub fn client_identity<B>(req: &Request<B>, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = req
            .headers()
            .get(FORWARDED_FOR_HEADER)
            .and_then(|h| h.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty());
        if let Some(hop) = forwarded {
            return hop.to_string();
        }
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit(State(gate): State<RateGate>, req: Request<Body>, next: Next) -> Response {
    let client = client_identity(&req, gate.trust_forwarded_for);
    match gate.limiter.admit(&client, gate.operation, gate.spec) {
        Admission::Allowed { .. } => next.run(req).await,
        Admission::Denied { retry_after } => {
            tracing::info!(
                client = %client,
                operation = gate.operation,
                limit = %gate.spec,
                "rate limit exceeded"
            );
            ApiError::RateLimited { retry_after }.into_response()
        }
    }
}
