//! Tracing setup and the per-request "Incoming Request" event.

use std::collections::BTreeMap;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;
use crate::limit::client_identity;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

const SENSITIVE_HEADERS: [&str; 2] = ["authorization", "x-api-key"];

pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
    }
}

/// Header map with credentials replaced by `REDACTED`.
pub fn redacted_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            let shown = if SENSITIVE_HEADERS.contains(&name.as_str()) {
                "REDACTED".to_string()
            } else {
                String::from_utf8_lossy(value.as_bytes()).into_owned()
            };
            (name.as_str().to_string(), shown)
        })
        .collect()
}

/// `(client_name, request_name)` from the path: version segments are
/// ignored, the first two remaining segments name the client and request.
pub fn path_names(path: &str) -> (String, String) {
    let segments: Vec<&str> = path
        .trim_matches('/')
        .split('/')
        .filter(|s| *s != "v1")
        .collect();
    match segments.as_slice() {
        [] => (String::new(), "base".to_string()),
        [only] => (String::new(), only.to_string()),
        [client, request, ..] => (client.to_string(), request.to_string()),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RequestLog {
    pub trust_forwarded_for: bool,
}

pub async fn log_request(
    State(config): State<RequestLog>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let (client_name, request_name) = path_names(req.uri().path());
    tracing::info!(
        request_id = %request_id,
        requester_ip = %client_identity(&req, config.trust_forwarded_for),
        method = %req.method(),
        path = %req.uri().path(),
        headers = ?redacted_headers(req.headers()),
        client_name = %client_name,
        request_name = %request_name,
        "Incoming Request"
    );

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}
