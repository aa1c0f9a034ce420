//! HTTP routes.
//!
//! Middleware order on a protected route is rate gate, then API key gate,
//! then the handler, so a client over budget gets 429 before its key is
//! even looked at.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::{Method, Request, StatusCode, Uri, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use taskgate_core::{
    App, CoreError, Job, LimitSpec, PendingEntry, SubmitOptions, TaskId, TaskType, TaskView,
};
use taskgate_core::typed::encode_job;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{CredentialVerifier, require_api_key};
use crate::error::{ApiError, Enveloped, panic_response};
use crate::jobs::Background;
use crate::limit::{RateGate, rate_limit};
use crate::logging::{RequestLog, log_request};

pub const API_WELCOME: &str = "Welcome to the TaskGate API!";
pub const TASKS_WELCOME: &str = "Welcome to TaskGate tasks!";
pub const API_DATA: &str = "This is the API endpoint.";
pub const LIMIT_DATA: &str = "Sky is the limit";

#[derive(Clone)]
pub struct AppState {
    pub app: Arc<App>,
    pub verifier: Arc<dyn CredentialVerifier>,
    pub trust_forwarded_for: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub task_type: String,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default)]
    pub countdown_secs: Option<u64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RevokeRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// `{"response": ...}` wrapper used by the task routes.
#[derive(Debug, Serialize, Deserialize)]
pub struct Wrapped<T> {
    pub response: T,
}

pub fn build_router(state: AppState) -> Router {
    let limiter = Arc::clone(state.app.limiter());
    let trust = state.trust_forwarded_for;
    let gate = |operation: &'static str, per_minute: u32| {
        middleware::from_fn_with_state(
            RateGate::new(
                Arc::clone(&limiter),
                operation,
                LimitSpec::per_minute(per_minute),
                trust,
            ),
            rate_limit,
        )
    };
    let verifier = Arc::clone(&state.verifier);
    let auth = || middleware::from_fn_with_state(Arc::clone(&verifier), require_api_key);

    let routes = Router::new()
        .route("/", get(home))
        .route("/api", post(api).route_layer(auth()).route_layer(gate("api", 5)))
        .route("/limit", get(limit).route_layer(gate("limit", 5)))
        .route("/health", get(health))
        .route("/liveness", get(liveness))
        .route("/tasks/", get(tasks_index).route_layer(gate("tasks.index", 5)))
        .route("/tasks/run", get(run_background).route_layer(gate("tasks.run", 20)))
        .route(
            "/tasks/submit",
            post(submit).route_layer(auth()).route_layer(gate("tasks.submit", 20)),
        )
        .route(
            "/tasks/status/:task_id",
            get(task_status).route_layer(gate("tasks.status", 30)),
        )
        .route("/tasks/pending", get(pending_tasks).route_layer(auth()))
        .route("/tasks/revoke/:task_id", post(revoke_task).route_layer(auth()))
        .fallback(not_found)
        .with_state(state);
    with_common_layers(routes, trust)
}

/// Router-wide layers, innermost first: method-not-allowed envelope, panic
/// catcher, request log, trace, CORS.
pub fn with_common_layers(router: Router, trust_forwarded_for: bool) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    router
        .layer(middleware::from_fn(envelope_method_not_allowed))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn_with_state(
            RequestLog { trust_forwarded_for },
            log_request,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

async fn home() -> Json<Value> {
    Json(json!({ "message": API_WELCOME }))
}

async fn api() -> Json<Value> {
    Json(json!({ "status": "success", "data": API_DATA }))
}

async fn limit() -> Json<Value> {
    Json(json!({ "status": "success", "data": LIMIT_DATA }))
}

async fn liveness() -> Json<Value> {
    Json(json!({ "status": "alive" }))
}

async fn health(State(state): State<AppState>) -> Response {
    let health = state.app.check_backends().await;
    if let Err(err) = &health.store {
        tracing::warn!(error = %err, "task store health check failed");
    }
    if let Err(err) = &health.broker {
        tracing::warn!(error = %err, "broker health check failed");
    }

    let (status, label) = if health.is_healthy() {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "unhealthy")
    };
    let body = json!({
        "status": label,
        "dependencies": {
            "store": health.store.is_ok(),
            "broker": health.broker.is_ok(),
        },
    });
    (status, Json(body)).into_response()
}

async fn tasks_index() -> Json<Value> {
    Json(json!({ "message": TASKS_WELCOME }))
}

async fn run_background(State(state): State<AppState>) -> Result<Json<Wrapped<String>>, ApiError> {
    let payload = encode_job(&Background {})
        .map_err(|e| ApiError::Internal(format!("encode background job: {e}")))?;
    let handle = state
        .app
        .dispatcher()
        .submit(&Background::task_type(), payload, SubmitOptions::default())
        .await?;
    Ok(Json(Wrapped {
        response: handle.to_string(),
    }))
}

async fn submit(
    State(state): State<AppState>,
    body: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<Json<Wrapped<String>>, ApiError> {
    let Json(req) = body?;
    let mut options = SubmitOptions::default();
    if let Some(secs) = req.countdown_secs {
        options = options.with_countdown(Duration::from_secs(secs));
    }
    let handle = state
        .app
        .dispatcher()
        .submit(
            &TaskType::new(req.task_type),
            req.payload.unwrap_or(Value::Null),
            options,
        )
        .await?;
    Ok(Json(Wrapped {
        response: handle.to_string(),
    }))
}

fn parse_task_id(path: Result<Path<String>, PathRejection>) -> Result<TaskId, ApiError> {
    let Path(raw) = path?;
    raw.parse::<TaskId>()
        .map_err(|e| ApiError::from(CoreError::from(e)))
}

async fn task_status(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<TaskView>, ApiError> {
    let task_id = parse_task_id(path)?;
    Ok(Json(state.app.status().get_status(task_id).await?))
}

async fn pending_tasks(
    State(state): State<AppState>,
) -> Result<Json<Wrapped<Vec<PendingEntry>>>, ApiError> {
    let entries = state.app.pending().list_pending().await?;
    Ok(Json(Wrapped { response: entries }))
}

async fn revoke_task(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    body: Option<Json<RevokeRequest>>,
) -> Result<Json<TaskView>, ApiError> {
    let task_id = parse_task_id(path)?;
    let reason = body.and_then(|Json(req)| req.reason);
    Ok(Json(state.app.dispatcher().revoke(task_id, reason).await?))
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::RouteNotFound(uri.path().to_string())
}

/// Routing answers a wrong method with a bare 405; give it the envelope,
/// keeping `Allow`.
async fn envelope_method_not_allowed(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let response = next.run(req).await;
    if response.status() != StatusCode::METHOD_NOT_ALLOWED
        || response.extensions().get::<Enveloped>().is_some()
    {
        return response;
    }

    let allow = response.headers().get(header::ALLOW).cloned();
    let mut enveloped = ApiError::MethodNotAllowed(method.to_string()).into_response();
    if let Some(allow) = allow {
        enveloped.headers_mut().insert(header::ALLOW, allow);
    }
    enveloped
}
