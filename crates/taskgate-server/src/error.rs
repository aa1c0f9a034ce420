//! HTTP error envelope: every failure leaves as `{error, message, status_code}`.

use std::any::Any;
use std::time::Duration;

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use taskgate_core::CoreError;

pub const RATE_LIMITED_MESSAGE: &str = "You have exceeded your rate-limit. Please try again later.";
pub const UNAUTHORIZED_MESSAGE: &str = "Invalid or missing API key";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

/// Marks a response whose body is already an `ErrorBody`.
#[derive(Debug, Clone, Copy)]
pub struct Enveloped;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{}", UNAUTHORIZED_MESSAGE)]
    Unauthorized,

    #[error("The requested URL '{0}' was not found on this server.")]
    RouteNotFound(String),

    #[error("{0}")]
    NotFound(String),

    #[error("The method '{0}' is not allowed for this endpoint.")]
    MethodNotAllowed(String),

    #[error("{0}")]
    UnsupportedMediaType(String),

    #[error("{}", RATE_LIMITED_MESSAGE)]
    RateLimited { retry_after: Duration },

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("The server encountered an internal error and could not complete your request.")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::RouteNotFound(_) | ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> ErrorBody {
        let status = self.status();
        ErrorBody {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.to_string(),
            status_code: status.as_u16(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Internal(detail) => tracing::error!(%detail, "internal error"),
            ApiError::Unavailable(detail) => tracing::warn!(%detail, "backend unavailable"),
            _ => {}
        }

        let mut response = (status, Json(self.body())).into_response();
        if let ApiError::RateLimited { retry_after } = &self {
            // round up so clients never retry inside the window
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            if let Ok(value) = HeaderValue::from_str(&secs.max(1).to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response.extensions_mut().insert(Enveloped);
        response
    }
}

/// Turns a handler panic caught by `CatchPanicLayer` into the 500 envelope.
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic payload".to_string()
    };
    ApiError::Internal(format!("handler panicked: {detail}")).into_response()
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::BackendUnavailable(msg) => ApiError::Unavailable(msg),
            CoreError::UnknownTask(task_id) => ApiError::NotFound(format!("Task {task_id} not found")),
            CoreError::DuplicateTask(task_id) => {
                ApiError::Conflict(format!("Task {task_id} already exists"))
            }
            CoreError::UnknownTaskType(task_type) => {
                ApiError::BadRequest(format!("Unknown task type '{task_type}'"))
            }
            CoreError::Transition(e) => {
                ApiError::Conflict(format!("Task {} is already {}", e.task_id, e.from))
            }
            err @ (CoreError::InvalidTaskId(_)
            | CoreError::InvalidLimitSpec(_)
            | CoreError::InvalidTimeLimits { .. }) => ApiError::BadRequest(err.to_string()),
            err @ CoreError::DuplicateHandler(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::MissingJsonContentType(_) => ApiError::UnsupportedMediaType(
                "The media type provided is not supported. Please check 'Content-Type' header."
                    .to_string(),
            ),
            other => ApiError::BadRequest(other.body_text()),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
