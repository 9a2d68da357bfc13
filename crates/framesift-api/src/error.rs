//! API error types and JSON error response formatting.
//!
//! ApiError provides a consistent JSON error response format across all
//! endpoints, mapping internal errors to appropriate HTTP status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::error;

use framesift_core::error::FramesiftError;

/// JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g., "bad_request", "not_found").
    pub error: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type that maps to HTTP status codes and JSON responses.
#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request - missing or invalid parameters.
    BadRequest(String),
    /// 404 Not Found - resource does not exist.
    NotFound(String),
    /// 409 Conflict - the worker is already running a job.
    Conflict(String),
    /// 500 Internal Server Error - unexpected server error.
    Internal(String),
    /// 502 Bad Gateway - a downstream service failed or was unreachable.
    BadGateway(String),
    /// 503 Service Unavailable - no capacity, or a component not ready.
    ServiceUnavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            ApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
            }
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, "bad_gateway", msg),
            ApiError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg)
            }
        };

        let body = ErrorBody {
            error: error_code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<FramesiftError> for ApiError {
    fn from(err: FramesiftError) -> Self {
        match &err {
            FramesiftError::Capacity | FramesiftError::StoreUnavailable(_) => {
                ApiError::ServiceUnavailable(err.to_string())
            }
            FramesiftError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            FramesiftError::Connectivity(_) | FramesiftError::Downstream { .. } => {
                ApiError::BadGateway(err.to_string())
            }
            FramesiftError::WorkerBusy => ApiError::Conflict(err.to_string()),
            FramesiftError::Validation(msg) | FramesiftError::Config(msg) => {
                ApiError::BadRequest(msg.clone())
            }
            FramesiftError::LeaseConflict { .. } => {
                error!(error = %err, "Lease conflict reached the API");
                ApiError::Internal(err.to_string())
            }
            _ => ApiError::Internal(err.to_string()),
        }
    }
}
