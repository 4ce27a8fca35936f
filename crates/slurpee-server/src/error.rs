//! Error handling for HTTP responses.
//!
//! Maps `slurpee_core::Error` onto a small HTTP status-code taxonomy at
//! the one seam (`From<CoreError> for HttpError`) the rest of the boundary
//! depends on.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use slurpee_core::error::Error as CoreError;

/// `{"error": "<message>"}` response body.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

/// HTTP error wrapper for Axum.
pub struct HttpError {
    pub status: StatusCode,
    pub body: ApiError,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ApiError {
                error: message.into(),
            },
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Never discloses which of (bad id, unknown id, hash mismatch) failed for
/// auth errors, and never leaks a raw database error message to the caller
/// - only its own status code is load-bearing, the message is
/// logged separately at the call site.
impl From<CoreError> for HttpError {
    fn from(err: CoreError) -> Self {
        match &err {
            CoreError::NotFound { entity_type, id } => {
                HttpError::not_found(format!("{entity_type} '{id}' not found"))
            }
            CoreError::Authentication => {
                HttpError::unauthorized("missing or invalid API secret")
            }
            CoreError::OutOfScope { subject } => {
                HttpError::forbidden(format!("subject '{subject}' is out of scope for this secret"))
            }
            CoreError::InvalidInput { field, message } => {
                HttpError::bad_request(format!("{field}: {message}"))
            }
            CoreError::Duplicate { entity_type, field } => {
                HttpError::new(
                    StatusCode::CONFLICT,
                    format!("{entity_type} with {field} already exists"),
                )
            }
            CoreError::ShutdownInProgress => {
                HttpError::service_unavailable("shutting down, try again shortly")
            }
            CoreError::Database { message, .. } => {
                tracing::error!(error = %message, "database error at HTTP boundary");
                HttpError::internal_error("internal error")
            }
            CoreError::Configuration { message } => {
                tracing::error!(error = %message, "configuration error at HTTP boundary");
                HttpError::internal_error("internal error")
            }
            CoreError::Other(source) => {
                tracing::error!(error = %source, "unexpected error at HTTP boundary");
                HttpError::internal_error("internal error")
            }
        }
    }
}

/// Result type for HTTP handlers.
pub type HttpResult<T> = Result<T, HttpError>;
