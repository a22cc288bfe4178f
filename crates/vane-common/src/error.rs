//! Centralized error types for Vane.
//!
//! Uses `thiserror` for ergonomic error definitions and provides HTTP- and
//! gateway-ack-friendly conversions so both external surfaces speak the
//! same five error kinds.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Core error type used across all Vane services — the five kinds
/// surfaced to clients on either the REST or the signaling surface.
#[derive(Debug, thiserror::Error)]
pub enum VaneError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("incompatible-codecs")]
    IncompatibleCodecs,

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// JSON error response body sent to REST clients.
#[derive(Serialize)]
struct ErrorResponse {
    code: u16,
    error: String,
    message: String,
}

impl VaneError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::InvalidState(_) => StatusCode::CONFLICT,
            Self::IncompatibleCodecs => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable kind, reused verbatim as the gateway ack's `error` string.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad-request",
            Self::NotFound { .. } => "not-found",
            Self::InvalidState(_) => "invalid-state",
            Self::IncompatibleCodecs => "incompatible-codecs",
            Self::Internal(_) => "internal",
        }
    }

    /// Message text safe to send to a client — internal errors are logged
    /// with full detail and replaced with a generic message here.
    pub fn client_message(&self) -> String {
        match self {
            Self::Internal(e) => {
                tracing::error!(error = %e, "internal error");
                "internal error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for VaneError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: status.as_u16(),
            error: self.kind().to_string(),
            message: self.client_message(),
        };
        (status, axum::Json(body)).into_response()
    }
}

pub type VaneResult<T> = Result<T, VaneError>;
