//! API error responses.
//!
//! Structured JSON error bodies with request tracking and the HTTP status
//! that matches each core failure condition.

use crate::errors::CoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level API error response with request tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error code (NOT_FOUND, BAD_REQUEST, CONFLICT, ...).
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub request_id: String,
}

#[derive(Debug)]
pub enum ApiErrorKind {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Unauthorized(String),
    ServiceUnavailable(String),
    InternalError(String),
}

impl ApiError {
    pub fn not_found(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::NotFound(message),
            request_id,
        }
    }

    pub fn bad_request(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::BadRequest(message),
            request_id,
        }
    }

    pub fn conflict(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::Conflict(message),
            request_id,
        }
    }

    pub fn unauthorized(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::Unauthorized(message),
            request_id,
        }
    }

    pub fn service_unavailable(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::ServiceUnavailable(message),
            request_id,
        }
    }

    pub fn internal_error(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::InternalError(message),
            request_id,
        }
    }

    /// Map a core failure onto the wire taxonomy.
    pub fn from_core(request_id: &str, err: CoreError) -> Self {
        let request_id = request_id.to_string();
        let message = err.to_string();
        let kind = match err {
            CoreError::WalletNotFound(_)
            | CoreError::TableNotFound(_)
            | CoreError::BetNotFound(_)
            | CoreError::CardNotFound(_) => ApiErrorKind::NotFound(message),

            CoreError::TableNotOpen(_)
            | CoreError::AlreadySettled(_)
            | CoreError::AssetNotOwned(_)
            | CoreError::InsufficientFunds { .. }
            | CoreError::InvalidAmount => ApiErrorKind::BadRequest(message),

            CoreError::InvalidState(_) | CoreError::ConcurrencyConflict => {
                ApiErrorKind::Conflict(message)
            }

            CoreError::Oracle(_) => ApiErrorKind::ServiceUnavailable(message),

            CoreError::Storage(_) => ApiErrorKind::InternalError(message),
        };
        Self { kind, request_id }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ApiErrorKind::NotFound(msg) => write!(f, "[{}] Not Found: {}", self.request_id, msg),
            ApiErrorKind::BadRequest(msg) => {
                write!(f, "[{}] Bad Request: {}", self.request_id, msg)
            }
            ApiErrorKind::Conflict(msg) => write!(f, "[{}] Conflict: {}", self.request_id, msg),
            ApiErrorKind::Unauthorized(msg) => {
                write!(f, "[{}] Unauthorized: {}", self.request_id, msg)
            }
            ApiErrorKind::ServiceUnavailable(msg) => {
                write!(f, "[{}] Service Unavailable: {}", self.request_id, msg)
            }
            ApiErrorKind::InternalError(msg) => {
                write!(f, "[{}] Internal Error: {}", self.request_id, msg)
            }
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self.kind {
            ApiErrorKind::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiErrorKind::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiErrorKind::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            ApiErrorKind::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
            }
            ApiErrorKind::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                msg.clone(),
            ),
            ApiErrorKind::InternalError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
            ),
        };

        let body = Json(ErrorResponse {
            request_id: self.request_id.clone(),
            error: ErrorBody {
                code: code.to_string(),
                message,
            },
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_expected_kinds() {
        let err = ApiError::from_core("r1", CoreError::WalletNotFound("u1".into()));
        assert!(matches!(err.kind, ApiErrorKind::NotFound(_)));

        let err = ApiError::from_core(
            "r1",
            CoreError::InsufficientFunds {
                balance: 0.0,
                requested: 1.0,
            },
        );
        assert!(matches!(err.kind, ApiErrorKind::BadRequest(_)));

        let err = ApiError::from_core("r1", CoreError::ConcurrencyConflict);
        assert!(matches!(err.kind, ApiErrorKind::Conflict(_)));

        let err = ApiError::from_core(
            "r1",
            CoreError::Oracle(crate::errors::OracleError::Timeout(100)),
        );
        assert!(matches!(err.kind, ApiErrorKind::ServiceUnavailable(_)));
    }
}
