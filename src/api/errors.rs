//! API Error Handling
//!
//! Structured error responses with proper HTTP status codes and request tracking.

use crate::errors::LedgerError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level API error response with request tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

/// Error body with structured information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable code (NOT_FOUND, SESSION_CLOSED, INSUFFICIENT_FUNDS, ...)
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// API error types with request tracking
#[derive(Debug)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub request_id: String,
    pub details: Option<serde_json::Value>,
}

#[derive(Debug)]
pub enum ApiErrorKind {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    /// 409 with a specific code
    Conflict { code: &'static str, message: String },
    /// 423: the betting gate is closed
    Locked(String),
    InternalError(String),
    ServiceUnavailable(String),
}

impl ApiError {
    fn new(request_id: &str, kind: ApiErrorKind) -> Self {
        Self {
            kind,
            request_id: request_id.to_string(),
            details: None,
        }
    }

    fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_request(request_id: &str, message: impl Into<String>) -> Self {
        Self::new(request_id, ApiErrorKind::BadRequest(message.into()))
    }

    pub fn unauthorized(request_id: &str, message: impl Into<String>) -> Self {
        Self::new(request_id, ApiErrorKind::Unauthorized(message.into()))
    }

    pub fn forbidden(request_id: &str, message: impl Into<String>) -> Self {
        Self::new(request_id, ApiErrorKind::Forbidden(message.into()))
    }

    pub fn not_found(request_id: &str, message: impl Into<String>) -> Self {
        Self::new(request_id, ApiErrorKind::NotFound(message.into()))
    }

    pub fn internal_error(request_id: &str, message: impl Into<String>) -> Self {
        Self::new(request_id, ApiErrorKind::InternalError(message.into()))
    }

    /// Map a ledger failure onto its HTTP shape
    pub fn from_ledger(request_id: &str, error: LedgerError) -> Self {
        let message = error.to_string();
        let retryable = error.is_retryable();
        match error {
            LedgerError::Validation(_) => Self::bad_request(request_id, message),
            LedgerError::SessionClosed(reason) => {
                let details = serde_json::to_value(reason).ok();
                let mut api = Self::new(request_id, ApiErrorKind::Locked(message));
                api.details = details;
                api
            }
            LedgerError::InsufficientFunds {
                required,
                available,
            } => Self::new(
                request_id,
                ApiErrorKind::Conflict {
                    code: "INSUFFICIENT_FUNDS",
                    message,
                },
            )
            .with_details(serde_json::json!({
                "required": required,
                "available": available,
            })),
            LedgerError::ConcurrencyConflict { attempts } => Self::new(
                request_id,
                ApiErrorKind::Conflict {
                    code: "CONCURRENCY_CONFLICT",
                    message,
                },
            )
            .with_details(serde_json::json!({ "attempts": attempts, "retryable": retryable })),
            LedgerError::AlreadyExists(_) => Self::new(
                request_id,
                ApiErrorKind::Conflict {
                    code: "ALREADY_EXISTS",
                    message,
                },
            ),
            LedgerError::NotFound(_) => Self::not_found(request_id, message),
            LedgerError::Storage(_) => {
                tracing::error!(request_id, error = %message, "Store failure");
                Self::new(request_id, ApiErrorKind::ServiceUnavailable(message))
            }
            LedgerError::Configuration(_) => {
                tracing::error!(request_id, error = %message, "Configuration failure");
                Self::internal_error(request_id, message)
            }
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ApiErrorKind::BadRequest(msg) => write!(f, "[{}] Bad Request: {}", self.request_id, msg),
            ApiErrorKind::Unauthorized(msg) => write!(f, "[{}] Unauthorized: {}", self.request_id, msg),
            ApiErrorKind::Forbidden(msg) => write!(f, "[{}] Forbidden: {}", self.request_id, msg),
            ApiErrorKind::NotFound(msg) => write!(f, "[{}] Not Found: {}", self.request_id, msg),
            ApiErrorKind::Conflict { code, message } => {
                write!(f, "[{}] Conflict ({}): {}", self.request_id, code, message)
            }
            ApiErrorKind::Locked(msg) => write!(f, "[{}] Locked: {}", self.request_id, msg),
            ApiErrorKind::InternalError(msg) => write!(f, "[{}] Internal Error: {}", self.request_id, msg),
            ApiErrorKind::ServiceUnavailable(msg) => {
                write!(f, "[{}] Service Unavailable: {}", self.request_id, msg)
            }
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self.kind {
            ApiErrorKind::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiErrorKind::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            ApiErrorKind::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg),
            ApiErrorKind::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiErrorKind::Conflict { code, message } => (StatusCode::CONFLICT, code, message),
            ApiErrorKind::Locked(msg) => (StatusCode::LOCKED, "SESSION_CLOSED", msg),
            ApiErrorKind::InternalError(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg)
            }
            ApiErrorKind::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", msg)
            }
        };

        let body = Json(ErrorResponse {
            request_id: self.request_id,
            error: ErrorBody {
                code: code.to_string(),
                message,
                details: self.details,
            },
        });

        (status, body).into_response()
    }
}
