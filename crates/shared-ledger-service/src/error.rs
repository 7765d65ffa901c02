//! API error types and responses.

use std::time::Duration;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use shared_ledger_core::LedgerError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Operation name not in the catalog.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The entry would overdraw the owner.
    #[error("{message}")]
    InsufficientBalance {
        /// Human-readable reason.
        message: String,
        /// Current balance.
        balance: i64,
        /// Attempted amount.
        amount: i64,
    },

    /// Nonce already used.
    #[error("duplicate transaction: {0}")]
    DuplicateTransaction(String),

    /// Too many requests.
    #[error("rate limit exceeded")]
    RateLimited {
        /// Time until the window resets.
        retry_after: Option<Duration>,
    },

    /// Storage is down or slow; safe to retry.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Could not validate credentials".to_string(),
                None,
            ),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::InvalidOperation(operation) => (
                StatusCode::BAD_REQUEST,
                "invalid_operation",
                format!("Invalid operation: {operation}"),
                Some(serde_json::json!({ "operation": operation })),
            ),
            Self::InsufficientBalance {
                message,
                balance,
                amount,
            } => (
                StatusCode::BAD_REQUEST,
                "insufficient_balance",
                message.clone(),
                Some(serde_json::json!({
                    "balance": balance,
                    "amount": amount
                })),
            ),
            Self::DuplicateTransaction(nonce) => (
                StatusCode::CONFLICT,
                "duplicate_transaction",
                format!("Transaction with nonce '{nonce}' already exists"),
                None,
            ),
            Self::RateLimited { retry_after } => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limit_exceeded",
                "Too many requests. Please slow down.".to_string(),
                retry_after.map(|d| serde_json::json!({ "retry_after_seconds": d.as_secs() })),
            ),
            Self::Unavailable(msg) => {
                tracing::warn!(error = %msg, "Storage unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "service_unavailable",
                    "Storage is temporarily unavailable, retry later".to_string(),
                    None,
                )
            }
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        let mut response = (status, Json(body)).into_response();

        if let Self::RateLimited {
            retry_after: Some(retry_after),
        } = self
        {
            // Round up so clients never retry inside the window.
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            if let Ok(value) = secs.to_string().parse() {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let message = err.to_string();
        match err {
            LedgerError::DuplicateTransaction { nonce } => Self::DuplicateTransaction(nonce),
            LedgerError::InvalidOperation { operation } => Self::InvalidOperation(operation),
            LedgerError::InsufficientBalance {
                balance, amount, ..
            } => Self::InsufficientBalance {
                message,
                balance,
                amount,
            },
            LedgerError::RateLimitExceeded { retry_after, .. } => Self::RateLimited { retry_after },
            LedgerError::InvalidId(e) => Self::BadRequest(e.to_string()),
            LedgerError::StorageUnavailable(_) | LedgerError::StorageTimeout { .. } => {
                Self::Unavailable(message)
            }
        }
    }
}
