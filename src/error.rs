//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::DomainError;
use crate::ledger::LedgerError;
use crate::store::StoreError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Missing required header: {0}")]
    MissingHeader(String),

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    // Domain errors
    #[error(transparent)]
    Domain(#[from] DomainError),

    // Server errors (5xx)
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Domain(e) => AppError::Domain(e),
            LedgerError::Store(e) => AppError::Store(e),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, Option<String>) {
        match self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }

            // 401 Unauthorized
            AppError::MissingHeader(header) => {
                (StatusCode::UNAUTHORIZED, "missing_identity", Some(header.clone()))
            }
            AppError::UnknownUser(login) => {
                (StatusCode::UNAUTHORIZED, "unknown_user", Some(login.clone()))
            }

            // Domain errors - map to appropriate HTTP status
            AppError::Domain(domain_err) => match domain_err {
                DomainError::InvalidAmount(msg) => {
                    (StatusCode::BAD_REQUEST, "invalid_amount", Some(msg.clone()))
                }
                DomainError::InvalidOrderNumber(_) => {
                    (StatusCode::BAD_REQUEST, "invalid_order_number", None)
                }
                DomainError::InvalidChecksum(number) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "invalid_checksum", Some(number.clone()))
                }
                DomainError::InsufficientFunds { .. } => (
                    StatusCode::PAYMENT_REQUIRED,
                    "insufficient_funds",
                    Some(domain_err.to_string()),
                ),
                DomainError::OrderConflict { number } => {
                    (StatusCode::CONFLICT, "order_conflict", Some(number.clone()))
                }
                DomainError::OrderNumberTaken(number) => {
                    (StatusCode::CONFLICT, "order_number_taken", Some(number.clone()))
                }
                DomainError::AccountExists(login) => {
                    (StatusCode::CONFLICT, "account_exists", Some(login.clone()))
                }
                DomainError::AccountNotFound(login) => {
                    (StatusCode::UNAUTHORIZED, "unknown_user", Some(login.clone()))
                }
                DomainError::IllegalTransition { .. } | DomainError::UnknownOrderState(_) => {
                    tracing::error!(error = %domain_err, "Order state invariant violated");
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
                }
            },

            // 503 / 500
            AppError::Store(e) if e.is_transient() => {
                tracing::warn!(error = %e, "Transient store error");
                (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", None)
            }
            AppError::Store(e) => {
                tracing::error!("Store error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "store_error", None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.parts().0
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = self.parts();

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
