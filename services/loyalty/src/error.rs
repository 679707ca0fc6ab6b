//! Service error taxonomy and HTTP translation
//!
//! Inner layers return `ServiceError` kinds; the `IntoResponse` impl on
//! `ApiError` is the single point where kinds become status codes.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Typed error kinds returned by repositories and services.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Malformed input (bad credentials shape, non-positive amount)
    #[error("validation: {0}")]
    Validation(String),

    /// Identifier failed the Luhn check
    #[error("invalid order number")]
    InvalidOrderNumber,

    /// Unique value already taken by the same owner
    #[error("already registered by this user")]
    ConflictSelf,

    /// Unique value already taken by a different owner
    #[error("already registered by another user")]
    ConflictOther,

    /// Requested entity does not exist
    #[error("not found")]
    NotFound,

    /// Withdrawal amount exceeds the current balance
    #[error("insufficient funds")]
    InsufficientFunds,

    /// A persistence operation exceeded its time budget
    #[error("operation timed out")]
    Timeout,

    /// Shutdown in progress
    #[error("cancelled")]
    Cancelled,

    /// Underlying database failure
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// HTTP-facing error. Handlers construct these either directly or via
/// the `From<ServiceError>` conversion below.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("conflict")]
    Conflict,

    #[error("payment required")]
    PaymentRequired,

    #[error("unprocessable entity")]
    UnprocessableEntity,

    #[error("internal server error")]
    Internal,
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(msg) => ApiError::BadRequest(msg),
            ServiceError::InvalidOrderNumber => ApiError::UnprocessableEntity,
            ServiceError::ConflictSelf | ServiceError::ConflictOther => ApiError::Conflict,
            ServiceError::InsufficientFunds => ApiError::PaymentRequired,
            ServiceError::NotFound
            | ServiceError::Timeout
            | ServiceError::Cancelled
            | ServiceError::Database(_) => ApiError::Internal,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            ApiError::Conflict => (StatusCode::CONFLICT, "conflict".to_string()),
            ApiError::PaymentRequired => {
                (StatusCode::PAYMENT_REQUIRED, "insufficient funds".to_string())
            }
            ApiError::UnprocessableEntity => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid order number".to_string(),
            ),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_string(),
            ),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
