//! Error types for Shelfmark server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Numeric error codes exposed to API clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Success = 0,
    Failure = 1,
    NotAuthorized = 2,
    DbFailure = 3,
    NoSuchUser = 4,
    NoSuchBook = 5,
    BookNotAvailable = 7,
    Duplicate = 8,
    MaxBorrowsReached = 11,
    BadValue = 18,
    NoSuchData = 20,
    AlreadyReserved = 22,
    ReservationPending = 23,
    NoActiveBorrowing = 24,
}

/// Refusals produced by the circulation engine.
///
/// Each variant maps to a stable string code (`code()`) and a user-facing
/// reason (`Display`). None of them leave partial state behind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CirculationError {
    #[error("User not found")]
    UserNotFound,

    #[error("Book not found")]
    BookNotFound,

    #[error("Reservation not found")]
    ReservationNotFound,

    #[error("Borrow limit reached")]
    LimitReached,

    #[error("Book not available")]
    NotAvailable,

    #[error("Already reserved")]
    AlreadyReserved,

    #[error("Cannot renew - reservations pending")]
    ReservationPending,

    #[error("No active borrowing")]
    NoActiveBorrowing,
}

impl CirculationError {
    /// Stable machine-readable reason code
    pub fn code(&self) -> &'static str {
        match self {
            CirculationError::UserNotFound
            | CirculationError::BookNotFound
            | CirculationError::ReservationNotFound => "not-found",
            CirculationError::LimitReached => "limit-reached",
            CirculationError::NotAvailable => "not-available",
            CirculationError::AlreadyReserved => "already-reserved",
            CirculationError::ReservationPending => "reservation-pending",
            CirculationError::NoActiveBorrowing => "no-active-borrowing",
        }
    }

    fn status_and_code(&self) -> (StatusCode, ErrorCode) {
        match self {
            CirculationError::UserNotFound => (StatusCode::NOT_FOUND, ErrorCode::NoSuchUser),
            CirculationError::BookNotFound => (StatusCode::NOT_FOUND, ErrorCode::NoSuchBook),
            CirculationError::ReservationNotFound => (StatusCode::NOT_FOUND, ErrorCode::NoSuchData),
            CirculationError::LimitReached => (StatusCode::CONFLICT, ErrorCode::MaxBorrowsReached),
            CirculationError::NotAvailable => (StatusCode::CONFLICT, ErrorCode::BookNotAvailable),
            CirculationError::AlreadyReserved => (StatusCode::CONFLICT, ErrorCode::AlreadyReserved),
            CirculationError::ReservationPending => {
                (StatusCode::CONFLICT, ErrorCode::ReservationPending)
            }
            CirculationError::NoActiveBorrowing => {
                (StatusCode::CONFLICT, ErrorCode::NoActiveBorrowing)
            }
        }
    }
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Business rule violation: {0}")]
    BusinessRule(String),

    #[error(transparent)]
    Circulation(#[from] CirculationError),
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    /// Always "error"
    pub status: String,
    pub code: u32,
    /// Reason code, e.g. "limit-reached"
    pub error: String,
    pub message: String,
}

impl AppError {
    fn parts(&self) -> (StatusCode, ErrorCode, String, String) {
        match self {
            AppError::Authentication(msg) => (
                StatusCode::UNAUTHORIZED,
                ErrorCode::NotAuthorized,
                "unauthorized".to_string(),
                msg.clone(),
            ),
            AppError::Authorization(msg) => (
                StatusCode::FORBIDDEN,
                ErrorCode::NotAuthorized,
                "forbidden".to_string(),
                msg.clone(),
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorCode::NoSuchData,
                "not-found".to_string(),
                msg.clone(),
            ),
            AppError::Validation(msg) | AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorCode::BadValue,
                "bad-value".to_string(),
                msg.clone(),
            ),
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::DbFailure,
                    "database".to_string(),
                    "Database error".to_string(),
                )
            }
            AppError::Conflict(msg) => (
                StatusCode::CONFLICT,
                ErrorCode::Duplicate,
                "conflict".to_string(),
                msg.clone(),
            ),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::Failure,
                    "internal".to_string(),
                    "Internal server error".to_string(),
                )
            }
            AppError::BusinessRule(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorCode::Failure,
                "business-rule".to_string(),
                msg.clone(),
            ),
            AppError::Circulation(e) => {
                let (status, code) = e.status_and_code();
                (status, code, e.code().to_string(), e.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, error, message) = self.parts();

        let body = Json(ErrorResponse {
            status: "error".to_string(),
            code: code as u32,
            error,
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circulation_errors_keep_reason_strings() {
        assert_eq!(CirculationError::LimitReached.to_string(), "Borrow limit reached");
        assert_eq!(CirculationError::AlreadyReserved.to_string(), "Already reserved");
        assert_eq!(
            CirculationError::ReservationPending.to_string(),
            "Cannot renew - reservations pending"
        );
        assert_eq!(CirculationError::BookNotFound.code(), "not-found");
        assert_eq!(CirculationError::NoActiveBorrowing.code(), "no-active-borrowing");
    }

    #[test]
    fn circulation_error_renders_as_conflict() {
        let err: AppError = CirculationError::NotAvailable.into();
        let (status, code, error, message) = err.parts();
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(code, ErrorCode::BookNotAvailable);
        assert_eq!(error, "not-available");
        assert_eq!(message, "Book not available");
    }

    #[test]
    fn missing_book_renders_as_not_found() {
        let err: AppError = CirculationError::BookNotFound.into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn internal_errors_are_redacted() {
        let (status, _, _, message) = AppError::Internal("pool exploded".into()).parts();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(message, "Internal server error");
    }
}
