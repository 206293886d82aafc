use axum::response::{IntoResponse, Response};
use axum::Json;
use hyper::StatusCode;
use serde_json::json;
use tracing::{error, warn};

/// Crate-wide error type, surfaced to the client as `{"error": "..."}`.
///
/// Lookups that filter by owner report `NotFound` even when the row exists
/// but belongs to someone else; callers cannot distinguish "absent" from
/// "not yours".
#[derive(Debug)]
pub enum AppError {
    NotFound(&'static str),
    Validation(String),
    Forbidden(&'static str),
    Internal,
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn not_connected() -> Self {
        AppError::Forbidden("you have to be connected to perform this action")
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        // Duplicate guards are check-then-insert; a concurrent duplicate
        // slips past the check and lands on the UNIQUE constraint instead.
        if let sqlx::Error::Database(db_error) = &e {
            if db_error.is_unique_violation() {
                warn!("unique constraint violation: {db_error}");
                return AppError::Validation("already exists".to_string());
            }
        }
        error!("database error: {e}");
        AppError::Internal
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status_code, message) = match self {
            AppError::NotFound(message) => (StatusCode::NOT_FOUND, message.to_string()),
            AppError::Validation(message) => (StatusCode::BAD_REQUEST, message),
            AppError::Forbidden(message) => (StatusCode::FORBIDDEN, message.to_string()),
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_string(),
            ),
        };

        (status_code, Json(json!({ "error": message }))).into_response()
    }
}
