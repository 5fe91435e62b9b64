//! Error type for the authentication surface

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::error::DatabaseError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Custom error type for authentication errors
#[derive(Error, Debug)]
pub enum AuthError {
    /// Invalid input with a user-facing reason
    #[error("{0}")]
    BadRequest(String),

    /// Missing, invalid or expired credentials
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated but not allowed
    #[error("{0}")]
    Forbidden(String),

    /// Correct credentials for an account whose email is not verified yet
    #[error("Please verify your email address before logging in")]
    VerificationRequired,

    /// Rate limit exceeded
    #[error("Too many attempts. Please try again later.")]
    TooManyRequests,

    /// Internal server error
    #[error("Internal server error")]
    InternalServerError,

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AuthError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden(_) | AuthError::VerificationRequired => StatusCode::FORBIDDEN,
            AuthError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            AuthError::InternalServerError | AuthError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = match self {
            AuthError::VerificationRequired => json!({
                "error": AuthError::VerificationRequired.to_string(),
                "requiresVerification": true,
            }),
            AuthError::Database(e) => {
                error!("Database error: {}", e);
                json!({ "error": "Internal server error" })
            }
            other => json!({ "error": other.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

/// Type alias for authentication results
pub type AuthResult<T> = Result<T, AuthError>;
