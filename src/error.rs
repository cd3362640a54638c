use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{
    certificate::CertificateError, models::ErrorResponse, password::PasswordError,
    repository::RepositoryError, storage::StorageError, token::TokenError,
};

/// AppError
///
/// The single error type returned by every handler. Each variant maps to exactly one
/// HTTP status and is rendered as a small `{"error": "..."}` JSON body.
///
/// Dependency failures carry only a generic message: the underlying cause is logged
/// where the conversion happens and never echoed to the client.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("Unauthorized")]
    Unauthenticated,
    // Login failure: one message whether the email or the password was wrong.
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Forbidden")]
    Forbidden,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Internal server error")]
    Dependency,
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated | AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Dependency => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.to_string(),
        });
        (self.status(), body).into_response()
    }
}

// --- Conversions from the service layers ---

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict => AppError::Conflict("User already exists".to_string()),
            other => {
                tracing::error!("repository failure: {:?}", other);
                AppError::Dependency
            }
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => {
                tracing::warn!("stored object missing: {}", key);
                AppError::not_found("File not found")
            }
            other => {
                tracing::error!("storage failure: {:?}", other);
                AppError::Dependency
            }
        }
    }
}

impl From<PasswordError> for AppError {
    fn from(err: PasswordError) -> Self {
        tracing::error!("password hashing failure: {:?}", err);
        AppError::Dependency
    }
}

impl From<CertificateError> for AppError {
    fn from(err: CertificateError) -> Self {
        tracing::error!("certificate rendering failure: {:?}", err);
        AppError::Dependency
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        tracing::error!("token signing failure: {:?}", err);
        AppError::Dependency
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}
