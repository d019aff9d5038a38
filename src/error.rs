use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Stable error taxonomy surfaced to clients.
///
/// `auth` and `validation` errors are never retried automatically;
/// `system` errors feed the client-side circuit breaker and fallback
/// ladder; `session` conflicts are a user decision point (takeover).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Auth,
    Subscription,
    Session,
    System,
    Validation,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Unauthorized: {0}")]
    Auth(String),

    #[error("Subscription denied: {0}")]
    Subscription(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Rate limit exceeded")]
    RateLimited { retry_after: i64 },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Machine-readable retry hint attached to every error response.
#[derive(Debug, Serialize)]
pub struct RetryHint {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_seconds: Option<i64>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    category: ErrorCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    retry: RetryHint,
}

impl From<axum::extract::rejection::JsonRejection> for AppError {
    fn from(rej: axum::extract::rejection::JsonRejection) -> Self {
        AppError::BadRequest(rej.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let no_retry = RetryHint {
            allowed: false,
            after_seconds: None,
        };

        let (status, category, error, details, retry) = match &self {
            AppError::Auth(msg) => (
                StatusCode::UNAUTHORIZED,
                ErrorCategory::Auth,
                "Unauthorized",
                Some(msg.clone()),
                no_retry,
            ),
            AppError::Subscription(msg) => (
                StatusCode::FORBIDDEN,
                ErrorCategory::Subscription,
                "Subscription denied",
                Some(msg.clone()),
                no_retry,
            ),
            AppError::Session(msg) => (
                StatusCode::CONFLICT,
                ErrorCategory::Session,
                "Session error",
                Some(msg.clone()),
                no_retry,
            ),
            AppError::RateLimited { retry_after } => (
                StatusCode::TOO_MANY_REQUESTS,
                ErrorCategory::System,
                "Rate limit exceeded",
                None,
                RetryHint {
                    allowed: true,
                    after_seconds: Some(*retry_after),
                },
            ),
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorCategory::Validation,
                "Bad request",
                Some(msg.clone()),
                no_retry,
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorCategory::Validation,
                "Not found",
                Some(msg.clone()),
                no_retry,
            ),
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCategory::System,
                    "Internal server error",
                    None,
                    RetryHint {
                        allowed: true,
                        after_seconds: Some(30),
                    },
                )
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCategory::System,
                    "Internal server error",
                    None,
                    RetryHint {
                        allowed: true,
                        after_seconds: Some(30),
                    },
                )
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                (
                    StatusCode::BAD_REQUEST,
                    ErrorCategory::Validation,
                    "Invalid JSON",
                    Some(e.to_string()),
                    no_retry,
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCategory::System,
                    "Internal server error",
                    None,
                    RetryHint {
                        allowed: true,
                        after_seconds: Some(30),
                    },
                )
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            category,
            details,
            retry,
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
