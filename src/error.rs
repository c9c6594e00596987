//! Error types for feedbridge
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::service::MappingError;

/// Application-wide error type
///
/// This enum represents all possible errors that can occur
/// in the application. It implements `IntoResponse` to
/// automatically convert errors to appropriate HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Resource not found (404)
    #[error("Resource not found")]
    NotFound,

    /// Authentication required (401)
    #[error("Authentication required")]
    Unauthorized,

    /// Access denied (403)
    #[error("Access denied")]
    Forbidden,

    /// Validation error (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Payload field could not be coerced (400)
    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl AppError {
    /// Recover an owned error from one shared by a coalescing cache.
    ///
    /// Variants that carry non-clonable sources are flattened into
    /// `Internal` with the original message.
    pub fn from_shared(err: Arc<AppError>) -> Self {
        match Arc::try_unwrap(err) {
            Ok(owned) => owned,
            Err(shared) => match &*shared {
                AppError::NotFound => AppError::NotFound,
                AppError::Unauthorized => AppError::Unauthorized,
                AppError::Forbidden => AppError::Forbidden,
                AppError::Validation(msg) => AppError::Validation(msg.clone()),
                AppError::Mapping(err) => AppError::Mapping(err.clone()),
                AppError::Config(msg) => AppError::Config(msg.clone()),
                other => AppError::Internal(anyhow::anyhow!(other.to_string())),
            },
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            AppError::NotFound => "not_found",
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden => "forbidden",
            AppError::Validation(_) => "validation",
            AppError::Mapping(_) => "mapping",
            AppError::Database(_) => "database",
            AppError::Config(_) => "config",
            AppError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Maps each error variant to appropriate HTTP status code
    /// and JSON error body.
    fn into_response(self) -> Response {
        use axum::Json;

        let (status, error_message) = match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::Forbidden => (StatusCode::FORBIDDEN, self.to_string()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Mapping(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::Database(error) => {
                tracing::error!(%error, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            AppError::Internal(error) => {
                tracing::error!(%error, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL.with_label_values(&[self.error_type()]).inc();

        let body = Json(serde_json::json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_bad_request() {
        let response = AppError::Validation("Unknown model specified: x".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn mapping_maps_to_bad_request() {
        let error = MappingError::InvalidDate {
            field: "createdAt".to_string(),
            value: "yesterday".to_string(),
        };
        let response = AppError::from(error).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn forbidden_maps_to_forbidden() {
        assert_eq!(
            AppError::Forbidden.into_response().status(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn from_shared_keeps_not_found_when_still_shared() {
        let shared = Arc::new(AppError::NotFound);
        let _other = shared.clone();
        assert!(matches!(AppError::from_shared(shared), AppError::NotFound));
    }

    #[test]
    fn from_shared_flattens_database_errors() {
        let shared = Arc::new(AppError::Database(sqlx::Error::RowNotFound));
        let _other = shared.clone();
        assert!(matches!(
            AppError::from_shared(shared),
            AppError::Internal(_)
        ));
    }
}
