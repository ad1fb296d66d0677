//! Error handling for the coordinator.
//!
//! Every fallible path funnels into [`AppError`], which carries one of the
//! seven coordinator error kinds. HTTP status codes only exist at the
//! response boundary.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;
use validator::ValidationErrors;

/// Error response structure for consistent API responses
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub correlation_id: String,
    pub timestamp: String,
}

/// Main application error type
#[derive(Debug, Error)]
pub enum AppError {
    // Validation
    #[error("Request validation failed")]
    ValidationFailed(ValidationErrors),

    #[error("Invalid request format")]
    InvalidRequestFormat(String),

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field value: {field}")]
    InvalidFieldValue { field: String, message: String },

    // Resource errors
    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Resource conflict: {message}")]
    Conflict { message: String },

    /// Lease-holder mismatch on a claim or submit.
    #[error("Lease held by another worker: {holder}")]
    LeaseConflict { holder: String },

    // Rate limiting
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: Option<u64> },

    // Worker authentication
    #[error("Application key required")]
    AppKeyRequired,

    #[error("Application key invalid")]
    AppKeyInvalid,

    // Model providers / vector store
    #[error("Transient provider error from {provider}")]
    ProviderTransient { provider: String, message: String },

    #[error("Fatal provider error from {provider}")]
    ProviderFatal { provider: String, message: String },

    // Database errors
    #[error("Database connection failed")]
    DatabaseConnectionFailed,

    #[error("Database query failed")]
    DatabaseQueryFailed(sqlx::Error),

    #[error("Database constraint violation")]
    DatabaseConstraintViolation(String),

    // System errors
    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal server error")]
    Internal { message: Option<String> },

    // JSON parsing errors
    #[error("JSON parsing error")]
    JsonParsingError(#[from] JsonRejection),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::ValidationFailed(_)
            | AppError::InvalidRequestFormat(_)
            | AppError::MissingField { .. }
            | AppError::InvalidFieldValue { .. }
            | AppError::JsonParsingError(_) => StatusCode::BAD_REQUEST,

            // 401 Unauthorized
            AppError::AppKeyRequired | AppError::AppKeyInvalid => StatusCode::UNAUTHORIZED,

            // 404 Not Found
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::Conflict { .. }
            | AppError::LeaseConflict { .. }
            | AppError::DatabaseConstraintViolation(_) => StatusCode::CONFLICT,

            // 429 Too Many Requests
            AppError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 502 Bad Gateway
            AppError::ProviderTransient { .. } | AppError::ProviderFatal { .. } => {
                StatusCode::BAD_GATEWAY
            }

            // 503 Service Unavailable
            AppError::DatabaseConnectionFailed => StatusCode::SERVICE_UNAVAILABLE,

            // 500 Internal Server Error
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::ValidationFailed(_) => "VALIDATION_FAILED",
            AppError::InvalidRequestFormat(_) => "INVALID_REQUEST_FORMAT",
            AppError::MissingField { .. } => "MISSING_FIELD",
            AppError::InvalidFieldValue { .. } => "INVALID_FIELD_VALUE",
            AppError::NotFound { .. } => "RESOURCE_NOT_FOUND",
            AppError::Conflict { .. } => "RESOURCE_CONFLICT",
            AppError::LeaseConflict { .. } => "LEASE_CONFLICT",
            AppError::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            AppError::AppKeyRequired => "APP_KEY_REQUIRED",
            AppError::AppKeyInvalid => "APP_KEY_INVALID",
            AppError::ProviderTransient { .. } => "PROVIDER_TRANSIENT",
            AppError::ProviderFatal { .. } => "PROVIDER_FATAL",
            AppError::DatabaseConnectionFailed => "DATABASE_CONNECTION_FAILED",
            AppError::DatabaseQueryFailed(_) => "DATABASE_QUERY_FAILED",
            AppError::DatabaseConstraintViolation(_) => "DATABASE_CONSTRAINT_VIOLATION",
            AppError::ConfigurationError { .. } => "CONFIGURATION_ERROR",
            AppError::Internal { .. } => "INTERNAL_SERVER_ERROR",
            AppError::JsonParsingError(_) => "JSON_PARSING_ERROR",
        }
    }

    /// Get user-friendly message for this error
    pub fn user_message(&self) -> String {
        match self {
            AppError::ValidationFailed(_) => "Please check your input and try again".to_string(),
            AppError::InvalidRequestFormat(msg) => format!("Invalid request format: {}", msg),
            AppError::MissingField { field } => format!("Missing required field: {}", field),
            AppError::InvalidFieldValue { field, message } => {
                format!("Invalid value for {}: {}", field, message)
            }
            AppError::NotFound { resource } => format!("{} not found", resource),
            AppError::Conflict { message } => message.clone(),
            AppError::LeaseConflict { holder } => {
                format!("Item is leased by another worker ({})", holder)
            }
            AppError::RateLimitExceeded { .. } => {
                "Too many requests, please try again later".to_string()
            }
            AppError::AppKeyRequired => "Application key required".to_string(),
            AppError::AppKeyInvalid => "Invalid application key".to_string(),
            AppError::ProviderTransient { provider, .. } => {
                format!("{} is temporarily unavailable", provider)
            }
            AppError::ProviderFatal { provider, .. } => {
                format!("Error communicating with {}", provider)
            }
            _ => "An unexpected error occurred".to_string(),
        }
    }

    /// Get error details for debugging
    pub fn error_details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::ValidationFailed(errors) => {
                let mut details = HashMap::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors
                        .iter()
                        .map(|e| {
                            e.message
                                .as_ref()
                                .map(|m| m.to_string())
                                .unwrap_or_else(|| "Invalid value".to_string())
                        })
                        .collect();
                    details.insert(field.to_string(), messages);
                }
                Some(json!(details))
            }
            AppError::RateLimitExceeded { retry_after } => Some(json!({
                "retry_after_seconds": retry_after
            })),
            AppError::DatabaseQueryFailed(e) => Some(json!({
                "database_error": e.to_string()
            })),
            AppError::ProviderTransient { message, .. }
            | AppError::ProviderFatal { message, .. } => Some(json!({
                "provider_message": message
            })),
            _ => None,
        }
    }

    /// Whether a retry at the caller can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::ProviderTransient { .. }
                | AppError::RateLimitExceeded { .. }
                | AppError::DatabaseConnectionFailed
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        AppError::Internal {
            message: Some(message.into()),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        AppError::NotFound {
            resource: resource.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        AppError::Conflict {
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let correlation_id = Uuid::new_v4().to_string();
        let status = self.status_code();
        let error_code = self.error_code();
        let user_message = self.user_message();
        let details = self.error_details();

        // Log error with correlation ID for debugging
        match &self {
            AppError::Internal { .. }
            | AppError::DatabaseConnectionFailed
            | AppError::DatabaseQueryFailed(_)
            | AppError::ConfigurationError { .. } => {
                tracing::error!(
                    correlation_id = %correlation_id,
                    error_code = %error_code,
                    error = %self,
                    "Server error occurred"
                );
            }
            AppError::ProviderTransient { provider, .. }
            | AppError::ProviderFatal { provider, .. } => {
                tracing::warn!(
                    correlation_id = %correlation_id,
                    error_code = %error_code,
                    provider = %provider,
                    error = %self,
                    "Provider error"
                );
            }
            _ => {
                tracing::info!(
                    correlation_id = %correlation_id,
                    error_code = %error_code,
                    error = %self,
                    "Client error occurred"
                );
            }
        }

        let error_response = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            message: user_message,
            details,
            correlation_id,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(error_response)).into_response()
    }
}

// Conversion implementations for common error types
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AppError::NotFound {
                resource: "Row".to_string(),
            },
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    AppError::DatabaseConstraintViolation("Unique constraint violation".to_string())
                } else if db_err.is_foreign_key_violation() {
                    AppError::DatabaseConstraintViolation(
                        "Foreign key constraint violation".to_string(),
                    )
                } else {
                    AppError::DatabaseQueryFailed(err)
                }
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                AppError::DatabaseConnectionFailed
            }
            _ => AppError::DatabaseQueryFailed(err),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::ValidationFailed(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal {
            message: Some(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidRequestFormat(format!("JSON error: {}", err))
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::InvalidRequestFormat(format!("UUID parsing error: {}", err))
    }
}

/// Result type alias for application errors
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_conflict_maps_to_conflict_status() {
        let err = AppError::LeaseConflict {
            holder: "crawler-a".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.error_code(), "LEASE_CONFLICT");
    }

    #[test]
    fn provider_transient_is_transient() {
        let err = AppError::ProviderTransient {
            provider: "openai".to_string(),
            message: "rate limited".to_string(),
        };
        assert!(err.is_transient());
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn provider_fatal_is_not_transient() {
        let err = AppError::ProviderFatal {
            provider: "openai".to_string(),
            message: "invalid api key".to_string(),
        };
        assert!(!err.is_transient());
    }
}
