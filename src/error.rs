use crate::api::ApiResponse;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Referenced incident id does not resolve to a stored record
    #[error("Incident not found")]
    IncidentNotFound(String),

    /// Key-value backend errors
    #[error("Database error: {0}")]
    Database(String),

    /// Malformed request bodies
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Request exceeded the server's time budget
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Compare-and-swap on an index key kept losing to concurrent writers
    #[error("Index update for '{key}' abandoned after {attempts} conflicting attempts")]
    IndexContention { key: String, attempts: u32 },

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::IncidentNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            AppError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::IndexContention { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            AppError::IncidentNotFound(_) => "NOT_FOUND",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Timeout(_) => "TIMEOUT",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::IndexContention { .. } => "INDEX_CONTENTION",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether this is a domain-level miss rather than an infrastructure failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::IncidentNotFound(_))
    }
}

/// Convert AppError to the `{ success: false, error }` envelope
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(
                error_code = error_code,
                status_code = status.as_u16(),
                message = %message,
                "Request error"
            );
        } else {
            tracing::warn!(
                error_code = error_code,
                status_code = status.as_u16(),
                message = %message,
                "Request rejected"
            );
        }

        (status, Json(ApiResponse::<()>::failure(message))).into_response()
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

impl From<sled::Error> for AppError {
    fn from(err: sled::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::Database(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            AppError::IncidentNotFound("incident_1".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Validation("test".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Database("disk gone".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::Timeout("30s".to_string()).status_code(),
            StatusCode::REQUEST_TIMEOUT
        );
        assert_eq!(
            AppError::IndexContention {
                key: "active_incidents".to_string(),
                attempts: 3
            }
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_not_found_message_is_fixed() {
        let err = AppError::IncidentNotFound("incident_123_abc".to_string());
        assert_eq!(err.to_string(), "Incident not found");
        assert!(err.is_not_found());
        assert!(!AppError::Internal("boom".to_string()).is_not_found());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AppError::IncidentNotFound("x".to_string()).error_code(),
            "NOT_FOUND"
        );
        assert_eq!(
            AppError::Validation("test".to_string()).error_code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(
            AppError::Serialization("bad".to_string()).error_code(),
            "SERIALIZATION_ERROR"
        );
    }

    #[tokio::test]
    async fn test_into_response_renders_envelope() {
        let response = AppError::IncidentNotFound("incident_1".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Incident not found");
        assert!(body.get("data").is_none());
    }
}
