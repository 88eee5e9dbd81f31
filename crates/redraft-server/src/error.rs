//! Error types for the HTTP surface.

use axum::http::StatusCode;
use axum::response::Json;
use redraft_core::EngineError;
use serde_json::json;
use thiserror::Error;

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Errors that can occur in the redraft server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Engine-level failure, mapped onto a status code per variant.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Server configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Create a new configuration error.
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::Engine(e) => match e {
                EngineError::InvalidInput(_) | EngineError::IndexOutOfRange { .. } => {
                    StatusCode::BAD_REQUEST
                }
                EngineError::SessionNotFound(_) => StatusCode::NOT_FOUND,
                EngineError::SessionClosed(_) => StatusCode::CONFLICT,
                EngineError::GenerationFailed(_) => StatusCode::BAD_GATEWAY,
                EngineError::GenerationTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                EngineError::StorageError(_)
                | EngineError::SerializationError(_)
                | EngineError::ConfigError(_)
                | EngineError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ServerError::Config(_) | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ServerError::Engine(e) => match e {
                EngineError::InvalidInput(_) => "invalid_input",
                EngineError::SessionNotFound(_) => "session_not_found",
                EngineError::SessionClosed(_) => "session_closed",
                EngineError::GenerationFailed(_) => "generation_failed",
                EngineError::GenerationTimeout { .. } => "generation_timeout",
                EngineError::IndexOutOfRange { .. } => "index_out_of_range",
                EngineError::StorageError(_) => "storage_error",
                EngineError::SerializationError(_) => "serialization_error",
                EngineError::ConfigError(_) => "config_error",
                EngineError::InternalError(_) => "internal_error",
            },
            ServerError::Config(_) => "config_error",
            ServerError::Internal(_) => "internal_error",
        }
    }

    /// True when the client may retry the identical request.
    pub fn is_retriable(&self) -> bool {
        matches!(self, ServerError::Engine(e) if e.is_retriable())
    }

    /// The JSON error body returned to clients.
    pub fn body(&self) -> Json<serde_json::Value> {
        Json(json!({
            "error": self.error_type(),
            "details": self.to_string(),
            "retriable": self.is_retriable(),
            "timestamp": chrono::Utc::now(),
        }))
    }

    pub fn into_response_parts(self) -> (StatusCode, Json<serde_json::Value>) {
        (self.status_code(), self.body())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_mapping() {
        let not_found: ServerError = EngineError::SessionNotFound("x".to_string()).into();
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(not_found.error_type(), "session_not_found");
        assert!(!not_found.is_retriable());

        let closed: ServerError = EngineError::SessionClosed("x".to_string()).into();
        assert_eq!(closed.status_code(), StatusCode::CONFLICT);

        let timeout: ServerError = EngineError::GenerationTimeout { timeout_secs: 60 }.into();
        assert_eq!(timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert!(timeout.is_retriable());

        let out_of_range: ServerError = EngineError::IndexOutOfRange { index: 5, len: 3 }.into();
        assert_eq!(out_of_range.status_code(), StatusCode::BAD_REQUEST);
    }
}
