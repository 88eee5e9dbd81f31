//! Error types for failure handling across the editing engine
//!
//! This module provides a unified error hierarchy covering every failure mode
//! of the session engine. Variants are split along the caller's recovery
//! options: input errors require a changed request, generation errors are
//! transient and safe to retry with the same message, and storage errors
//! indicate infrastructure trouble rather than a protocol violation.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum EngineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    #[error("Session is closed: {0}")]
    SessionClosed(String),
    #[error("Generation failed: {0}")]
    GenerationFailed(String),
    #[error("Generation timed out after {timeout_secs}s")]
    GenerationTimeout { timeout_secs: u64 },
    #[error("Version index {index} out of range (0..{len})")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl EngineError {
    /// True for failures the caller may retry by resending the same message.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            EngineError::GenerationFailed(_) | EngineError::GenerationTimeout { .. }
        )
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::SerializationError(err.to_string())
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::GenerationFailed(err.to_string())
    }
}
