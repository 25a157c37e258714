//! Error types for ragline.
//!
//! One enum covers every failure category in the workspace. The engine
//! distinguishes the recoverable ones (`RetrievalUnavailable`,
//! `CacheUnavailable`) from the ones that end a request (`InvalidInput`,
//! `ModelStream`).

use thiserror::Error;

/// Unified error type for ragline.
///
/// All fallible functions in the workspace return `Result<T, AppError>`.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Rejected request input (empty question, empty namespace)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The embedding store could not be reached or searched
    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    /// The response cache store could not be reached
    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    /// Upstream generation failed before or during streaming
    #[error("Model stream error: {0}")]
    ModelStream(String),

    /// LLM provider setup and request errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Embedding store and indexing errors
    #[error("Knowledge error: {0}")]
    Knowledge(String),

    /// Prompt policy errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Whether the engine may recover from this error locally and keep the
    /// request alive.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AppError::RetrievalUnavailable(_) | AppError::CacheUnavailable(_)
        )
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_errors() {
        assert!(AppError::RetrievalUnavailable("down".into()).is_recoverable());
        assert!(AppError::CacheUnavailable("down".into()).is_recoverable());
        assert!(!AppError::ModelStream("boom".into()).is_recoverable());
        assert!(!AppError::InvalidInput("empty".into()).is_recoverable());
    }

    #[test]
    fn test_display_prefix() {
        let err = AppError::InvalidInput("question must not be empty".into());
        assert_eq!(err.to_string(), "Invalid input: question must not be empty");
    }
}
