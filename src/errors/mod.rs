// Error handling module
// Contains custom error types and error handling utilities

use thiserror::Error;

// Application error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Endpoint or API key missing. Never retried.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Network failure or non-2xx answer from the remote queue.
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Input rejected before it reached the network (blank text, non-Hebrew file, bad parameters).
    #[error("{0}")]
    ValidationError(String),

    /// The remote job finished with FAILED.
    #[error("Job failed: {0}")]
    JobFailure(String),

    #[error("Timeout: {0}")]
    TimeoutError(String),

    #[error("A generation is already in progress")]
    GenerationInProgress,

    #[error("Audio decode error: {0}")]
    AudioDecodeError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Configuration, validation and local IO problems will fail the same
    /// way on every attempt, everything else is worth another try.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            AppError::ConfigurationError(_) | AppError::ValidationError(_) | AppError::IoError(_)
        )
    }

    /// Short machine-readable kind, used in events.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::ConfigurationError(_) => "configuration",
            AppError::TransportError(_) => "transport",
            AppError::ValidationError(_) => "validation",
            AppError::JobFailure(_) => "job",
            AppError::TimeoutError(_) => "timeout",
            AppError::GenerationInProgress => "busy",
            AppError::AudioDecodeError(_) => "audio",
            AppError::IoError(_) => "io",
            AppError::SerializationError(_) => "serialization",
            AppError::Other(_) => "other",
        }
    }
}

// Реализация трейтов From для различных типов ошибок
impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::TransportError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::SerializationError(err.to_string())
    }
}

impl From<base64::DecodeError> for AppError {
    fn from(err: base64::DecodeError) -> Self {
        AppError::AudioDecodeError(format!("invalid base64 payload: {}", err))
    }
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        AppError::Other(err)
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        AppError::Other(err.to_string())
    }
}

// Result type alias for application
pub type AppResult<T> = Result<T, AppError>;
