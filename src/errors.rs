//! Error types for Lexi
//!
//! One error enum for the library surface; binary entry points wrap it in
//! `anyhow` with context.

use thiserror::Error;

/// Main error type for the Lexi service
#[derive(Error, Debug)]
pub enum LexiError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Cache backend errors
    #[error("Cache error: {0}")]
    CacheError(String),

    /// User store errors
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Chat completion API errors
    #[error("OpenAI API error: {0}")]
    OpenAiError(String),

    /// Streaming errors
    #[error("Streaming error: {0}")]
    StreamingError(String),

    /// Vector search and reranking errors
    #[error("Retrieval error: {0}")]
    RetrievalError(String),

    /// Text extraction errors (PDF text layer, OCR)
    #[error("Extraction error: {0}")]
    ExtractionError(String),

    /// Attachment type is not one of pdf/png/jpg/jpeg
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// Authentication and session errors
    #[error("Authentication error: {0}")]
    AuthError(String),

    /// Blob mirror errors
    #[error("Sync error: {0}")]
    SyncError(String),

    /// Court form rendering errors
    #[error("Form error: {0}")]
    FormError(String),

    /// Agent exceeded its step budget
    #[error("Agent step limit of {limit} reached without a final answer")]
    RecursionLimit { limit: usize },

    /// Timeout errors
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Generic errors with context
    #[error("Lexi error: {0}")]
    Generic(String),
}

/// Result type alias for Lexi operations
pub type Result<T> = std::result::Result<T, LexiError>;

/// Convert anyhow errors to LexiError
impl From<anyhow::Error> for LexiError {
    fn from(err: anyhow::Error) -> Self {
        LexiError::Generic(format!("{:#}", err))
    }
}

impl From<redis::RedisError> for LexiError {
    fn from(err: redis::RedisError) -> Self {
        LexiError::CacheError(err.to_string())
    }
}

impl From<tokio_postgres::Error> for LexiError {
    fn from(err: tokio_postgres::Error) -> Self {
        LexiError::DatabaseError(err.to_string())
    }
}

impl LexiError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            LexiError::HttpError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            LexiError::StreamingError(_) | LexiError::Timeout { .. } => true,
            LexiError::OpenAiError(msg) => {
                msg.starts_with("HTTP 429") || msg.starts_with("HTTP 5")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LexiError::RecursionLimit { limit: 20 };
        assert!(err.to_string().contains("20"));

        let err = LexiError::UnsupportedFileType(".docx".to_string());
        assert!(err.to_string().contains(".docx"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(LexiError::OpenAiError("HTTP 429 Too Many Requests: slow down".into()).is_transient());
        assert!(LexiError::OpenAiError("HTTP 503 Service Unavailable: ".into()).is_transient());
        assert!(!LexiError::OpenAiError("HTTP 401 Unauthorized: bad key".into()).is_transient());
        assert!(LexiError::Timeout { duration_ms: 10 }.is_transient());
        assert!(!LexiError::ConfigError("x".into()).is_transient());
    }

    #[test]
    fn test_anyhow_conversion_keeps_context() {
        let err: LexiError = anyhow::anyhow!("inner").context("outer").into();
        let text = err.to_string();
        assert!(text.contains("outer"));
        assert!(text.contains("inner"));
    }
}
