//! Error types for the memory engine

use std::time::Duration;

use thiserror::Error;

/// Memory engine error types
#[derive(Error, Debug)]
pub enum MemoryError {
    /// The event failed validation; fatal to the call that produced it.
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    /// A condenser could not produce a valid result. Recovered by fallback.
    #[error("Condensation failed: {0}")]
    CondensationFailure(String),

    /// Long-term search could not run. Recovered as an empty result set.
    #[error("Long-term retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    /// A long-term memory write did not complete.
    #[error("Long-term persistence failed: {0}")]
    PersistenceFailure(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("LLM HTTP error ({provider}, status {status}): {message}")]
    LlmHttp {
        provider: String,
        status: u16,
        message: String,
        retry_after_secs: Option<u64>,
    },

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MemoryError {
    /// Whether a failed LLM call is worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            MemoryError::LlmHttp { status, .. } => *status == 429 || *status >= 500,
            MemoryError::Http(err) => err.is_timeout() || err.is_connect(),
            MemoryError::Llm(message) => {
                let lower = message.to_lowercase();
                lower.contains("rate limit") || lower.contains("overloaded")
            }
            _ => false,
        }
    }
}

/// Result type alias for memory engine operations
pub type Result<T> = std::result::Result<T, MemoryError>;
