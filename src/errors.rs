//! Error types for the role-filtered retrieval pipeline
//!
//! Failures are kept distinct from the "no authorized material" outcome:
//! an empty context is a successful result, never one of these variants.

use thiserror::Error;

/// Main error type for the RAG pipeline
#[derive(Error, Debug)]
pub enum RagError {
    /// Role identifier is not part of the closed role enumeration
    #[error("Unknown role: {role}")]
    UnknownRole { role: String },

    /// Query could not be vectorized
    #[error("Embedding failed: {0}")]
    Embedding(String),

    /// Search backend unreachable or returned an error
    #[error("Embedding index unavailable: {0}")]
    IndexUnavailable(String),

    /// An external call exceeded its time budget
    #[error("{stage} timed out after {duration_ms}ms")]
    RetrievalTimeout { stage: String, duration_ms: u64 },

    /// Downstream model call failed
    #[error("Generation failed: {0}")]
    Generation(String),

    /// Caller aborted the request
    #[error("Request cancelled")]
    Cancelled,

    /// Policy registry failed a construction invariant
    #[error("Policy error: {0}")]
    PolicyError(String),

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
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, RagError>;

impl RagError {
    /// Whether the caller may retry the request.
    ///
    /// Only availability failures qualify. Unknown roles, embedding and
    /// generation failures are surfaced as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RagError::IndexUnavailable(_) | RagError::RetrievalTimeout { .. }
        )
    }

    pub fn unknown_role(role: impl Into<String>) -> Self {
        RagError::UnknownRole { role: role.into() }
    }

    pub fn timeout(stage: impl Into<String>, duration_ms: u64) -> Self {
        RagError::RetrievalTimeout {
            stage: stage.into(),
            duration_ms,
        }
    }
}
