//! Error types for the RAG pipeline

use thiserror::Error;

use crate::pipeline::Stage;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum Error {
    /// Empty or malformed input to the chunker. Local to one document.
    #[error("Invalid document '{document}': {reason}")]
    InvalidDocument { document: String, reason: String },

    /// Query issued against an index with no entries
    #[error("Vector index is empty; build it before querying")]
    EmptyIndex,

    /// A stage was skipped but its persisted artifact does not exist
    #[error("Missing artifact for stage '{stage}'; re-run with that stage enabled")]
    MissingArtifact { stage: Stage },

    /// A loaded artifact was built from different inputs than the current run
    #[error("Artifact for stage '{stage}' is stale; re-run with that stage enabled")]
    StaleArtifact { stage: Stage },

    /// The generation capability failed or timed out
    #[error("Answer generation unavailable: {0}")]
    GenerationUnavailable(String),

    /// An operation exceeded its deadline
    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Vectors of different dimensions were mixed
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Caller passed an unusable argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Embedding error
    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    /// Ollama/LLM error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML config parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an invalid document error
    pub fn invalid_document(document: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDocument {
            document: document.into(),
            reason: reason.into(),
        }
    }

    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding(message.into())
    }

    /// Create an LLM error
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether retrying the failed call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Http(_) | Error::Timeout(_) | Error::Llm(_) | Error::Embedding(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::llm("rate limited").is_transient());
        assert!(Error::Timeout(std::time::Duration::from_secs(1)).is_transient());
        assert!(!Error::EmptyIndex.is_transient());
        assert!(!Error::invalid_document("doc", "empty").is_transient());
    }

    #[test]
    fn test_missing_artifact_names_stage() {
        let err = Error::MissingArtifact { stage: Stage::Vectorize };
        assert!(err.to_string().contains("vectorize"));
    }
}
