//! Error types for the retrieval layer.

use std::sync::Arc;

use thiserror::Error;

/// Result type alias for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Errors that can occur in the retrieval layer.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Embedding or QA generation failed.
    #[error("embedding error: {0}")]
    Embedding(#[from] pagemark_embeddings::EmbeddingError),

    /// The store rejected or lost data.
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failure of an operation whose result was shared between callers.
    #[error("{0}")]
    Shared(Arc<RetrievalError>),
}

impl RetrievalError {
    /// The underlying error, looking through `Shared`.
    pub fn root(&self) -> &RetrievalError {
        match self {
            Self::Shared(inner) => inner.root(),
            other => other,
        }
    }
}
