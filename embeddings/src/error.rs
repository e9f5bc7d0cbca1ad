//! Error types for the embeddings system.

use thiserror::Error;

/// Result type alias for embedding operations.
pub type Result<T> = std::result::Result<T, EmbeddingError>;

/// Errors that can occur in the embeddings system.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// Missing credential or otherwise unusable configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// HTTP 4xx other than 429.
    #[error("API rejected request with status {status}: {body}")]
    Client { status: u16, body: String },

    /// HTTP 429.
    #[error("rate limit exceeded: {body}")]
    RateLimited { body: String },

    /// HTTP 5xx.
    #[error("API server error {status}: {body}")]
    Server { status: u16, body: String },

    /// The attempt did not finish within the configured timeout.
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Transport failure (connect, TLS, body read).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Response body could not be interpreted.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Response parsed but carried no usable data.
    #[error("API returned no usable data")]
    EmptyResponse,

    /// Dimension mismatch.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Stored embedding text is not a valid encoding.
    #[error("invalid encoded embedding: {0}")]
    InvalidEncoding(String),

    /// Retry budget spent; carries the last observed error.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<EmbeddingError>,
    },

    /// The call was cancelled through its cancellation token.
    #[error("request cancelled")]
    Cancelled,
}

/// How the retry loop treats a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Surface immediately without consuming a retry.
    Fatal,
    /// Retry after backoff. Rate-limited failures back off harder.
    Retryable { rate_limited: bool },
}

impl EmbeddingError {
    /// Classify this error for the retry state machine.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::RateLimited { .. } => FailureKind::Retryable { rate_limited: true },
            Self::Server { .. } | Self::Timeout { .. } | Self::Network(_) => {
                FailureKind::Retryable {
                    rate_limited: false,
                }
            }
            _ => FailureKind::Fatal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), FailureKind::Retryable { .. })
    }

    /// The underlying error, looking through `Exhausted`.
    pub fn root(&self) -> &EmbeddingError {
        match self {
            Self::Exhausted { last, .. } => last.root(),
            other => other,
        }
    }

    /// Map a non-success HTTP status and its body to an error.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            429 => Self::RateLimited { body },
            500..=599 => Self::Server { status, body },
            _ => Self::Client { status, body },
        }
    }
}
