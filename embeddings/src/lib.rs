//! # Embeddings
//!
//! Resilient access to OpenAI-compatible embedding and chat endpoints, plus
//! the vector utilities the retrieval layer builds on.
//!
//! ## Features
//!
//! - **Resilient client**: per-attempt timeouts, classified failures and
//!   exponential backoff with jitter for every remote call
//! - **Retry state machine**: a pure transition function plus an async driver
//!   with observer hooks and cooperative cancellation
//! - **Codec**: 16-bit fixed-point quantization stored as base64 text
//! - **Similarity**: cosine similarity with dimension checks
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    ResilientApiClient                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ApiConfig ──► run_with_retry ──► attempt (timeout) ──► HTTP    │
//! │                    │                                            │
//! │                    ▼                                            │
//! │             backoff::delay ◄── EmbeddingError::kind             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod backoff;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;
pub mod provider;
pub mod retry;
pub mod similarity;

pub use backoff::RetryPolicy;
pub use client::ResilientApiClient;
pub use codec::CompressionStats;
pub use config::ApiConfig;
pub use error::{EmbeddingError, FailureKind, Result};
pub use protocol::QaPair;
pub use provider::{EmbeddingProvider, QaPairGenerator};
pub use retry::{RetryEvent, RetryObserver, RetryOutcome, RetryState, TracingObserver};
pub use similarity::cosine_similarity;

/// A dense vector embedding.
pub type Embedding = Vec<f32>;

/// Dimension of embeddings (varies by model).
pub const DEFAULT_DIMENSION: usize = 1536; // text-embedding-3-small
