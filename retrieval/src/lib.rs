//! # Retrieval
//!
//! Question/answer based semantic search over captured content.
//!
//! - **Indexing**: content is turned into QA pairs, each pair is embedded
//!   twice (question alone, question with answer) and stored encoded
//! - **Ranking**: brute-force top-K cosine similarity with a fixed
//!   low-confidence floor
//! - **Grouping**: one result per owning record, bucketed by quality
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       SemanticSearch                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  index_content ──► QaPairGenerator ──► EmbeddingProvider        │
//! │        │                                      │                 │
//! │        ▼                                      ▼                 │
//! │   SingleFlight                          codec::encode           │
//! │                                               │                 │
//! │                                               ▼                 │
//! │  search ──► EmbeddingProvider ──► rank ◄── QaStore              │
//! │                                    │                            │
//! │                                    ▼                            │
//! │                              group / classify                   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pagemark_embeddings::ResilientApiClient;
//! use pagemark_retrieval::{Config, InMemoryQaStore, SemanticSearch};
//!
//! let config = Config::load("pagemark.toml")?;
//! let client = Arc::new(ResilientApiClient::new(config.api.clone()));
//! let engine = SemanticSearch::with_client(client, Arc::new(InMemoryQaStore::new()), config.ranking);
//!
//! engine.index_content("page-42", &page_text).await?;
//! let results = engine.search("how do I configure retries?").await?;
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod ranker;
pub mod single_flight;
pub mod store;

pub use config::{Config, QualityThresholds, RankingConfig};
pub use engine::{EngineStats, SemanticSearch};
pub use error::{Result, RetrievalError};
pub use model::{
    EmbeddingVariant, QaItem, QualityBucket, RankedGroup, SearchResults, SimilarityMatch,
};
pub use ranker::{LOW_CONFIDENCE_FLOOR, group, rank};
pub use single_flight::SingleFlight;
pub use store::{InMemoryQaStore, JsonFileStore, QaStore};

// Re-export from dependencies for convenience
pub use pagemark_embeddings::{ApiConfig, EmbeddingProvider, QaPair, QaPairGenerator};
