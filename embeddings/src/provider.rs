//! Provider traits.
//!
//! The retrieval layer talks to these traits rather than to the HTTP client
//! directly, so hosts can swap in other backends and tests can use fakes.

use async_trait::async_trait;

use crate::Embedding;
use crate::error::Result;
use crate::protocol::QaPair;

/// Turns text into embeddings.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Get the name of this provider.
    fn name(&self) -> &str;

    /// Embed a batch of texts. Output order matches input order.
    async fn generate_embeddings(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    /// Embed a single text.
    async fn generate_embedding(&self, text: &str) -> Result<Embedding> {
        let mut embeddings = self.generate_embeddings(&[text.to_string()]).await?;
        embeddings
            .pop()
            .ok_or(crate::error::EmbeddingError::EmptyResponse)
    }
}

/// Produces question/answer pairs describing a piece of content.
#[async_trait]
pub trait QaPairGenerator: Send + Sync {
    async fn generate_qa_pairs(&self, content: &str) -> Result<Vec<QaPair>>;
}
