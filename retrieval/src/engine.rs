//! Semantic search engine.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use pagemark_embeddings::{
    EmbeddingError, EmbeddingProvider, QaPair, QaPairGenerator, ResilientApiClient, codec,
};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::RankingConfig;
use crate::error::Result;
use crate::model::{QaItem, SearchResults, both_text};
use crate::ranker::{group, rank};
use crate::single_flight::SingleFlight;
use crate::store::QaStore;

/// Indexes content as question/answer pairs and searches it by meaning.
///
/// This is the entry point of the retrieval layer. It coordinates:
/// - QA pair generation for captured content
/// - Batch embedding of both variants of every pair
/// - Encoding and storage of the resulting items
/// - Query embedding, ranking and grouping
pub struct SemanticSearch {
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn QaPairGenerator>,
    store: Arc<dyn QaStore>,
    ranking: RankingConfig,
    /// Keyed by owner and content.
    indexing: SingleFlight<(String, String), usize>,
    owner_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SemanticSearch {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn QaPairGenerator>,
        store: Arc<dyn QaStore>,
        ranking: RankingConfig,
    ) -> Self {
        Self {
            embedder,
            generator,
            store,
            ranking,
            indexing: SingleFlight::new(),
            owner_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Use one API client for both embeddings and QA generation.
    pub fn with_client(
        client: Arc<ResilientApiClient>,
        store: Arc<dyn QaStore>,
        ranking: RankingConfig,
    ) -> Self {
        Self::new(client.clone(), client, store, ranking)
    }

    pub fn ranking(&self) -> &RankingConfig {
        &self.ranking
    }

    /// Generate, embed and store QA items for `content`, replacing whatever
    /// `owner_id` had before. Returns the number of items stored.
    ///
    /// Concurrent calls with the same owner and content share one run. Runs
    /// for one owner with different content execute one after another in
    /// call order, so the last caller's content is what stays stored.
    /// Content that yields no pairs leaves the store untouched and returns 0.
    pub async fn index_content(&self, owner_id: &str, content: &str) -> Result<usize> {
        let run = IndexRun {
            embedder: Arc::clone(&self.embedder),
            generator: Arc::clone(&self.generator),
            store: Arc::clone(&self.store),
            owner_lock: self.owner_lock(owner_id).await,
            owner_id: owner_id.to_string(),
            content: content.to_string(),
        };

        let result = self
            .indexing
            .run((owner_id.to_string(), content.to_string()), run.execute())
            .await;

        self.owner_locks
            .lock()
            .await
            .retain(|_, lock| Arc::strong_count(lock) > 1);
        result
    }

    async fn owner_lock(&self, owner_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.owner_locks.lock().await;
        Arc::clone(locks.entry(owner_id.to_string()).or_default())
    }

    /// Find stored items similar to `query`.
    pub async fn search(&self, query: &str) -> Result<SearchResults> {
        if query.trim().is_empty() {
            return Ok(SearchResults::empty(query));
        }

        debug!("Processing query: {query}");

        let query_embedding = self.embedder.generate_embedding(query).await?;
        let corpus = self.store.load_all().await?;

        let matches = rank(&query_embedding, &corpus, self.ranking.top_k);
        let groups = group(&matches, &self.ranking.thresholds);

        info!(
            "Query matched {} items across {} owners (corpus {})",
            matches.len(),
            groups.len(),
            corpus.len()
        );

        Ok(SearchResults {
            query: query.to_string(),
            matches,
            groups,
        })
    }

    /// Delete every item of `owner_id`.
    pub async fn remove(&self, owner_id: &str) -> Result<usize> {
        let removed = self.store.delete_owner(owner_id).await?;
        debug!("Removed {removed} items of {owner_id}");
        Ok(removed)
    }

    /// Get engine statistics.
    pub async fn stats(&self) -> Result<EngineStats> {
        let items = self.store.load_all().await?;
        let owners: HashSet<&str> = items.iter().map(|item| item.owner_id.as_str()).collect();

        Ok(EngineStats {
            items: items.len(),
            owners: owners.len(),
            indexing_in_flight: self.indexing.in_flight(),
        })
    }
}

/// Owned state of one indexing run, so it can outlive the caller that
/// started it.
struct IndexRun {
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn QaPairGenerator>,
    store: Arc<dyn QaStore>,
    owner_lock: Arc<Mutex<()>>,
    owner_id: String,
    content: String,
}

impl IndexRun {
    async fn execute(self) -> Result<usize> {
        let _owner = self.owner_lock.lock().await;

        let pairs = self.generator.generate_qa_pairs(&self.content).await?;
        if pairs.is_empty() {
            info!("No QA pairs generated for {}", self.owner_id);
            return Ok(0);
        }

        let texts = embedding_inputs(&pairs);
        let embeddings = self.embedder.generate_embeddings(&texts).await?;
        if embeddings.len() != texts.len() {
            return Err(EmbeddingError::MalformedResponse(format!(
                "{} returned {} embeddings for {} texts",
                self.embedder.name(),
                embeddings.len(),
                texts.len()
            ))
            .into());
        }

        let (questions, both) = embeddings.split_at(pairs.len());
        let items: Vec<QaItem> = pairs
            .into_iter()
            .zip(questions.iter().zip(both))
            .map(|(pair, (question, both))| QaItem {
                owner_id: self.owner_id.clone(),
                question: pair.question,
                answer: pair.answer,
                embedding_question: codec::encode(question),
                embedding_both: codec::encode(both),
            })
            .collect();

        let count = items.len();
        self.store.replace_owner(&self.owner_id, items).await?;

        info!("Indexed {count} QA items for {}", self.owner_id);
        Ok(count)
    }
}

/// All questions, then every `question\nanswer`, in pair order.
fn embedding_inputs(pairs: &[QaPair]) -> Vec<String> {
    pairs
        .iter()
        .map(|pair| pair.question.clone())
        .chain(pairs.iter().map(|pair| both_text(&pair.question, &pair.answer)))
        .collect()
}

/// Statistics about the search engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    /// Number of stored QA items.
    pub items: usize,

    /// Number of distinct owners.
    pub owners: usize,

    /// Indexing runs currently in flight.
    pub indexing_in_flight: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_embedding_inputs_layout() {
        let pairs = vec![
            QaPair {
                question: "Q1".to_string(),
                answer: "A1".to_string(),
            },
            QaPair {
                question: "Q2".to_string(),
                answer: "A2".to_string(),
            },
        ];

        assert_eq!(
            embedding_inputs(&pairs),
            vec!["Q1", "Q2", "Q1\nA1", "Q2\nA2"]
        );
    }
}
