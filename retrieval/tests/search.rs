//! End-to-end indexing and search with in-process providers.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use pagemark_embeddings::{Embedding, EmbeddingError, EmbeddingProvider, QaPair, QaPairGenerator};
use pagemark_retrieval::{
    InMemoryQaStore, JsonFileStore, QaStore, QualityBucket, RankingConfig, RetrievalError,
    SemanticSearch,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const KEYWORDS: [&str; 5] = ["rust", "borrow", "garden", "tomato", "retry"];

/// Embeds text as keyword counts, one dimension per keyword.
#[derive(Default)]
struct KeywordEmbedder {
    calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn name(&self) -> &str {
        "keywords"
    }

    async fn generate_embeddings(
        &self,
        texts: &[String],
    ) -> pagemark_embeddings::Result<Vec<Embedding>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|text| keyword_vector(text)).collect())
    }
}

fn keyword_vector(text: &str) -> Embedding {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    KEYWORDS
        .iter()
        .map(|keyword| words.iter().filter(|w| *w == keyword).count() as f32)
        .collect()
}

/// Reads one `question|answer` pair per line.
#[derive(Default)]
struct LineGenerator {
    calls: AtomicUsize,
    delay: Option<Duration>,
}

#[async_trait]
impl QaPairGenerator for LineGenerator {
    async fn generate_qa_pairs(&self, content: &str) -> pagemark_embeddings::Result<Vec<QaPair>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(content
            .lines()
            .filter_map(|line| line.split_once('|'))
            .map(|(question, answer)| QaPair {
                question: question.trim().to_string(),
                answer: answer.trim().to_string(),
            })
            .collect())
    }
}

struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn name(&self) -> &str {
        "failing"
    }

    async fn generate_embeddings(
        &self,
        _texts: &[String],
    ) -> pagemark_embeddings::Result<Vec<Embedding>> {
        Err(EmbeddingError::Server {
            status: 503,
            body: "unavailable".to_string(),
        })
    }
}

const RUST_PAGE: &str = "What is Rust?|A language with a borrow checker.\n\
What does the borrow checker do?|It enforces borrow rules at compile time.";

const GARDEN_PAGE: &str = "When should tomato seedlings go into the garden?|After the last frost.";

struct Fixture {
    engine: SemanticSearch,
    embedder: Arc<KeywordEmbedder>,
    generator: Arc<LineGenerator>,
    store: Arc<InMemoryQaStore>,
}

fn fixture(generator: LineGenerator, ranking: RankingConfig) -> Fixture {
    let embedder = Arc::new(KeywordEmbedder::default());
    let generator = Arc::new(generator);
    let store = Arc::new(InMemoryQaStore::new());
    let engine = SemanticSearch::new(embedder.clone(), generator.clone(), store.clone(), ranking);
    Fixture {
        engine,
        embedder,
        generator,
        store,
    }
}

#[tokio::test]
async fn indexed_content_is_found_by_meaning() {
    let f = fixture(LineGenerator::default(), RankingConfig::default());

    assert_eq!(f.engine.index_content("rust-page", RUST_PAGE).await.unwrap(), 2);
    assert_eq!(
        f.engine.index_content("garden-page", GARDEN_PAGE).await.unwrap(),
        1
    );

    let results = f.engine.search("rust").await.unwrap();

    assert_eq!(results.query, "rust");
    assert_eq!(results.groups.len(), 1);
    let best = &results.groups[0];
    assert_eq!(best.owner_id, "rust-page");
    assert_eq!(best.representative_item.question, "What is Rust?");
    assert_eq!(best.quality, QualityBucket::Excellent);
    assert!(results
        .matches
        .iter()
        .all(|m| m.item.owner_id == "rust-page" && m.score >= 0.5));
    assert!(results
        .matches
        .windows(2)
        .all(|pair| pair[0].score >= pair[1].score));
}

#[tokio::test]
async fn items_carry_both_encoded_variants() {
    let f = fixture(LineGenerator::default(), RankingConfig::default());
    f.engine.index_content("garden-page", GARDEN_PAGE).await.unwrap();

    let items = f.store.load_all().await.unwrap();
    assert_eq!(items.len(), 1);

    let question = pagemark_embeddings::codec::decode(&items[0].embedding_question).unwrap();
    let both = pagemark_embeddings::codec::decode(&items[0].embedding_both).unwrap();
    assert_eq!(question, vec![0.0, 0.0, 1.0, 1.0, 0.0]);
    assert_eq!(both, vec![0.0, 0.0, 1.0, 1.0, 0.0]);
    // One batch call for both variants.
    assert_eq!(f.embedder.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn reindexing_replaces_and_remove_deletes() {
    let f = fixture(LineGenerator::default(), RankingConfig::default());
    f.engine.index_content("rust-page", RUST_PAGE).await.unwrap();
    f.engine.index_content("garden-page", GARDEN_PAGE).await.unwrap();

    f.engine
        .index_content("rust-page", "Is retry supported?|Yes, with backoff.")
        .await
        .unwrap();

    let stats = f.engine.stats().await.unwrap();
    assert_eq!((stats.items, stats.owners), (2, 2));
    assert!(f.engine.search("rust").await.unwrap().is_empty());
    assert_eq!(f.engine.search("retry").await.unwrap().groups[0].owner_id, "rust-page");

    assert_eq!(f.engine.remove("rust-page").await.unwrap(), 1);
    assert_eq!(f.engine.remove("rust-page").await.unwrap(), 0);
    assert!(f.engine.search("retry").await.unwrap().is_empty());
}

#[tokio::test]
async fn content_without_pairs_stores_nothing() {
    let f = fixture(LineGenerator::default(), RankingConfig::default());
    f.engine.index_content("rust-page", RUST_PAGE).await.unwrap();

    assert_eq!(
        f.engine.index_content("rust-page", "no pairs here").await.unwrap(),
        0
    );
    assert_eq!(f.store.load_all().await.unwrap().len(), 2);
    assert_eq!(f.embedder.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_indexing_of_one_owner_runs_once() {
    let generator = LineGenerator {
        delay: Some(Duration::from_millis(100)),
        ..LineGenerator::default()
    };
    let f = fixture(generator, RankingConfig::default());

    let (first, second) = tokio::join!(
        f.engine.index_content("rust-page", RUST_PAGE),
        f.engine.index_content("rust-page", RUST_PAGE),
    );

    assert_eq!((first.unwrap(), second.unwrap()), (2, 2));
    assert_eq!(f.generator.calls.load(Ordering::SeqCst), 1);
    assert_eq!(f.store.load_all().await.unwrap().len(), 2);
    assert_eq!(f.engine.stats().await.unwrap().indexing_in_flight, 0);
}

#[tokio::test(start_paused = true)]
async fn concurrent_indexing_with_new_content_keeps_the_latest() {
    let generator = LineGenerator {
        delay: Some(Duration::from_millis(100)),
        ..LineGenerator::default()
    };
    let f = fixture(generator, RankingConfig::default());

    let (first, second) = tokio::join!(
        f.engine.index_content("rust-page", RUST_PAGE),
        f.engine
            .index_content("rust-page", "Is retry supported?|Yes, with backoff."),
    );

    assert_eq!((first.unwrap(), second.unwrap()), (2, 1));
    assert_eq!(f.generator.calls.load(Ordering::SeqCst), 2);

    let items = f.store.load_all().await.unwrap();
    let questions: Vec<&str> = items.iter().map(|item| item.question.as_str()).collect();
    assert_eq!(questions, vec!["Is retry supported?"]);
    assert_eq!(
        f.engine.search("retry").await.unwrap().groups[0].owner_id,
        "rust-page"
    );
    assert_eq!(f.engine.stats().await.unwrap().indexing_in_flight, 0);
}

#[tokio::test]
async fn unrelated_and_blank_queries_return_nothing() {
    let f = fixture(LineGenerator::default(), RankingConfig::default());
    f.engine.index_content("rust-page", RUST_PAGE).await.unwrap();
    let calls_after_index = f.embedder.calls.load(Ordering::SeqCst);

    // No keyword means a zero vector.
    assert!(f.engine.search("weather tomorrow").await.unwrap().is_empty());

    let blank = f.engine.search("   ").await.unwrap();
    assert!(blank.is_empty());
    assert!(blank.groups.is_empty());
    assert_eq!(
        f.embedder.calls.load(Ordering::SeqCst),
        calls_after_index + 1
    );
}

#[tokio::test]
async fn top_k_limits_matches() {
    let ranking = RankingConfig {
        top_k: 1,
        ..RankingConfig::default()
    };
    let f = fixture(LineGenerator::default(), ranking);
    f.engine.index_content("rust-page", RUST_PAGE).await.unwrap();

    let results = f.engine.search("borrow").await.unwrap();
    assert_eq!(results.matches.len(), 1);
    assert_eq!(results.groups.len(), 1);
}

#[tokio::test]
async fn embedding_failures_surface_and_store_is_untouched() {
    let store = Arc::new(InMemoryQaStore::new());
    let engine = SemanticSearch::new(
        Arc::new(FailingEmbedder),
        Arc::new(LineGenerator::default()),
        store.clone(),
        RankingConfig::default(),
    );

    let error = engine.index_content("rust-page", RUST_PAGE).await.unwrap_err();
    assert!(matches!(
        error.root(),
        RetrievalError::Embedding(EmbeddingError::Server { status: 503, .. })
    ));
    assert!(store.load_all().await.unwrap().is_empty());

    assert!(matches!(
        engine.search("rust").await,
        Err(RetrievalError::Embedding(_))
    ));
}

#[tokio::test]
async fn json_store_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("qa.json");

    {
        let store = Arc::new(JsonFileStore::open(&path).await.unwrap());
        let engine = SemanticSearch::new(
            Arc::new(KeywordEmbedder::default()),
            Arc::new(LineGenerator::default()),
            store,
            RankingConfig::default(),
        );
        engine.index_content("garden-page", GARDEN_PAGE).await.unwrap();
    }

    let store = Arc::new(JsonFileStore::open(&path).await.unwrap());
    let engine = SemanticSearch::new(
        Arc::new(KeywordEmbedder::default()),
        Arc::new(LineGenerator::default()),
        store,
        RankingConfig::default(),
    );

    let results = engine.search("tomato garden").await.unwrap();
    assert_eq!(results.groups.len(), 1);
    assert_eq!(results.groups[0].owner_id, "garden-page");
    assert_eq!(results.groups[0].quality, QualityBucket::Excellent);
}
