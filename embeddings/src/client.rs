//! Fault-tolerant client for OpenAI-compatible APIs.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::Embedding;
use crate::config::ApiConfig;
use crate::error::{EmbeddingError, Result};
use crate::protocol::{
    ChatMessage, ChatRequest, ChatResponse, EmbeddingData, EmbeddingsRequest, EmbeddingsResponse,
    QaPair, QaPairsPayload, ResponseFormat,
};
use crate::provider::{EmbeddingProvider, QaPairGenerator};
use crate::retry::{RetryObserver, TracingObserver, run_with_retry};

/// Instructions sent with every QA generation request.
pub const QA_SYSTEM_PROMPT: &str = "You turn web page content into study material for semantic search. \
Write between 3 and 8 question/answer pairs that a reader could ask about the page. \
Questions must be self-contained and specific; answers must be short and grounded only in the provided content. \
Reply with a JSON object of the form {\"pairs\": [{\"question\": \"...\", \"answer\": \"...\"}]} and nothing else.";

/// Error bodies longer than this are cut in error messages.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// HTTP client applying timeout, retry and backoff to every call.
pub struct ResilientApiClient {
    config: ApiConfig,
    api_key: Option<String>,
    client: reqwest::Client,
    observer: Arc<dyn RetryObserver>,
    cancel: Option<CancellationToken>,
}

impl ResilientApiClient {
    /// Create a client. The API key is resolved once, here.
    pub fn new(config: ApiConfig) -> Self {
        let api_key = config.resolve_api_key();
        Self {
            config,
            api_key,
            client: reqwest::Client::new(),
            observer: Arc::new(TracingObserver),
            cancel: None,
        }
    }

    /// Report retries to `observer` instead of the log.
    pub fn with_observer(mut self, observer: Arc<dyn RetryObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Abort in-flight attempts and backoff sleeps once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Check if an API key is available.
    pub fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    /// Embed a batch of texts in one request.
    ///
    /// The API may return items in any order; results are re-sorted by their
    /// `index` so they line up with `texts`. An empty batch makes no request
    /// but still requires an API key.
    pub async fn generate_embeddings(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        self.api_key()?;
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = self.config.embedding_model.as_str();
        debug!(
            "Generating batch embeddings for {} texts with model: {model}",
            texts.len()
        );

        let body = EmbeddingsRequest {
            model,
            input: texts,
        };
        let text = self.post_json("embeddings", &body).await?;

        let response: EmbeddingsResponse = serde_json::from_str(&text)
            .map_err(|e| EmbeddingError::MalformedResponse(format!("embeddings: {e}")))?;

        if let Some(usage) = &response.usage {
            debug!("Embedding request used {} tokens", usage.total_tokens);
        }

        let embeddings = order_by_index(response.data, texts.len())?;

        info!(
            "Generated {} batch embeddings ({} dimensions, model {})",
            embeddings.len(),
            embeddings.first().map(Vec::len).unwrap_or_default(),
            response.model.as_deref().unwrap_or(model)
        );

        Ok(embeddings)
    }

    /// Ask the chat endpoint for question/answer pairs about `content`.
    pub async fn generate_qa_pairs(&self, content: &str) -> Result<Vec<QaPair>> {
        let content = truncate_chars(content, self.config.max_content_chars);

        let body = ChatRequest {
            model: &self.config.chat_model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: QA_SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content,
                },
            ],
            response_format: ResponseFormat::json_object(),
            temperature: self
                .config
                .include_temperature
                .then_some(self.config.temperature),
        };

        debug!(
            "Requesting QA pairs for {} characters with model: {}",
            content.chars().count(),
            self.config.chat_model
        );

        let text = self.post_json("chat/completions", &body).await?;

        let response: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| EmbeddingError::MalformedResponse(format!("chat completion: {e}")))?;

        let message = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| {
                EmbeddingError::MalformedResponse("chat completion has no content".to_string())
            })?;

        let payload: QaPairsPayload = serde_json::from_str(&message)
            .map_err(|e| EmbeddingError::MalformedResponse(format!("QA pairs: {e}")))?;

        let pairs: Vec<QaPair> = payload
            .pairs
            .into_iter()
            .filter(|pair| !pair.question.trim().is_empty() && !pair.answer.trim().is_empty())
            .collect();

        info!("Generated {} QA pairs", pairs.len());
        Ok(pairs)
    }

    /// POST `body` to `path` under the retry policy and return the raw
    /// response text of the successful attempt.
    async fn post_json<B: Serialize>(&self, path: &str, body: &B) -> Result<String> {
        let api_key = self.api_key()?;

        let url = self.config.endpoint(path);
        let payload = serde_json::to_vec(body)
            .map_err(|e| EmbeddingError::Configuration(format!("unserializable request: {e}")))?;

        let outcome = run_with_retry(
            &self.config.retry,
            self.observer.as_ref(),
            self.cancel.as_ref(),
            |_| self.attempt(&url, api_key, &payload),
        )
        .await;

        debug!(
            "{url} finished in state {:?} after {} attempt(s)",
            outcome.state(),
            outcome.attempts()
        );
        outcome.into_result()
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            EmbeddingError::Configuration(
                "missing API key; set api.api_key or OPENAI_API_KEY".to_string(),
            )
        })
    }

    /// One HTTP attempt bounded by the configured timeout.
    async fn attempt(&self, url: &str, api_key: &str, payload: &[u8]) -> Result<String> {
        let request = async {
            let response = self
                .client
                .post(url)
                .header(AUTHORIZATION, format!("Bearer {api_key}"))
                .header(CONTENT_TYPE, "application/json")
                .body(payload.to_vec())
                .send()
                .await?;

            let status = response.status();
            let text = response.text().await?;

            if status.is_success() {
                Ok(text)
            } else {
                Err(EmbeddingError::from_status(
                    status.as_u16(),
                    truncate_chars(&text, MAX_ERROR_BODY_CHARS).to_string(),
                ))
            }
        };

        match tokio::time::timeout(self.config.request_timeout(), request).await {
            Ok(result) => result,
            Err(_) => Err(EmbeddingError::Timeout {
                timeout_ms: self.config.request_timeout_ms,
            }),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for ResilientApiClient {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    async fn generate_embeddings(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        ResilientApiClient::generate_embeddings(self, texts).await
    }
}

#[async_trait]
impl QaPairGenerator for ResilientApiClient {
    async fn generate_qa_pairs(&self, content: &str) -> Result<Vec<QaPair>> {
        ResilientApiClient::generate_qa_pairs(self, content).await
    }
}

/// Sort response items by `index` and check they cover `0..expected` with
/// non-empty vectors of one dimension.
fn order_by_index(mut data: Vec<EmbeddingData>, expected: usize) -> Result<Vec<Embedding>> {
    if data.is_empty() || data.iter().all(|item| item.embedding.is_empty()) {
        return Err(EmbeddingError::EmptyResponse);
    }
    if data.len() != expected {
        return Err(EmbeddingError::MalformedResponse(format!(
            "expected {expected} embeddings, got {}",
            data.len()
        )));
    }

    data.sort_by_key(|item| item.index);

    if let Some((position, item)) = data
        .iter()
        .enumerate()
        .find(|(position, item)| item.index != *position)
    {
        return Err(EmbeddingError::MalformedResponse(format!(
            "embedding index {} where {position} was expected",
            item.index
        )));
    }

    let dimension = data[0].embedding.len();
    if let Some(item) = data
        .iter()
        .find(|item| item.embedding.is_empty() || item.embedding.len() != dimension)
    {
        return Err(EmbeddingError::MalformedResponse(format!(
            "embedding {} has {} dimensions where {dimension} were expected",
            item.index,
            item.embedding.len()
        )));
    }

    Ok(data.into_iter().map(|item| item.embedding).collect())
}

/// Cut `text` to at most `max_chars` characters.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_offset, _)) => &text[..byte_offset],
        None => text,
    }
}
