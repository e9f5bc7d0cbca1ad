//! Configuration for the API client.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::RetryPolicy;
use crate::error::{EmbeddingError, Result};

/// Environment variable consulted when no key is configured.
pub const API_KEY_ENV_VAR: &str = "OPENAI_API_KEY";

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

/// Settings for talking to an OpenAI-compatible API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ApiConfig {
    /// API base URL, without a trailing `/embeddings` or `/chat/completions`.
    pub base_url: String,

    /// Bearer credential. Falls back to `OPENAI_API_KEY` when unset.
    pub api_key: Option<String>,

    pub embedding_model: String,

    pub chat_model: String,

    /// Per-attempt timeout.
    pub request_timeout_ms: u64,

    /// Content longer than this many characters is cut before QA generation.
    pub max_content_chars: usize,

    /// Whether chat requests carry `temperature`. Some models reject it.
    pub include_temperature: bool,

    pub temperature: f32,

    pub retry: RetryPolicy,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            request_timeout_ms: 30_000,
            max_content_chars: 8_000,
            include_temperature: true,
            temperature: 0.3,
            retry: RetryPolicy::default(),
        }
    }
}

impl ApiConfig {
    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// The configured key, or the environment fallback. Empty strings count
    /// as missing.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV_VAR).ok())
            .filter(|key| !key.trim().is_empty())
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(EmbeddingError::Configuration(
                "api.base_url must not be empty".to_string(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(EmbeddingError::Configuration(
                "api.request_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.max_content_chars == 0 {
            return Err(EmbeddingError::Configuration(
                "api.max_content_chars must be greater than 0".to_string(),
            ));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(EmbeddingError::Configuration(format!(
                "api.retry.max_delay_ms ({}) is below base_delay_ms ({})",
                self.retry.max_delay_ms, self.retry.base_delay_ms
            )));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(EmbeddingError::Configuration(format!(
                "api.temperature must be between 0.0 and 2.0, got {}",
                self.temperature
            )));
        }
        Ok(())
    }

    /// Join `path` onto the base URL.
    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ApiConfig::default().validate().is_ok());
    }

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let config = ApiConfig::default().with_base_url("http://localhost:8080/v1/");
        assert_eq!(
            config.endpoint("embeddings"),
            "http://localhost:8080/v1/embeddings"
        );
    }

    #[test]
    fn test_blank_key_counts_as_missing() {
        let config = ApiConfig::default().with_api_key("   ");
        assert_eq!(config.resolve_api_key(), None);
    }

    #[test]
    fn test_rejects_inverted_delays() {
        let config = ApiConfig::default().with_retry(RetryPolicy::new(3, 500, 100));
        assert!(matches!(
            config.validate(),
            Err(EmbeddingError::Configuration(_))
        ));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let result: std::result::Result<ApiConfig, _> =
            serde_json::from_str(r#"{"base_url":"http://x","retries":3}"#);
        assert!(result.is_err());
    }
}
