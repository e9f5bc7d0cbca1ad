//! Configuration for the retrieval layer.
//!
//! Loaded from TOML:
//!
//! ```toml
//! [api]
//! base_url = "https://api.openai.com/v1"
//! embedding_model = "text-embedding-3-small"
//!
//! [api.retry]
//! max_retries = 3
//!
//! [ranking]
//! top_k = 10
//!
//! [ranking.thresholds]
//! excellent = 0.9
//! good = 0.7
//! fair = 0.5
//! ```

use std::path::Path;

use pagemark_embeddings::ApiConfig;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RetrievalError};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Remote API settings.
    pub api: ApiConfig,

    /// Search ranking settings.
    pub ranking: RankingConfig,
}

impl Config {
    /// Read and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
            .map_err(|e| RetrievalError::Config(format!("{}: {e}", path.display())))
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| RetrievalError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.api
            .validate()
            .map_err(|e| RetrievalError::Config(e.to_string()))?;
        self.ranking.validate()
    }
}

/// Configuration for ranking search results.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RankingConfig {
    /// Maximum number of matches per search.
    pub top_k: usize,

    /// Quality bucket boundaries.
    pub thresholds: QualityThresholds,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            thresholds: QualityThresholds::default(),
        }
    }
}

impl RankingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(RetrievalError::Config(
                "ranking.top_k must be greater than 0".to_string(),
            ));
        }
        self.thresholds.validate()
    }
}

/// Lower bounds of the quality buckets. Scores below `fair` are poor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct QualityThresholds {
    pub excellent: f32,
    pub good: f32,
    pub fair: f32,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            excellent: 0.9,
            good: 0.7,
            fair: 0.5,
        }
    }
}

impl QualityThresholds {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("excellent", self.excellent),
            ("good", self.good),
            ("fair", self.fair),
        ] {
            if !(-1.0..=1.0).contains(&value) {
                return Err(RetrievalError::Config(format!(
                    "ranking.thresholds.{name} must be within [-1, 1], got {value}"
                )));
            }
        }
        if !(self.excellent >= self.good && self.good >= self.fair) {
            return Err(RetrievalError::Config(format!(
                "ranking.thresholds must satisfy excellent >= good >= fair, got {} / {} / {}",
                self.excellent, self.good, self.fair
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = Config::from_toml_str(
            r#"
            [api]
            base_url = "http://localhost:8080/v1"
            include_temperature = false

            [api.retry]
            max_retries = 5

            [ranking]
            top_k = 3

            [ranking.thresholds]
            excellent = 0.95
            "#,
        )
        .unwrap();

        assert_eq!(config.api.base_url, "http://localhost:8080/v1");
        assert!(!config.api.include_temperature);
        assert_eq!(config.api.retry.max_retries, 5);
        assert_eq!(config.api.retry.base_delay_ms, 1000);
        assert_eq!(config.ranking.top_k, 3);
        assert_eq!(config.ranking.thresholds.excellent, 0.95);
        assert_eq!(config.ranking.thresholds.good, 0.7);
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        for text in [
            "verbose = true",
            "[api]\nretries = 3",
            "[ranking]\nmax = 3",
            "[ranking.thresholds]\nperfect = 1.0",
        ] {
            assert!(
                matches!(Config::from_toml_str(text), Err(RetrievalError::Config(_))),
                "accepted {text:?}"
            );
        }
    }

    #[test]
    fn test_out_of_order_thresholds_are_rejected() {
        let result = Config::from_toml_str("[ranking.thresholds]\ngood = 0.95");
        assert!(matches!(result, Err(RetrievalError::Config(_))));
    }

    #[test]
    fn test_zero_top_k_is_rejected() {
        let result = Config::from_toml_str("[ranking]\ntop_k = 0");
        assert!(matches!(result, Err(RetrievalError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[ranking]\ntop_k = 7").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.ranking.top_k, 7);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(dir.path().join("absent.toml"));
        assert!(matches!(result, Err(RetrievalError::Io(_))));
    }
}
