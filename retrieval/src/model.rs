//! Stored items and search results.

use serde::{Deserialize, Serialize};

use crate::config::QualityThresholds;

/// One generated question/answer pair with both embedding variants, as
/// persisted. Embeddings are kept in their encoded text form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaItem {
    /// Identifier of the content record this pair was generated from.
    pub owner_id: String,
    pub question: String,
    pub answer: String,
    /// Encoded embedding of the question alone.
    pub embedding_question: String,
    /// Encoded embedding of `question + "\n" + answer`.
    pub embedding_both: String,
}

impl QaItem {
    /// Encoded embedding for `variant`.
    pub fn embedding(&self, variant: EmbeddingVariant) -> &str {
        match variant {
            EmbeddingVariant::Question => &self.embedding_question,
            EmbeddingVariant::Both => &self.embedding_both,
        }
    }

    /// Text that was embedded for `variant`.
    pub fn embedded_text(&self, variant: EmbeddingVariant) -> String {
        match variant {
            EmbeddingVariant::Question => self.question.clone(),
            EmbeddingVariant::Both => both_text(&self.question, &self.answer),
        }
    }
}

/// Text embedded for the `both` variant.
pub fn both_text(question: &str, answer: &str) -> String {
    format!("{question}\n{answer}")
}

/// Which of an item's two embeddings produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingVariant {
    Question,
    Both,
}

impl EmbeddingVariant {
    /// Candidate expansion order for one item.
    pub const ALL: [EmbeddingVariant; 2] = [EmbeddingVariant::Question, EmbeddingVariant::Both];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Question => "question",
            Self::Both => "both",
        }
    }
}

/// Confidence bucket of a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityBucket {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl QualityBucket {
    /// Bucket `score` using `thresholds`. Boundaries are inclusive.
    pub fn classify(score: f32, thresholds: &QualityThresholds) -> Self {
        if score >= thresholds.excellent {
            Self::Excellent
        } else if score >= thresholds.good {
            Self::Good
        } else if score >= thresholds.fair {
            Self::Fair
        } else {
            Self::Poor
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
        }
    }
}

/// A scored candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityMatch {
    pub item: QaItem,
    pub variant: EmbeddingVariant,
    /// Cosine similarity to the query.
    pub score: f32,
}

/// Best match of one owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedGroup {
    pub owner_id: String,
    pub best_score: f32,
    pub representative_item: QaItem,
    pub quality: QualityBucket,
}

/// Response of one search request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub query: String,
    /// Matches in descending score order.
    pub matches: Vec<SimilarityMatch>,
    /// One group per owner, best first.
    pub groups: Vec<RankedGroup>,
}

impl SearchResults {
    pub fn empty(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            matches: Vec::new(),
            groups: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_classify_boundaries_are_inclusive() {
        let thresholds = QualityThresholds::default();
        assert_eq!(
            QualityBucket::classify(0.9, &thresholds),
            QualityBucket::Excellent
        );
        assert_eq!(
            QualityBucket::classify(0.89, &thresholds),
            QualityBucket::Good
        );
        assert_eq!(QualityBucket::classify(0.7, &thresholds), QualityBucket::Good);
        assert_eq!(QualityBucket::classify(0.5, &thresholds), QualityBucket::Fair);
        assert_eq!(QualityBucket::classify(0.49, &thresholds), QualityBucket::Poor);
    }

    #[test]
    fn test_both_variant_text() {
        let item = QaItem {
            owner_id: "page-1".to_string(),
            question: "Q?".to_string(),
            answer: "A.".to_string(),
            embedding_question: "AAAA".to_string(),
            embedding_both: "BBBB".to_string(),
        };
        assert_eq!(item.embedded_text(EmbeddingVariant::Both), "Q?\nA.");
        assert_eq!(item.embedding(EmbeddingVariant::Both), "BBBB");
        assert_eq!(item.embedding(EmbeddingVariant::Question), "AAAA");
    }

    #[test]
    fn test_serialized_names() {
        assert_eq!(
            serde_json::to_string(&EmbeddingVariant::Both).unwrap(),
            "\"both\""
        );
        assert_eq!(
            serde_json::to_string(&QualityBucket::Excellent).unwrap(),
            "\"excellent\""
        );
    }
}
