//! Top-K ranking of stored items against a query embedding.

use std::collections::HashMap;

use ordered_float::OrderedFloat;
use pagemark_embeddings::codec;
use pagemark_embeddings::similarity::{cosine_with_norm, l2_norm};
use tracing::debug;

use crate::config::QualityThresholds;
use crate::model::{EmbeddingVariant, QaItem, QualityBucket, RankedGroup, SimilarityMatch};

/// Matches scoring below this are dropped regardless of `k`.
pub const LOW_CONFIDENCE_FLOOR: f32 = 0.5;

/// Score every item's `question` and `both` embeddings against `query` and
/// return at most `k` matches in descending score order.
///
/// Candidates that fail to decode or whose dimension differs from the
/// query's are skipped. Equal scores keep corpus order.
pub fn rank(query: &[f32], corpus: &[QaItem], k: usize) -> Vec<SimilarityMatch> {
    if k == 0 || corpus.is_empty() {
        return Vec::new();
    }

    let query_norm = l2_norm(query);
    if query_norm == 0.0 {
        return Vec::new();
    }

    let mut skipped = 0usize;
    let mut scored: Vec<(OrderedFloat<f32>, &QaItem, EmbeddingVariant)> =
        Vec::with_capacity(corpus.len() * EmbeddingVariant::ALL.len());

    for item in corpus {
        for variant in EmbeddingVariant::ALL {
            let candidate = match codec::decode(item.embedding(variant)) {
                Ok(candidate) if candidate.len() == query.len() => candidate,
                Ok(_) | Err(_) => {
                    skipped += 1;
                    continue;
                }
            };

            let score = cosine_with_norm(query, query_norm, &candidate);
            if score.is_nan() {
                skipped += 1;
                continue;
            }
            scored.push((OrderedFloat(score), item, variant));
        }
    }

    if skipped > 0 {
        debug!("Skipped {skipped} candidates with unusable embeddings");
    }

    // `sort_by` is stable, so ties stay in corpus order.
    scored.sort_by(|a, b| b.0.cmp(&a.0));

    scored
        .into_iter()
        .take(k)
        .filter(|(score, _, _)| score.0 >= LOW_CONFIDENCE_FLOOR)
        .map(|(score, item, variant)| SimilarityMatch {
            item: item.clone(),
            variant,
            score: score.0,
        })
        .collect()
}

/// Collapse matches to one group per owner, keeping each owner's best match.
/// Groups are ordered by best score, descending.
pub fn group(matches: &[SimilarityMatch], thresholds: &QualityThresholds) -> Vec<RankedGroup> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<RankedGroup> = Vec::new();

    for m in matches {
        match positions.get(m.item.owner_id.as_str()) {
            Some(&position) => {
                let existing = &mut groups[position];
                if m.score > existing.best_score {
                    existing.best_score = m.score;
                    existing.representative_item = m.item.clone();
                }
            }
            None => {
                positions.insert(m.item.owner_id.as_str(), groups.len());
                groups.push(RankedGroup {
                    owner_id: m.item.owner_id.clone(),
                    best_score: m.score,
                    representative_item: m.item.clone(),
                    quality: QualityBucket::Poor,
                });
            }
        }
    }

    for group in &mut groups {
        group.quality = QualityBucket::classify(group.best_score, thresholds);
    }
    groups.sort_by(|a, b| OrderedFloat(b.best_score).cmp(&OrderedFloat(a.best_score)));
    groups
}
