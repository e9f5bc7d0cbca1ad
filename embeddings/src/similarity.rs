//! Similarity computation for embeddings.

use crate::error::{EmbeddingError, Result};

/// Compute the cosine similarity between two embeddings.
///
/// Returns a value between -1.0 and 1.0, where:
/// - 1.0 means identical direction
/// - 0.0 means orthogonal vectors, or that either vector has zero norm
/// - -1.0 means opposite vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(EmbeddingError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let magnitude_a = l2_norm(a);
    let magnitude_b = l2_norm(b);
    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return Ok(0.0);
    }

    Ok(dot(a, b) / (magnitude_a * magnitude_b))
}

/// Cosine similarity against a query whose norm is already known.
///
/// Callers must ensure equal lengths.
pub fn cosine_with_norm(query: &[f32], query_norm: f32, candidate: &[f32]) -> f32 {
    let candidate_norm = l2_norm(candidate);
    if query_norm == 0.0 || candidate_norm == 0.0 {
        return 0.0;
    }
    dot(query, candidate) / (query_norm * candidate_norm)
}

/// Euclidean length of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
