//! Fixed-point embedding codec.
//!
//! Each component is clamped to `[-1, 1]`, scaled by 32767 and stored as a
//! little-endian `i16`; the byte buffer is base64 encoded (standard alphabet,
//! padded). Decoding is lossy by at most `1 / 32767` per component.

use std::sync::LazyLock;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::Embedding;
use crate::error::{EmbeddingError, Result};

const SCALE: f32 = 32767.0;

static BASE64_SHAPE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9+/]+=*$").ok());

/// Size comparison between textual and encoded forms of one embedding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressionStats {
    /// Bytes of a plain JSON array serialization.
    pub raw_size: usize,
    /// Bytes of the base64 encoding.
    pub encoded_size: usize,
    /// `raw_size / encoded_size`.
    pub ratio: f64,
}

/// Encode an embedding for storage.
pub fn encode(embedding: &[f32]) -> String {
    let mut bytes = Vec::with_capacity(embedding.len() * 2);
    for &value in embedding {
        bytes.extend_from_slice(&quantize(value).to_le_bytes());
    }
    STANDARD.encode(bytes)
}

/// Decode a stored embedding.
pub fn decode(encoded: &str) -> Result<Embedding> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| EmbeddingError::InvalidEncoding(e.to_string()))?;

    if bytes.len() % 2 != 0 {
        return Err(EmbeddingError::InvalidEncoding(format!(
            "odd byte length {}",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / SCALE)
        .collect())
}

/// Upper bound of `|decode(encode(e))[i] - clamp(e[i])|`.
pub fn max_quantization_error() -> f32 {
    1.0 / SCALE
}

/// Cheap shape check for stored values. Passing does not guarantee that
/// [`decode`] succeeds.
pub fn is_encoded_embedding(value: &str) -> bool {
    value.len() >= 4
        && BASE64_SHAPE
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(value))
}

/// Compare the encoded size against a naive decimal-text serialization.
pub fn compression_ratio(embedding: &[f32]) -> CompressionStats {
    let raw_size = serde_json::to_string(embedding)
        .map(|text| text.len())
        .unwrap_or_default();
    let encoded_size = encode(embedding).len();
    let ratio = if encoded_size == 0 {
        0.0
    } else {
        raw_size as f64 / encoded_size as f64
    };

    CompressionStats {
        raw_size,
        encoded_size,
        ratio,
    }
}

fn quantize(value: f32) -> i16 {
    // NaN has no meaningful position; store it as zero.
    if value.is_nan() {
        return 0;
    }
    (value.clamp(-1.0, 1.0) * SCALE).round() as i16
}
