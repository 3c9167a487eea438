//! Cosine similarity between label embeddings.

use crate::error::{Error, Result};

/// Cosine similarity of two vectors, accumulated in `f64`.
///
/// Fails with [`Error::EmptyVector`] if either side is empty and with
/// [`Error::DimensionMismatch`] if the lengths differ. A zero-norm vector
/// has similarity `0.0` with everything.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64> {
    if a.is_empty() || b.is_empty() {
        return Err(Error::EmptyVector);
    }
    if a.len() != b.len() {
        return Err(Error::DimensionMismatch {
            expected: a.len(),
            found: b.len(),
        });
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }
    Ok(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

/// Similarity of two optional embeddings; an absent side is an
/// [`Error::EmptyVector`].
pub fn similarity(a: Option<&[f32]>, b: Option<&[f32]>) -> Result<f64> {
    match (a, b) {
        (Some(a), Some(b)) => cosine_similarity(a, b),
        _ => Err(Error::EmptyVector),
    }
}
