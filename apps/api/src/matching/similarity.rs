//! Cosine similarity between embedding vectors.

use super::MatchError;

/// A similarity measure between two embedding vectors.
///
/// The recommender holds an `Arc<dyn SimilarityMetric>` so the measure can be
/// swapped (or observed in tests) without touching the ranking loop.
pub trait SimilarityMetric: Send + Sync {
    fn similarity(&self, a: &[f64], b: &[f64]) -> Result<f64, MatchError>;
}

/// Plain cosine similarity. No clamping, no rounding.
pub struct Cosine;

impl SimilarityMetric for Cosine {
    fn similarity(&self, a: &[f64], b: &[f64]) -> Result<f64, MatchError> {
        cosine_similarity(a, b)
    }
}

/// Dot product divided by the product of magnitudes, in [-1, 1].
///
/// Fails with `MatchError::Computation` for empty input, mismatched
/// dimensionality, or a zero-magnitude vector (the result would be NaN).
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> Result<f64, MatchError> {
    if a.is_empty() || b.is_empty() {
        return Err(MatchError::Computation("empty vector".to_string()));
    }
    if a.len() != b.len() {
        return Err(MatchError::Computation(format!(
            "dimension mismatch: {} vs {}",
            a.len(),
            b.len()
        )));
    }

    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denominator = norm_a.sqrt() * norm_b.sqrt();
    if denominator == 0.0 {
        return Err(MatchError::Computation(
            "zero-magnitude vector".to_string(),
        ));
    }

    let score = dot / denominator;
    if !score.is_finite() {
        return Err(MatchError::Computation(format!(
            "non-finite similarity {score}"
        )));
    }
    Ok(score)
}
