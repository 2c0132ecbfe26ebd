use crate::embedding::{l2_norm, Embedding};
use crate::error::MatchError;

/// Cosine similarity between two embeddings.
///
/// Both operands are normalized here, so raw extractor output can be passed
/// directly. A zero-norm operand scores 0.0. The result is clamped to
/// [-1.0, 1.0] to absorb rounding such as 1.0000001. Operands holding NaN or
/// infinite components have no defined score and are rejected.
pub fn similarity(a: &Embedding, b: &Embedding) -> Result<f32, MatchError> {
    if a.len() != b.len() {
        return Err(MatchError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    if !a.is_finite() || !b.is_finite() {
        return Err(MatchError::NonFiniteEmbedding);
    }

    let norm_a = l2_norm(a.iter().copied());
    let norm_b = l2_norm(b.iter().copied());
    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(&x, &y)| f64::from(x) * f64::from(y))
        .sum();

    let cosine = dot / (norm_a * norm_b);
    Ok((cosine as f32).clamp(-1.0, 1.0))
}
