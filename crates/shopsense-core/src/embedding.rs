//! Vector utilities and the deterministic fallback embedding.
//!
//! Stored vectors are L2-normalized to unit length so cosine similarity
//! reduces to a dot product. The persisted wire format is a JSON array of
//! `f32` ([`vector_to_json`] / [`vector_from_json`]).
//!
//! [`fallback_vector`] is a pure text→vector map used when the embedding
//! service is unreachable or a product lacks a precomputed vector. Its
//! cosine scores are poor relative to real sentence embeddings; the ranker
//! compensates with feature scores and the keyword-match boost.

use crate::error::{Error, Result};

/// Reference embedding dimension (all-MiniLM-L6-v2).
pub const DEFAULT_DIMS: usize = 384;

/// Tolerance on |v|₂ for the unit-norm invariant.
pub const UNIT_NORM_EPSILON: f32 = 1e-6;

/// Compute cosine similarity between two vectors.
///
/// Returns `0.0` for empty, zero, or dimension-mismatched inputs — never
/// an error, so a single malformed record cannot fail a whole scan.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Scale a vector to unit L2 length in place. Zero vectors are left as-is.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm < f32::EPSILON {
        return;
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
}

/// Whether |v|₂ ∈ [1 − ε, 1 + ε].
pub fn is_unit_norm(v: &[f32]) -> bool {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    (norm - 1.0).abs() <= UNIT_NORM_EPSILON
}

/// Deterministic fallback embedding.
///
/// Stable across restarts and processes, L2-normalized, O(|text|·dims):
/// lowercase the text, then for each output index `i`
///
/// ```text
/// v[i] = tanh(0.001 · Σⱼ codepoint(tⱼ) · sin(0.01·(i+1)·(j+1)))
/// ```
///
/// followed by L2 normalization. An empty text yields the zero vector,
/// which cosine treats as similarity 0 everywhere.
pub fn fallback_vector(text: &str, dims: usize) -> Vec<f32> {
    let codepoints: Vec<f64> = text
        .to_lowercase()
        .chars()
        .map(|c| c as u32 as f64)
        .collect();

    let mut v = vec![0.0f32; dims];
    for (i, out) in v.iter_mut().enumerate() {
        let mut acc = 0.0f64;
        for (j, cp) in codepoints.iter().enumerate() {
            acc += cp * (0.01 * (i as f64 + 1.0) * (j as f64 + 1.0)).sin();
        }
        *out = (0.001 * acc).tanh() as f32;
    }
    l2_normalize(&mut v);
    v
}

/// Encode a vector as the persisted JSON array format.
pub fn vector_to_json(v: &[f32]) -> String {
    serde_json::to_string(v).unwrap_or_else(|_| "[]".to_string())
}

/// Decode the persisted JSON array format back into a vector.
pub fn vector_from_json(s: &str) -> Result<Vec<f32>> {
    serde_json::from_str(s)
        .map_err(|e| Error::Internal(format!("malformed embedding vector: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_identical_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn cosine_opposite_is_negative_one() {
        let a = vec![0.6, 0.8];
        let b = vec![-0.6, -0.8];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-5);
    }

    #[test]
    fn cosine_zero_vector_is_zero() {
        let a = vec![1.0, 0.0];
        let z = vec![0.0, 0.0];
        assert_eq!(cosine_similarity(&a, &z), 0.0);
    }

    #[test]
    fn cosine_dimension_mismatch_is_zero() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![1.0, 2.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn normalize_produces_unit_length() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!(is_unit_norm(&v));
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn normalize_leaves_zero_vector() {
        let mut v = vec![0.0, 0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
        assert!(!is_unit_norm(&v));
    }

    #[test]
    fn fallback_is_stable_and_unit_norm() {
        let a = fallback_vector("wireless bluetooth headphones", DEFAULT_DIMS);
        let b = fallback_vector("wireless bluetooth headphones", DEFAULT_DIMS);
        assert_eq!(a, b);
        assert_eq!(a.len(), DEFAULT_DIMS);
        assert!(is_unit_norm(&a));
    }

    #[test]
    fn fallback_is_case_insensitive() {
        let a = fallback_vector("Desk Lamp", 64);
        let b = fallback_vector("desk lamp", 64);
        assert_eq!(a, b);
    }

    #[test]
    fn fallback_distinguishes_texts() {
        let a = fallback_vector("ergonomic office chair", 64);
        let b = fallback_vector("stainless steel kettle", 64);
        assert!(cosine_similarity(&a, &b) < 0.999);
    }

    #[test]
    fn fallback_empty_text_is_zero_vector() {
        let v = fallback_vector("", 16);
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn json_roundtrip() {
        let v = vec![0.25f32, -0.5, 0.125];
        let json = vector_to_json(&v);
        assert_eq!(vector_from_json(&json).unwrap(), v);
    }

    #[test]
    fn json_rejects_garbage() {
        assert!(vector_from_json("not json").is_err());
    }
}
