//! Brute-force nearest neighbour search for the in-memory store.

use rag_core::{RagError, Result};

/// Cosine distance `1 - cos(a, b)`; 1.0 when either vector is zero.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }

    1.0 - dot / (norm_a * norm_b)
}

/// Positions of the `k` closest vectors with their distances, closest first.
///
/// Equal distances keep the order of `vectors`.
pub(crate) fn nearest<'a, I>(query: &[f32], vectors: I, k: usize) -> Result<Vec<(usize, f32)>>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let mut ranked = Vec::new();
    for (position, vector) in vectors.into_iter().enumerate() {
        if vector.len() != query.len() {
            return Err(RagError::vector_store(format!(
                "Embedding dimension mismatch: query has {}, stored entry {} has {}",
                query.len(),
                position,
                vector.len()
            )));
        }
        ranked.push((position, cosine_distance(query, vector)));
    }

    ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
    ranked.truncate(k);
    Ok(ranked)
}

/// Check the three `add` inputs line up.
pub(crate) fn check_aligned(texts: usize, embeddings: usize, metadatas: usize) -> Result<()> {
    if texts != embeddings || texts != metadatas {
        return Err(RagError::vector_store(format!(
            "texts, embeddings and metadatas must have the same length ({}, {}, {})",
            texts, embeddings, metadatas
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_distance_identical() {
        let a = vec![1.0, 0.0, 0.0];
        assert!(cosine_distance(&a, &a).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_distance_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!((cosine_distance(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_distance_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_distance(&a, &b) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_nearest_orders_and_truncates() {
        let vectors = [vec![0.0, 1.0], vec![1.0, 0.0], vec![0.7, 0.7]];
        let ranked = nearest(&[1.0, 0.0], vectors.iter().map(Vec::as_slice), 2).unwrap();
        assert_eq!(ranked.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_nearest_rejects_dimension_mismatch() {
        let vectors = [vec![1.0, 0.0, 0.0]];
        let err = nearest(&[1.0, 0.0], vectors.iter().map(Vec::as_slice), 1).unwrap_err();
        assert_eq!(err.error_code(), "VECTOR_STORE_ERROR");
    }
}
