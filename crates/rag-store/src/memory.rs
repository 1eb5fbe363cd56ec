use std::sync::RwLock;

use async_trait::async_trait;
use ulid::Ulid;

use rag_core::{Metadata, RagError, Result, VectorHit, VectorIndex};

use crate::similarity::{check_aligned, nearest};

struct Entry {
    id: Ulid,
    text: String,
    metadata: Metadata,
    embedding: Vec<f32>,
}

/// Process-resident vector index.
///
/// Same ordering as [`crate::SqliteVectorStore`], computed by brute-force
/// cosine distance over entries kept in memory. Suitable for tests and
/// short-lived sessions.
#[derive(Default)]
pub struct MemoryVectorStore {
    entries: RwLock<Vec<Entry>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorStore {
    async fn add(
        &self,
        texts: &[String],
        embeddings: &[Vec<f32>],
        metadatas: &[Metadata],
    ) -> Result<Vec<Ulid>> {
        check_aligned(texts.len(), embeddings.len(), metadatas.len())?;

        let mut entries = self
            .entries
            .write()
            .map_err(|e| RagError::vector_store(e.to_string()))?;

        let mut ids = Vec::with_capacity(texts.len());
        for ((text, embedding), metadata) in texts.iter().zip(embeddings).zip(metadatas) {
            let id = Ulid::new();
            entries.push(Entry {
                id,
                text: text.clone(),
                metadata: metadata.clone(),
                embedding: embedding.clone(),
            });
            ids.push(id);
        }

        Ok(ids)
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<VectorHit>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| RagError::vector_store(e.to_string()))?;

        let ranked = nearest(embedding, entries.iter().map(|e| e.embedding.as_slice()), k)?;

        Ok(ranked
            .into_iter()
            .map(|(position, distance)| {
                let entry = &entries[position];
                VectorHit {
                    id: entry.id,
                    text: entry.text.clone(),
                    metadata: entry.metadata.clone(),
                    distance,
                }
            })
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        let entries = self
            .entries
            .read()
            .map_err(|e| RagError::vector_store(e.to_string()))?;
        Ok(entries.len())
    }

    async fn documents(&self) -> Result<Vec<(String, Metadata)>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| RagError::vector_store(e.to_string()))?;
        Ok(entries
            .iter()
            .map(|e| (e.text.clone(), e.metadata.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_add_and_count() {
        let store = MemoryVectorStore::new();
        assert_eq!(store.count().await.unwrap(), 0);

        let ids = store
            .add(
                &texts(&["hello", "world"]),
                &[vec![1.0, 0.0], vec![0.0, 1.0]],
                &[Metadata::new(), Metadata::new()],
            )
            .await
            .unwrap();

        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_query_returns_sorted() {
        let store = MemoryVectorStore::new();
        store
            .add(
                &texts(&["far away", "very close", "medium"]),
                &[vec![0.0, 1.0, 0.0], vec![1.0, 0.0, 0.0], vec![0.5, 0.5, 0.0]],
                &[Metadata::new(), Metadata::new(), Metadata::new()],
            )
            .await
            .unwrap();

        let hits = store.query(&[1.0, 0.0, 0.0], 3).await.unwrap();
        let order: Vec<_> = hits.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(order, vec!["very close", "medium", "far away"]);
        assert!(hits[0].distance <= hits[1].distance);
    }

    #[tokio::test]
    async fn test_query_k_larger_than_store() {
        let store = MemoryVectorStore::new();
        store
            .add(&texts(&["only one"]), &[vec![1.0, 0.0]], &[Metadata::new()])
            .await
            .unwrap();

        let hits = store.query(&[1.0, 0.0], 100).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_query_empty_store() {
        let store = MemoryVectorStore::new();
        assert!(store.query(&[1.0, 0.0], 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_rejects_misaligned_input() {
        let store = MemoryVectorStore::new();
        let err = store
            .add(&texts(&["a", "b"]), &[vec![1.0]], &[Metadata::new(), Metadata::new()])
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "VECTOR_STORE_ERROR");
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_documents_in_insertion_order() {
        let store = MemoryVectorStore::new();
        store
            .add(
                &texts(&["first", "second"]),
                &[vec![1.0], vec![1.0]],
                &[Metadata::new(), Metadata::new()],
            )
            .await
            .unwrap();
        store
            .add(&texts(&["third"]), &[vec![1.0]], &[Metadata::new()])
            .await
            .unwrap();

        let docs = store.documents().await.unwrap();
        let order: Vec<_> = docs.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(order, vec!["first", "second", "third"]);
    }
}
