//! Hybrid search over the vector and lexical indexes.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use rag_core::{FusedDocument, RagError, Result, VectorIndex};
use rag_store::LexicalIndex;

use crate::fusion::{hybrid_rrf, Ranked, DEFAULT_RRF_K};

/// Hybrid search engine.
///
/// Queries the vector index and the lexical index concurrently, then fuses
/// the two rankings with weighted Reciprocal Rank Fusion.
pub struct HybridSearcher<V: ?Sized> {
    vectors: Arc<V>,
    lexical: Arc<LexicalIndex>,
    rrf_k: f32,
}

impl<V> HybridSearcher<V>
where
    V: VectorIndex + ?Sized,
{
    pub fn new(vectors: Arc<V>, lexical: Arc<LexicalIndex>) -> Self {
        Self {
            vectors,
            lexical,
            rrf_k: DEFAULT_RRF_K,
        }
    }

    /// Override the RRF constant. Must be finite and positive.
    pub fn with_rrf_k(mut self, rrf_k: f32) -> Result<Self> {
        if !(rrf_k.is_finite() && rrf_k > 0.0) {
            return Err(RagError::invalid_argument(format!(
                "rrf_k must be finite and positive, got {}",
                rrf_k
            )));
        }
        self.rrf_k = rrf_k;
        Ok(self)
    }

    pub fn vectors(&self) -> &Arc<V> {
        &self.vectors
    }

    pub fn lexical(&self) -> &Arc<LexicalIndex> {
        &self.lexical
    }

    /// Return the `k` best documents for a query.
    ///
    /// `alpha` in `[0, 1]` weights the vector ranking against the lexical one.
    /// When the lexical index is empty the plain vector results are returned.
    pub async fn hybrid_search(
        &self,
        query_embedding: &[f32],
        query_text: &str,
        k: usize,
        alpha: f32,
    ) -> Result<Vec<FusedDocument>> {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(RagError::invalid_argument(format!(
                "alpha must be between 0 and 1, got {}",
                alpha
            )));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let snapshot = self.lexical.snapshot()?;

        if snapshot.is_empty() {
            debug!("Lexical index empty, using vector search only");
            return self.vector_search(query_embedding, k).await;
        }

        let fetch_k = k.saturating_mul(2);
        let k_vec = fetch_k.min(snapshot.len().max(1));

        let lexical_snapshot = Arc::clone(&snapshot);
        let lexical_query = query_text.to_string();

        // Lexical scoring is CPU-bound; run it off the async worker while the
        // vector query is in flight.
        let (vector_hits, lexical_ranked) = tokio::join!(
            self.vectors.query(query_embedding, k_vec),
            tokio::task::spawn_blocking(move || lexical_snapshot.top_n(&lexical_query, fetch_k))
        );

        let vector_hits = vector_hits?;
        let lexical_ranked = lexical_ranked
            .map_err(|e| RagError::internal(format!("Lexical scoring task failed: {}", e)))?;

        debug!(
            "Vector search returned {} results, lexical search returned {} results (generation {})",
            vector_hits.len(),
            lexical_ranked.len(),
            snapshot.generation()
        );

        let vector: Vec<Ranked<'_>> = vector_hits
            .iter()
            .map(|hit| Ranked {
                text: &hit.text,
                metadata: &hit.metadata,
            })
            .collect();

        let lexical: Vec<Ranked<'_>> = lexical_ranked
            .iter()
            .filter_map(|(position, _)| {
                Some(Ranked {
                    text: snapshot.text(*position)?,
                    metadata: snapshot.metadata(*position)?,
                })
            })
            .collect();

        let fused = hybrid_rrf(&vector, &lexical, alpha, self.rrf_k, k);

        info!(
            "Hybrid search completed in {}ms, returned {} results",
            start.elapsed().as_millis(),
            fused.len()
        );

        Ok(fused)
    }

    /// Plain vector search; score is `1 - distance`.
    pub async fn vector_search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<FusedDocument>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let hits = self.vectors.query(query_embedding, k).await?;
        Ok(hits
            .into_iter()
            .map(|hit| FusedDocument {
                text: hit.text,
                metadata: hit.metadata,
                score: 1.0 - hit.distance,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_core::{Embedder, Metadata};
    use rag_embed::HashEmbedder;
    use rag_store::MemoryVectorStore;
    use serde_json::json;

    const CORPUS: [&str; 5] = [
        "the cat sat on the mat",
        "dogs chase cats in the park",
        "rust ownership and borrowing rules",
        "a cat and a dog became friends",
        "borrowing books from the library",
    ];

    struct Fixture {
        searcher: HybridSearcher<MemoryVectorStore>,
        embedder: HashEmbedder,
    }

    fn meta(filename: &str, index: usize) -> Metadata {
        let mut m = Metadata::new();
        m.insert("filename".to_string(), json!(filename));
        m.insert("chunk_index".to_string(), json!(index));
        m
    }

    async fn fixture(texts: &[&str], index_lexical: bool) -> Fixture {
        let embedder = HashEmbedder::new(64);
        let store = Arc::new(MemoryVectorStore::new());
        let lexical = Arc::new(LexicalIndex::new());

        let texts: Vec<String> = texts.iter().map(|s| s.to_string()).collect();
        let metadatas: Vec<Metadata> = (0..texts.len()).map(|i| meta("doc.txt", i)).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let embeddings = embedder.embed_documents(&refs).await.unwrap();

        store.add(&texts, &embeddings, &metadatas).await.unwrap();
        if index_lexical {
            lexical.index(&texts, &metadatas).unwrap();
        }

        Fixture {
            searcher: HybridSearcher::new(store, lexical),
            embedder,
        }
    }

    fn texts(docs: &[FusedDocument]) -> Vec<&str> {
        docs.iter().map(|d| d.text.as_str()).collect()
    }

    #[tokio::test]
    async fn test_alpha_one_matches_vector_ranking() {
        let f = fixture(&CORPUS, true).await;
        let query = "cat borrowing";
        let embedding = f.embedder.embed_query(query).await.unwrap();

        let hybrid = f.searcher.hybrid_search(&embedding, query, 3, 1.0).await.unwrap();
        let vector = f.searcher.vector_search(&embedding, 3).await.unwrap();

        assert_eq!(texts(&hybrid), texts(&vector));
    }

    #[tokio::test]
    async fn test_alpha_zero_matches_lexical_ranking() {
        let f = fixture(&CORPUS, true).await;
        let query = "cat borrowing";
        let embedding = f.embedder.embed_query(query).await.unwrap();

        let hybrid = f.searcher.hybrid_search(&embedding, query, 3, 0.0).await.unwrap();

        let snapshot = f.searcher.lexical().snapshot().unwrap();
        let lexical: Vec<&str> = snapshot
            .top_n(query, 3)
            .iter()
            .map(|(i, _)| snapshot.text(*i).unwrap())
            .collect();

        assert_eq!(texts(&hybrid), lexical);
    }

    #[tokio::test]
    async fn test_empty_lexical_falls_back_to_vector_search() {
        let f = fixture(&CORPUS, false).await;
        let query = "rust ownership";
        let embedding = f.embedder.embed_query(query).await.unwrap();

        let hybrid = f.searcher.hybrid_search(&embedding, query, 2, 0.5).await.unwrap();
        let vector = f.searcher.vector_search(&embedding, 2).await.unwrap();

        assert_eq!(hybrid, vector);
    }

    #[tokio::test]
    async fn test_exact_text_ranks_first() {
        let section_1 = "Section 1. The tenant shall pay rent on the first day of each month.";
        let section_2 = "Section 2. Either party may terminate this agreement with thirty days notice.";
        let f = fixture(&[section_1, section_2], true).await;
        let embedding = f.embedder.embed_query(section_2).await.unwrap();

        for alpha in [0.0, 0.3, 0.7, 1.0] {
            let results = f
                .searcher
                .hybrid_search(&embedding, section_2, 1, alpha)
                .await
                .unwrap();
            assert_eq!(results.len(), 1);
            assert_eq!(results[0].text, section_2, "alpha = {}", alpha);
        }
    }

    #[tokio::test]
    async fn test_rejects_alpha_out_of_range() {
        let f = fixture(&CORPUS, true).await;
        let embedding = f.embedder.embed_query("cat").await.unwrap();

        for alpha in [-0.1, 1.5, f32::NAN] {
            let err = f
                .searcher
                .hybrid_search(&embedding, "cat", 3, alpha)
                .await
                .unwrap_err();
            assert_eq!(err.error_code(), "INVALID_ARGUMENT");
        }
    }

    #[tokio::test]
    async fn test_zero_k_and_empty_indexes() {
        let f = fixture(&CORPUS, true).await;
        let embedding = f.embedder.embed_query("cat").await.unwrap();
        assert!(f
            .searcher
            .hybrid_search(&embedding, "cat", 0, 0.5)
            .await
            .unwrap()
            .is_empty());

        let empty = fixture(&[], false).await;
        assert!(empty
            .searcher
            .hybrid_search(&embedding, "cat", 5, 0.5)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_rrf_k_must_be_finite_and_positive() {
        for rrf_k in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            let f = fixture(&CORPUS, true).await;
            let err = f.searcher.with_rrf_k(rrf_k).err().unwrap();
            assert_eq!(err.error_code(), "INVALID_ARGUMENT");
        }

        let f = fixture(&CORPUS, true).await;
        let query = "cat borrowing";
        let embedding = f.embedder.embed_query(query).await.unwrap();
        let searcher = f.searcher.with_rrf_k(1.0).unwrap();

        let snapshot = searcher.lexical().snapshot().unwrap();
        let lexical: Vec<&str> = snapshot
            .top_n(query, 3)
            .iter()
            .map(|(i, _)| snapshot.text(*i).unwrap())
            .collect();
        let hybrid = searcher.hybrid_search(&embedding, query, 3, 0.0).await.unwrap();
        assert_eq!(texts(&hybrid), lexical);
    }

    #[tokio::test]
    async fn test_results_are_unique_by_text() {
        let f = fixture(&CORPUS, true).await;
        let query = "cat";
        let embedding = f.embedder.embed_query(query).await.unwrap();

        let results = f.searcher.hybrid_search(&embedding, query, 5, 0.5).await.unwrap();
        let mut seen = std::collections::HashSet::new();
        assert!(results.iter().all(|d| seen.insert(d.text.clone())));
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }
}
