//! Cross-encoder reranking with pass-through fallback.

use std::sync::Arc;

use tracing::{debug, warn};

use rag_core::{RankedCandidate, RelevanceModel};

/// Reorders fused candidates with a relevance model.
///
/// Reranking never fails: when no model is loaded, the model errors, or it
/// returns the wrong number of scores, the first `top_k` candidates are
/// returned in their original order with score 0.0.
#[derive(Clone, Default)]
pub struct Reranker {
    model: Option<Arc<dyn RelevanceModel>>,
}

impl Reranker {
    pub fn new(model: Option<Arc<dyn RelevanceModel>>) -> Self {
        Self { model }
    }

    /// A reranker without a model; always passes candidates through.
    pub fn disabled() -> Self {
        Self { model: None }
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    pub fn rerank(&self, query: &str, documents: &[&str], top_k: usize) -> Vec<RankedCandidate> {
        if documents.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let Some(model) = &self.model else {
            debug!("No relevance model loaded, keeping fused order");
            return passthrough(documents, top_k);
        };

        let scores = match model.score_pairs(query, documents) {
            Ok(scores) => scores,
            Err(e) => {
                warn!("Reranking failed, keeping fused order: {}", e);
                return passthrough(documents, top_k);
            }
        };

        if scores.len() != documents.len() {
            warn!(
                "Relevance model returned {} scores for {} documents, keeping fused order",
                scores.len(),
                documents.len()
            );
            return passthrough(documents, top_k);
        }

        if scores.iter().any(|s| !s.is_finite()) {
            warn!("Relevance model returned a non-finite score, keeping fused order");
            return passthrough(documents, top_k);
        }

        let mut ranked: Vec<RankedCandidate> = documents
            .iter()
            .zip(scores)
            .enumerate()
            .map(|(index, (text, score))| RankedCandidate {
                text: text.to_string(),
                score,
                index,
            })
            .collect();

        // Stable: equal scores keep input order.
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked.truncate(top_k);

        debug!(
            "Reranked {} candidates, top score {:?}",
            documents.len(),
            ranked.first().map(|c| c.score)
        );

        ranked
    }
}

fn passthrough(documents: &[&str], top_k: usize) -> Vec<RankedCandidate> {
    documents
        .iter()
        .take(top_k)
        .enumerate()
        .map(|(index, text)| RankedCandidate {
            text: text.to_string(),
            score: 0.0,
            index,
        })
        .collect()
}
