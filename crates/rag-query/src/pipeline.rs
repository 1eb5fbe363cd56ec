//! Query answering: embed, retrieve, rerank, assemble context, generate.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use rag_core::{
    Embedder, FusedDocument, Generator, QueryResponse, RagError, Result, SearchConfig,
    VectorIndex,
};

use crate::engine::HybridSearcher;
use crate::rerank::Reranker;

/// Answer returned when retrieval finds nothing.
pub const NO_RESULTS_RESPONSE: &str =
    "I couldn't find any relevant information in the uploaded documents to answer your question.";

/// Retrieval settings for one pipeline.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Number of chunks used as context.
    pub top_k: usize,

    /// Vector weight for hybrid search.
    pub alpha: f32,

    /// Whether candidates go through the reranker.
    pub rerank: bool,

    /// Candidates fetched per context slot when reranking.
    pub candidate_multiplier: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from(&SearchConfig::default())
    }
}

impl From<&SearchConfig> for PipelineOptions {
    fn from(config: &SearchConfig) -> Self {
        Self {
            top_k: config.top_k,
            alpha: config.hybrid_alpha,
            rerank: config.rerank,
            candidate_multiplier: config.candidate_multiplier,
        }
    }
}

impl PipelineOptions {
    /// Number of fused candidates to retrieve.
    pub fn candidate_count(&self) -> usize {
        if self.rerank {
            self.top_k.saturating_mul(self.candidate_multiplier.max(1))
        } else {
            self.top_k
        }
    }
}

/// Builds the generation prompt from the selected context.
pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "You are a helpful assistant answering questions about the user's uploaded documents.\n\
         Answer the question using only the context below. If the context does not contain \
         the answer, say that the documents do not provide enough information.\n\n\
         Context:\n{}\n\n\
         Question: {}\n\n\
         Answer:",
        context, question
    )
}

/// Unique `filename` values in first-seen order.
pub fn unique_sources(documents: &[FusedDocument]) -> Vec<String> {
    let mut seen = HashSet::new();
    documents
        .iter()
        .filter_map(FusedDocument::filename)
        .filter(|name| seen.insert(*name))
        .map(str::to_string)
        .collect()
}

/// Retrieval orchestrator.
pub struct QueryPipeline<V: ?Sized, E: ?Sized, G: ?Sized> {
    searcher: HybridSearcher<V>,
    embedder: Arc<E>,
    generator: Arc<G>,
    reranker: Reranker,
    options: PipelineOptions,
}

impl<V, E, G> QueryPipeline<V, E, G>
where
    V: VectorIndex + ?Sized,
    E: Embedder + ?Sized,
    G: Generator + ?Sized,
{
    pub fn new(
        searcher: HybridSearcher<V>,
        embedder: Arc<E>,
        generator: Arc<G>,
        reranker: Reranker,
        options: PipelineOptions,
    ) -> Self {
        Self {
            searcher,
            embedder,
            generator,
            reranker,
            options,
        }
    }

    pub fn searcher(&self) -> &HybridSearcher<V> {
        &self.searcher
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Retrieval only: embed the query and run hybrid search.
    pub async fn search(&self, query: &str, k: usize, alpha: f32) -> Result<Vec<FusedDocument>> {
        let embedding = self.embedder.embed_query(query).await?;
        self.searcher.hybrid_search(&embedding, query, k, alpha).await
    }

    /// Answer a question from the indexed documents.
    pub async fn answer(&self, question: &str) -> Result<QueryResponse> {
        let start = Instant::now();
        info!("Answering query: {:?}", question);

        let embedding = self
            .embedder
            .embed_query(question)
            .await
            .map_err(|e| RagError::query("embed_query", e))?;

        let candidates = self
            .searcher
            .hybrid_search(
                &embedding,
                question,
                self.options.candidate_count(),
                self.options.alpha,
            )
            .await
            .map_err(|e| RagError::query("retrieve", e))?;

        if candidates.is_empty() {
            info!("No relevant documents found");
            return Ok(QueryResponse {
                response: NO_RESULTS_RESPONSE.to_string(),
                sources: Vec::new(),
                context_used: 0,
            });
        }

        let selected = self.select(question, candidates);
        debug!("Selected {} context chunks", selected.len());

        let context = selected
            .iter()
            .map(|d| d.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let response = self
            .generator
            .generate(&build_prompt(&context, question))
            .await
            .map_err(|e| RagError::query("generate", e))?;

        let sources = unique_sources(&selected);

        info!(
            "Query answered in {}ms using {} chunks from {} sources",
            start.elapsed().as_millis(),
            selected.len(),
            sources.len()
        );

        Ok(QueryResponse {
            response,
            sources,
            context_used: selected.len(),
        })
    }

    /// Narrow fused candidates to `top_k`, reranking when enabled.
    fn select(&self, question: &str, mut candidates: Vec<FusedDocument>) -> Vec<FusedDocument> {
        let top_k = self.options.top_k;

        if !self.options.rerank {
            candidates.truncate(top_k);
            return candidates;
        }

        let texts: Vec<&str> = candidates.iter().map(|d| d.text.as_str()).collect();
        let ranked = self.reranker.rerank(question, &texts, top_k);

        ranked
            .into_iter()
            .filter_map(|r| {
                candidates.get(r.index).map(|d| FusedDocument {
                    text: r.text,
                    metadata: d.metadata.clone(),
                    score: r.score,
                })
            })
            .collect()
    }
}
