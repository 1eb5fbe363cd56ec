//! rag-query - Hybrid retrieval and answer orchestration
//!
//! This crate combines vector similarity and BM25 lexical search using
//! weighted Reciprocal Rank Fusion (RRF), optionally reranks the fused
//! candidates with a cross-encoder, and drives answer generation.
//!
//! # Features
//!
//! - Hybrid search with a tunable vector/lexical blend (`alpha`)
//! - Concurrent vector and lexical retrieval
//! - Reranking that degrades to fused order when the model is unavailable
//! - Canned response when nothing relevant is found
//!
//! # Example
//!
//! ```rust,ignore
//! use rag_query::{HybridSearcher, PipelineOptions, QueryPipeline, Reranker};
//! use std::sync::Arc;
//!
//! let searcher = HybridSearcher::new(Arc::new(store), Arc::new(lexical));
//! let pipeline = QueryPipeline::new(searcher, embedder, generator, Reranker::disabled(), PipelineOptions::default());
//! let response = pipeline.answer("What is the notice period?").await?;
//! ```

mod engine;
mod fusion;
mod pipeline;
mod rerank;

pub use engine::HybridSearcher;
pub use fusion::{hybrid_rrf, Ranked, DEFAULT_RRF_K};
pub use pipeline::{build_prompt, unique_sources, PipelineOptions, QueryPipeline, NO_RESULTS_RESPONSE};
pub use rerank::Reranker;

// Re-export for convenience
pub use rag_core::{FusedDocument, QueryResponse, RankedCandidate};
