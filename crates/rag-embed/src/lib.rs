//! rag-embed - Embedding and relevance models
//!
//! This crate provides ONNX-based text embeddings (all-MiniLM-L6-v2 by
//! default), the ONNX cross-encoder used for reranking, and a model-free
//! hashed embedder for tests and offline runs.
//!
//! # Features
//!
//! - ONNX Runtime integration for fast inference
//! - Configurable query/document prefixes for asymmetric models
//! - Mean pooling with attention mask and L2 normalization
//! - Batched embedding

mod cross_encoder;
mod hash;
mod onnx;
mod session;

use std::sync::Arc;

pub use cross_encoder::OnnxCrossEncoder;
pub use hash::HashEmbedder;
pub use onnx::OnnxEmbedder;

// Re-export the model traits for convenience
pub use rag_core::{Embedder, RelevanceModel};

use rag_core::{EmbeddingConfig, EmbeddingProvider, Result};

/// Build the embedder selected by `config.provider`.
pub fn embedder_from_config(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    Ok(match config.provider {
        EmbeddingProvider::Onnx => Arc::new(OnnxEmbedder::new(config)?),
        EmbeddingProvider::Hash => Arc::new(HashEmbedder::new(config.dimension)),
    })
}
