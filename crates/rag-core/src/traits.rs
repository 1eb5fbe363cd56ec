//! Core traits defining the interfaces between components.

use std::path::Path;

use async_trait::async_trait;
use ulid::Ulid;

use crate::error::Result;
use crate::types::{Chunk, Metadata, VectorHit};

/// Persistent nearest-neighbour index over chunk embeddings.
///
/// Implementations own their concurrency; every call may block on I/O and
/// is never retried by callers in this workspace.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Store `texts[i]`, `embeddings[i]` and `metadatas[i]` under a fresh id.
    ///
    /// All three sequences must have the same length.
    async fn add(
        &self,
        texts: &[String],
        embeddings: &[Vec<f32>],
        metadatas: &[Metadata],
    ) -> Result<Vec<Ulid>>;

    /// Return up to `k` entries ordered by ascending cosine distance.
    ///
    /// Returns every entry when fewer than `k` are stored.
    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<VectorHit>>;

    /// Number of stored entries.
    async fn count(&self) -> Result<usize>;

    /// All stored `(text, metadata)` pairs in insertion order.
    async fn documents(&self) -> Result<Vec<(String, Metadata)>>;
}

/// Embedding model trait.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of document texts.
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Get the embedding dimension.
    fn dimension(&self) -> usize;
}

/// Pairwise (query, document) relevance model, e.g. a cross-encoder.
pub trait RelevanceModel: Send + Sync {
    /// Score every document against the query; one score per document,
    /// higher is more relevant.
    fn score_pairs(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>>;
}

/// Generative answer model.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce an answer for a fully assembled prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Text extraction from a stored file.
pub trait Parser: Send + Sync {
    /// Extract the text of the file at `path`.
    fn parse(&self, path: &Path) -> Result<String>;

    /// Whether the parser accepts files with this path's extension.
    fn supports(&self, path: &Path) -> bool;
}

/// Splits extracted text into ordered chunks.
pub trait Chunker: Send + Sync {
    /// Chunk `text`; every output chunk carries a copy of `metadata` plus
    /// its `chunk_index`.
    fn chunk_text(&self, text: &str, metadata: &Metadata) -> Result<Vec<Chunk>>;
}
