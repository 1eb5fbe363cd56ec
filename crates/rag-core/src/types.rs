//! Core domain types for the RAG system.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use ulid::Ulid;

/// Metadata key holding the source document identifier.
pub const FILENAME_KEY: &str = "filename";

/// Metadata key holding the chunk position within its source document.
pub const CHUNK_INDEX_KEY: &str = "chunk_index";

/// Metadata key holding the stored path of the source file.
pub const SOURCE_PATH_KEY: &str = "source_path";

/// Metadata key holding the hex BLAKE3 hash of the extracted document text.
pub const CONTENT_HASH_KEY: &str = "content_hash";

/// Scalar metadata attached to a chunk.
pub type Metadata = HashMap<String, serde_json::Value>;

/// Read the `filename` entry of a metadata map.
pub fn metadata_filename(metadata: &Metadata) -> Option<&str> {
    metadata.get(FILENAME_KEY).and_then(|v| v.as_str())
}

/// An immutable unit of retrievable text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk text content.
    pub text: String,

    /// Source identifier, position and any caller-provided scalars.
    #[serde(default)]
    pub metadata: Metadata,

    /// Embedding, present once the vector index has ingested the chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Chunk {
    /// Create a new chunk without an embedding.
    pub fn new(text: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            text: text.into(),
            metadata,
            embedding: None,
        }
    }

    /// Source identifier of the chunk, if recorded.
    pub fn filename(&self) -> Option<&str> {
        metadata_filename(&self.metadata)
    }

    /// Position of the chunk within its source document, if recorded.
    pub fn chunk_index(&self) -> Option<u64> {
        self.metadata.get(CHUNK_INDEX_KEY).and_then(|v| v.as_u64())
    }
}

/// One row returned by a vector index query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorHit {
    /// Identifier assigned by the vector index.
    pub id: Ulid,

    /// Stored document text.
    pub text: String,

    /// Stored metadata.
    pub metadata: Metadata,

    /// Cosine distance to the query (lower is closer).
    pub distance: f32,
}

/// A fused search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedDocument {
    /// Document text; also the fusion key.
    pub text: String,

    /// Metadata of the first list entry that introduced this text.
    pub metadata: Metadata,

    /// Combined score (higher is better).
    pub score: f32,
}

impl FusedDocument {
    /// Source identifier of the document, if recorded.
    pub fn filename(&self) -> Option<&str> {
        metadata_filename(&self.metadata)
    }
}

/// A candidate after reranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    /// Candidate text.
    pub text: String,

    /// Relevance score from the reranker (0.0 on fallback).
    pub score: f32,

    /// Position of the candidate in the reranker input.
    pub index: usize,
}

/// Answer returned for a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Generated (or canned) answer text.
    pub response: String,

    /// Unique source identifiers of the context chunks.
    pub sources: Vec<String>,

    /// Number of context chunks handed to the generator.
    pub context_used: usize,
}

/// Overall outcome of an ingestion batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    Success,
    PartialSuccess,
    Failed,
}

impl std::fmt::Display for IngestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::PartialSuccess => "partial_success",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// A file that could not be ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileFailure {
    /// File name as supplied by the caller.
    pub filename: String,

    /// Error code of the failure.
    pub code: String,

    /// Human-readable reason.
    pub error: String,
}

/// Result of ingesting a batch of files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub status: IngestStatus,
    pub files_ingested: Vec<String>,
    pub files_failed: Vec<FileFailure>,
    pub success_count: usize,
    pub failure_count: usize,
}

impl IngestReport {
    /// Build a report from the per-file outcomes.
    pub fn new(files_ingested: Vec<String>, files_failed: Vec<FileFailure>) -> Self {
        let status = match (files_ingested.is_empty(), files_failed.is_empty()) {
            (_, true) => IngestStatus::Success,
            (false, false) => IngestStatus::PartialSuccess,
            (true, false) => IngestStatus::Failed,
        };

        Self {
            status,
            success_count: files_ingested.len(),
            failure_count: files_failed.len(),
            files_ingested,
            files_failed,
        }
    }
}
