//! rag-store - Vector and lexical indexes for the RAG system
//!
//! This crate provides the persistent SQLite vector index (k-nearest
//! neighbour search through sqlite-vec), an in-process vector index for
//! tests, and the BM25 lexical index whose snapshots are rebuilt and
//! swapped on every ingest.

mod lexical;
mod memory;
mod schema;
mod similarity;
mod sqlite;

pub use lexical::{tokenize, Bm25Params, Bm25Scorer, LexicalIndex, LexicalSnapshot};
pub use memory::MemoryVectorStore;
pub use similarity::cosine_distance;
pub use sqlite::SqliteVectorStore;

// Re-export schema for testing/migrations
pub use schema::{vec_schema, SCHEMA, SCHEMA_VERSION, VEC_TABLE};
