//! rag-chunk - Text extraction and chunking
//!
//! This crate provides the file parser and the chunker that turn an
//! uploaded file into ordered, size-bounded text chunks for embedding.
//!
//! # Example
//!
//! ```rust
//! use rag_chunk::{Chunker, RecursiveChunker};
//! use rag_core::Metadata;
//!
//! let chunker = RecursiveChunker::new(1000, 200).unwrap();
//! let chunks = chunker.chunk_text("Hello world", &Metadata::new()).unwrap();
//! assert_eq!(chunks[0].chunk_index(), Some(0));
//! ```

mod parser;
mod recursive;

pub use parser::{docx_to_text, markdown_to_text, FileParser};
pub use recursive::{RecursiveChunker, DEFAULT_SEPARATORS};

// Re-export traits for convenience
pub use rag_core::{Chunker, Parser};
