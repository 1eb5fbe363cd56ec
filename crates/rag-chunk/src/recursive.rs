//! Recursive character text splitter.
//!
//! Splits text by trying progressively smaller separators until every
//! piece fits, then merges adjacent pieces back up to `chunk_size` with
//! `chunk_overlap` characters carried between consecutive chunks.

use std::collections::VecDeque;

use serde_json::json;

use rag_core::{Chunk, Chunker, ChunkingConfig, Metadata, RagError, Result, CHUNK_INDEX_KEY};

/// Separators tried in order, coarsest first. The empty separator splits
/// into single characters.
pub const DEFAULT_SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

/// Recursive chunker that splits text by multiple separators.
///
/// Sizes are counted in characters, not bytes.
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveChunker {
    /// Create a chunker; `chunk_overlap` must be smaller than `chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::config("chunk_size must be greater than 0"));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }

        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Replace the separator list.
    pub fn with_separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.separators = separators.into_iter().map(Into::into).collect();
        self
    }

    /// Split text into trimmed, non-empty pieces of at most `chunk_size` characters.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        // First separator present in the text; "" always matches.
        let position = separators
            .iter()
            .position(|s| s.is_empty() || text.contains(s.as_str()))
            .unwrap_or(separators.len().saturating_sub(1));
        let separator = separators.get(position).map(String::as_str).unwrap_or("");
        let finer = separators.get(position + 1..).unwrap_or(&[]);

        let mut chunks = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }

            if !fitting.is_empty() {
                chunks.extend(self.merge(&fitting));
                fitting.clear();
            }

            if finer.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    chunks.push(trimmed.to_string());
                }
            } else {
                chunks.extend(self.split_recursive(piece, finer));
            }
        }

        if !fitting.is_empty() {
            chunks.extend(self.merge(&fitting));
        }

        chunks
    }

    /// Merge small pieces into chunks, keeping a tail of up to
    /// `chunk_overlap` characters as the head of the next chunk.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0;

        for piece in pieces {
            let len = char_len(piece);

            if total + len > self.chunk_size && !window.is_empty() {
                push_joined(&mut chunks, &window);

                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match window.pop_front() {
                        Some((_, front_len)) => total -= front_len,
                        None => break,
                    }
                }
            }

            window.push_back((piece, len));
            total += len;
        }

        push_joined(&mut chunks, &window);
        chunks
    }
}

impl Default for RecursiveChunker {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Chunker for RecursiveChunker {
    fn chunk_text(&self, text: &str, metadata: &Metadata) -> Result<Vec<Chunk>> {
        Ok(self
            .split_text(text)
            .into_iter()
            .enumerate()
            .map(|(index, piece)| {
                let mut metadata = metadata.clone();
                metadata.insert(CHUNK_INDEX_KEY.to_string(), json!(index));
                Chunk::new(piece, metadata)
            })
            .collect())
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split on `separator`, attaching it to the start of each following piece
/// so merged chunks reproduce the original text. Empty pieces are dropped.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (i, _) in text.match_indices(separator) {
        if i > start {
            pieces.push(&text[start..i]);
        }
        start = i;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }

    pieces.retain(|p| *p != separator);
    pieces
}

fn push_joined(chunks: &mut Vec<String>, window: &VecDeque<(&str, usize)>) {
    let joined: String = window.iter().map(|(piece, _)| *piece).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_core::FILENAME_KEY;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_simple_chunk() {
        let chunker = RecursiveChunker::new(100, 10).unwrap();
        let text = "Hello world. This is a test.";
        let chunks = chunker.split_text(text);

        assert_eq!(chunks, vec![text.to_string()]);
    }

    #[test]
    fn test_paragraph_split() {
        let chunker = RecursiveChunker::new(45, 0).unwrap();
        let text = "First paragraph with several words here.\n\nSecond paragraph also with words.\n\nThird paragraph too.";
        let chunks = chunker.split_text(text);

        assert_eq!(chunks[0], "First paragraph with several words here.");
        assert_eq!(chunks[1], "Second paragraph also with words.");
        assert_eq!(chunks[2], "Third paragraph too.");
    }

    #[test]
    fn test_chunks_respect_size() {
        let chunker = RecursiveChunker::new(50, 20).unwrap();
        let chunks = chunker.split_text(&words(200));

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 50, "chunk too long: {:?}", chunk);
        }
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let chunker = RecursiveChunker::new(50, 20).unwrap();
        let chunks = chunker.split_text(&words(200));

        for pair in chunks.windows(2) {
            let head = pair[1].split(' ').next().unwrap();
            assert!(
                pair[0].split(' ').any(|w| w == head),
                "{:?} does not overlap {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_no_overlap_when_zero() {
        let chunker = RecursiveChunker::new(20, 0).unwrap();
        let chunks = chunker.split_text(&words(30));
        let rejoined = chunks.join(" ");
        assert_eq!(rejoined, words(30));
    }

    #[test]
    fn test_unbroken_text_splits_by_character() {
        let chunker = RecursiveChunker::new(10, 0).unwrap();
        let text = "x".repeat(35);
        let chunks = chunker.split_text(&text);

        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].len(), 10);
        assert_eq!(chunks[3].len(), 5);
    }

    #[test]
    fn test_multibyte_text() {
        let chunker = RecursiveChunker::new(4, 0).unwrap();
        let chunks = chunker.split_text("héllöwörld");
        assert_eq!(chunks.concat(), "héllöwörld");
        assert!(chunks.iter().all(|c| c.chars().count() <= 4));
    }

    #[test]
    fn test_empty_content() {
        let chunker = RecursiveChunker::default();
        assert!(chunker.split_text("").is_empty());
        assert!(chunker.split_text("   \n\n  ").is_empty());
    }

    #[test]
    fn test_chunk_text_assigns_indices() {
        let chunker = RecursiveChunker::new(45, 0).unwrap();
        let mut metadata = Metadata::new();
        metadata.insert(FILENAME_KEY.to_string(), json!("notes.txt"));

        let chunks = chunker
            .chunk_text("Section 1 text here.\n\nSection 2 text is here too.\n\nSection 3.", &metadata)
            .unwrap();

        assert!(chunks.len() >= 2);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index(), Some(i as u64));
            assert_eq!(chunk.filename(), Some("notes.txt"));
        }
    }

    #[test]
    fn test_invalid_overlap() {
        let err = RecursiveChunker::new(100, 100).unwrap_err();
        assert_eq!(err.error_code(), "CONFIGURATION_ERROR");
        assert!(RecursiveChunker::new(0, 0).is_err());
    }

    #[test]
    fn test_split_keeping_separator() {
        assert_eq!(
            split_keeping_separator("a. b. c", ". "),
            vec!["a", ". b", ". c"]
        );
        assert_eq!(split_keeping_separator(". a", ". "), vec![". a"]);
    }
}
