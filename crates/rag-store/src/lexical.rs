//! In-memory BM25 lexical index.
//!
//! The index is a sequence of immutable [`LexicalSnapshot`]s. Every call to
//! [`LexicalIndex::index`] copies the current corpus, appends the new chunks,
//! rebuilds the term statistics from scratch and publishes the result with a
//! single pointer swap. Readers clone the current `Arc` and score against it
//! without holding any lock, so they never observe a half-built scorer.
//!
//! Writers are serialized by a dedicated mutex; a reader only contends with
//! the swap itself.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tracing::debug;

use rag_core::{Metadata, RagError, Result};

/// BM25 free parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    /// Term frequency saturation.
    pub k1: f32,

    /// Document length normalization.
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

/// Lowercase whitespace tokenization.
///
/// No stemming and no stopword removal.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

/// Term statistics derived from a tokenized corpus.
#[derive(Debug, Clone, PartialEq)]
pub struct Bm25Scorer {
    params: Bm25Params,
    term_freqs: Vec<HashMap<String, u32>>,
    doc_lens: Vec<u32>,
    avg_doc_len: f32,
    idf: HashMap<String, f32>,
}

impl Bm25Scorer {
    /// Build statistics for the whole corpus.
    pub fn build(corpus: &[Vec<String>], params: Bm25Params) -> Self {
        let mut term_freqs = Vec::with_capacity(corpus.len());
        let mut doc_lens = Vec::with_capacity(corpus.len());
        let mut doc_freqs: HashMap<String, u32> = HashMap::new();
        let mut total_len = 0u64;

        for tokens in corpus {
            let mut tf: HashMap<String, u32> = HashMap::new();
            for token in tokens {
                *tf.entry(token.clone()).or_default() += 1;
            }
            for term in tf.keys() {
                *doc_freqs.entry(term.clone()).or_default() += 1;
            }

            total_len += tokens.len() as u64;
            doc_lens.push(tokens.len() as u32);
            term_freqs.push(tf);
        }

        let n = corpus.len() as f32;
        let avg_doc_len = if corpus.is_empty() {
            0.0
        } else {
            total_len as f32 / n
        };

        let idf = doc_freqs
            .into_iter()
            .map(|(term, df)| {
                let df = df as f32;
                (term, ((n - df + 0.5) / (df + 0.5) + 1.0).ln())
            })
            .collect();

        Self {
            params,
            term_freqs,
            doc_lens,
            avg_doc_len,
            idf,
        }
    }

    /// Number of documents the statistics cover.
    pub fn len(&self) -> usize {
        self.doc_lens.len()
    }

    /// Whether the scorer covers no documents.
    pub fn is_empty(&self) -> bool {
        self.doc_lens.is_empty()
    }

    /// Average document length in tokens.
    pub fn avg_doc_len(&self) -> f32 {
        self.avg_doc_len
    }

    /// Score every document against the query tokens.
    pub fn scores(&self, query: &[String]) -> Vec<f32> {
        let Bm25Params { k1, b } = self.params;
        let mut scores = vec![0.0f32; self.doc_lens.len()];

        if self.avg_doc_len <= 0.0 {
            return scores;
        }

        for term in query {
            let Some(idf) = self.idf.get(term) else {
                continue;
            };

            for (doc, tf) in self.term_freqs.iter().enumerate() {
                let Some(&freq) = tf.get(term) else {
                    continue;
                };
                let freq = freq as f32;
                let norm = 1.0 - b + b * self.doc_lens[doc] as f32 / self.avg_doc_len;
                scores[doc] += idf * (freq * (k1 + 1.0)) / (freq + k1 * norm);
            }
        }

        scores
    }
}

/// Immutable view of the lexical index at one generation.
#[derive(Debug)]
pub struct LexicalSnapshot {
    generation: u64,
    corpus: Vec<Vec<String>>,
    texts: Vec<String>,
    metadatas: Vec<Metadata>,
    scorer: Bm25Scorer,
}

impl LexicalSnapshot {
    fn empty(params: Bm25Params) -> Self {
        Self {
            generation: 0,
            corpus: Vec::new(),
            texts: Vec::new(),
            metadatas: Vec::new(),
            scorer: Bm25Scorer::build(&[], params),
        }
    }

    /// Number of successful `index` calls that produced this snapshot.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    /// Whether no chunk has been indexed.
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    /// Text of the chunk at `position`.
    pub fn text(&self, position: usize) -> Option<&str> {
        self.texts.get(position).map(String::as_str)
    }

    /// Metadata of the chunk at `position`.
    pub fn metadata(&self, position: usize) -> Option<&Metadata> {
        self.metadatas.get(position)
    }

    /// Derived term statistics.
    pub fn scorer(&self) -> &Bm25Scorer {
        &self.scorer
    }

    /// Score every chunk, in corpus order.
    pub fn score(&self, query: &str) -> Vec<(usize, f32)> {
        if self.is_empty() {
            return Vec::new();
        }

        let tokens = tokenize(query);
        self.scorer.scores(&tokens).into_iter().enumerate().collect()
    }

    /// The `n` highest scoring chunks, best first.
    ///
    /// Equal scores keep corpus order.
    pub fn top_n(&self, query: &str, n: usize) -> Vec<(usize, f32)> {
        let mut ranked = self.score(query);
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(n);
        ranked
    }
}

/// Process-wide BM25 index over ingested chunk texts.
pub struct LexicalIndex {
    /// Currently published snapshot.
    current: RwLock<Arc<LexicalSnapshot>>,

    /// Single-writer lock serializing rebuilds.
    writer: Mutex<()>,

    params: Bm25Params,
}

impl LexicalIndex {
    /// Create an empty index with default BM25 parameters.
    pub fn new() -> Self {
        Self::with_params(Bm25Params::default())
    }

    /// Create an empty index with custom BM25 parameters.
    pub fn with_params(params: Bm25Params) -> Self {
        Self {
            current: RwLock::new(Arc::new(LexicalSnapshot::empty(params))),
            writer: Mutex::new(()),
            params,
        }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Result<Arc<LexicalSnapshot>> {
        let current = self
            .current
            .read()
            .map_err(|e| RagError::internal(format!("Lexical index lock poisoned: {}", e)))?;
        Ok(Arc::clone(&current))
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> Result<usize> {
        Ok(self.snapshot()?.len())
    }

    /// Whether no chunk has been indexed.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.snapshot()?.is_empty())
    }

    /// Score every chunk of the current snapshot against `query`.
    pub fn score(&self, query: &str) -> Result<Vec<(usize, f32)>> {
        Ok(self.snapshot()?.score(query))
    }

    /// Check that `index` would accept these chunks without indexing them.
    pub fn validate(texts: &[String], metadatas: &[Metadata]) -> Result<()> {
        if texts.len() != metadatas.len() {
            return Err(RagError::indexing(format!(
                "texts and metadatas must have the same length ({} != {})",
                texts.len(),
                metadatas.len()
            )));
        }

        if let Some(position) = texts.iter().position(|t| t.trim().is_empty()) {
            return Err(RagError::indexing(format!(
                "chunk text at position {} is empty",
                position
            )));
        }

        Ok(())
    }

    /// Append chunks and rebuild the scorer over the whole corpus.
    ///
    /// `texts` and `metadatas` are aligned 1:1. Returns the generation of the
    /// published snapshot.
    pub fn index(&self, texts: &[String], metadatas: &[Metadata]) -> Result<u64> {
        Self::validate(texts, metadatas)?;

        let _writer = self
            .writer
            .lock()
            .map_err(|e| RagError::internal(format!("Lexical writer lock poisoned: {}", e)))?;

        let base = self.snapshot()?;
        if texts.is_empty() {
            return Ok(base.generation);
        }

        let mut corpus = base.corpus.clone();
        corpus.extend(texts.iter().map(|t| tokenize(t)));

        let mut all_texts = base.texts.clone();
        all_texts.extend(texts.iter().cloned());

        let mut all_metadatas = base.metadatas.clone();
        all_metadatas.extend(metadatas.iter().cloned());

        let scorer = Bm25Scorer::build(&corpus, self.params);
        let next = Arc::new(LexicalSnapshot {
            generation: base.generation + 1,
            corpus,
            texts: all_texts,
            metadatas: all_metadatas,
            scorer,
        });
        let generation = next.generation;

        {
            let mut current = self
                .current
                .write()
                .map_err(|e| RagError::internal(format!("Lexical index lock poisoned: {}", e)))?;
            *current = next;
        }

        debug!(
            "Lexical index rebuilt: generation={}, chunks={}",
            generation,
            base.len() + texts.len()
        );

        Ok(generation)
    }
}

impl Default for LexicalIndex {
    fn default() -> Self {
        Self::new()
    }
}
