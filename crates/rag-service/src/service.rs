//! Ingestion and query service.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tokio::sync::Mutex;
use tracing::{info, warn};

use rag_chunk::{FileParser, RecursiveChunker};
use rag_core::{
    Chunker, Embedder, FileFailure, FusedDocument, Generator, IngestReport, Metadata, Parser,
    QueryResponse, RagConfig, RagError, RelevanceModel, Result, VectorIndex, CONTENT_HASH_KEY,
    FILENAME_KEY, SOURCE_PATH_KEY,
};
use rag_embed::{embedder_from_config, OnnxCrossEncoder};
use rag_query::{HybridSearcher, PipelineOptions, QueryPipeline, Reranker};
use rag_store::{LexicalIndex, SqliteVectorStore};

use crate::generator::GeminiGenerator;
use crate::repository::DocumentRepository;

/// Collaborators a [`RagService`] is assembled from.
pub struct ServiceComponents {
    pub vectors: Arc<dyn VectorIndex>,
    pub embedder: Arc<dyn Embedder>,
    pub generator: Arc<dyn Generator>,
    pub relevance_model: Option<Arc<dyn RelevanceModel>>,
    pub parser: Arc<dyn Parser>,
    pub chunker: Arc<dyn Chunker>,
}

/// RAG service state.
///
/// Owns the vector and lexical indexes and keeps them in step: every chunk
/// added to one is added to the other, in the same order.
pub struct RagService {
    vectors: Arc<dyn VectorIndex>,
    lexical: Arc<LexicalIndex>,
    embedder: Arc<dyn Embedder>,
    parser: Arc<dyn Parser>,
    chunker: Arc<dyn Chunker>,
    repository: DocumentRepository,
    pipeline: QueryPipeline<dyn VectorIndex, dyn Embedder, dyn Generator>,

    /// Serializes the index-writing step of ingestion.
    ingest_lock: Mutex<()>,

    embed_batch_size: usize,
}

/// Prepared output of the parse and chunk steps for one file.
struct PreparedFile {
    texts: Vec<String>,
    metadatas: Vec<Metadata>,
}

impl RagService {
    /// Build the production service from configuration.
    ///
    /// Opens the SQLite vector store, loads the embedding model and, when
    /// reranking is enabled, the cross-encoder. A missing cross-encoder is
    /// not fatal; queries then keep fused order.
    pub async fn open(config: &RagConfig) -> Result<Self> {
        config.validate()?;

        let api_key = config.generation.resolved_api_key().ok_or_else(|| {
            RagError::config(format!(
                "{} is not set and no generation.api_key is configured",
                rag_core::API_KEY_ENV
            ))
        })?;

        info!(
            "Opening RAG service with data directory {:?}",
            config.storage.data_dir
        );

        for dir in [&config.storage.data_dir, &config.storage.upload_dir] {
            std::fs::create_dir_all(dir).map_err(|e| {
                RagError::file_storage(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }

        let vectors: Arc<dyn VectorIndex> =
            Arc::new(SqliteVectorStore::open(&config.storage.vector_db_path)?);
        let embedder = embedder_from_config(&config.embedding)?;
        let generator: Arc<dyn Generator> =
            Arc::new(GeminiGenerator::new(&config.generation, api_key)?);

        let relevance_model: Option<Arc<dyn RelevanceModel>> = if config.search.rerank {
            match OnnxCrossEncoder::new(&config.reranker) {
                Ok(model) => Some(Arc::new(model)),
                Err(e) => {
                    warn!("Reranker unavailable, results will keep fused order: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let components = ServiceComponents {
            vectors,
            embedder,
            generator,
            relevance_model,
            parser: Arc::new(FileParser::new()),
            chunker: Arc::new(RecursiveChunker::from_config(&config.chunking)?),
        };

        Self::new(components, config).await
    }

    /// Assemble a service from explicit collaborators.
    ///
    /// The lexical index is rebuilt from every document already held by the
    /// vector store.
    pub async fn new(components: ServiceComponents, config: &RagConfig) -> Result<Self> {
        let lexical = Arc::new(LexicalIndex::new());

        let searcher = HybridSearcher::new(Arc::clone(&components.vectors), Arc::clone(&lexical))
            .with_rrf_k(config.search.rrf_k as f32)?;
        let pipeline = QueryPipeline::new(
            searcher,
            Arc::clone(&components.embedder),
            components.generator,
            Reranker::new(components.relevance_model),
            PipelineOptions::from(&config.search),
        );

        let service = Self {
            vectors: components.vectors,
            lexical,
            embedder: components.embedder,
            parser: components.parser,
            chunker: components.chunker,
            repository: DocumentRepository::new(&config.storage.upload_dir),
            pipeline,
            ingest_lock: Mutex::new(()),
            embed_batch_size: config.embedding.batch_size.max(1),
        };

        service.rebuild_lexical().await?;
        Ok(service)
    }

    async fn rebuild_lexical(&self) -> Result<()> {
        let start = Instant::now();
        let documents = self.vectors.documents().await?;
        if documents.is_empty() {
            return Ok(());
        }

        let (texts, metadatas): (Vec<String>, Vec<Metadata>) = documents.into_iter().unzip();
        self.lexical.index(&texts, &metadatas)?;

        info!(
            "Rebuilt lexical index with {} chunks in {}ms",
            texts.len(),
            start.elapsed().as_millis()
        );
        Ok(())
    }

    /// Ingest a batch of files. Each file succeeds or fails on its own.
    pub async fn ingest(&self, paths: &[PathBuf]) -> IngestReport {
        let mut ingested = Vec::new();
        let mut failed = Vec::new();

        for path in paths {
            let filename = display_name(path);
            match self.ingest_file(path, &filename).await {
                Ok(chunks) => {
                    info!("Ingested {} ({} chunks)", filename, chunks);
                    ingested.push(filename);
                }
                Err(e) => {
                    warn!("Failed to ingest {}: {}", filename, e);
                    failed.push(FileFailure {
                        filename,
                        code: e.error_code().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let report = IngestReport::new(ingested, failed);
        info!(
            "Ingestion finished: {} ({} succeeded, {} failed)",
            report.status, report.success_count, report.failure_count
        );
        report
    }

    async fn ingest_file(&self, path: &Path, filename: &str) -> Result<usize> {
        if !self.parser.supports(path) {
            return Err(RagError::unsupported_file_type(filename));
        }

        let stored = self.repository.store(path)?;
        let prepared = self.prepare(&stored, filename)?;

        // Nothing reaches the vector store that the lexical index would reject.
        LexicalIndex::validate(&prepared.texts, &prepared.metadatas)?;

        let refs: Vec<&str> = prepared.texts.iter().map(String::as_str).collect();
        let mut embeddings = Vec::with_capacity(refs.len());
        for batch in refs.chunks(self.embed_batch_size) {
            embeddings.extend(self.embedder.embed_documents(batch).await?);
        }

        if embeddings.len() != prepared.texts.len() {
            return Err(RagError::embedding(format!(
                "Expected {} embeddings, got {}",
                prepared.texts.len(),
                embeddings.len()
            )));
        }

        let _guard = self.ingest_lock.lock().await;
        self.vectors
            .add(&prepared.texts, &embeddings, &prepared.metadatas)
            .await?;
        self.lexical.index(&prepared.texts, &prepared.metadatas)?;

        Ok(prepared.texts.len())
    }

    fn prepare(&self, stored: &Path, filename: &str) -> Result<PreparedFile> {
        let text = self.parser.parse(stored)?;
        if text.trim().is_empty() {
            return Err(RagError::document_processing(format!(
                "No text could be extracted from {}",
                filename
            )));
        }

        let mut metadata = Metadata::new();
        metadata.insert(FILENAME_KEY.to_string(), json!(filename));
        metadata.insert(
            SOURCE_PATH_KEY.to_string(),
            json!(stored.display().to_string()),
        );
        metadata.insert(
            CONTENT_HASH_KEY.to_string(),
            json!(hex::encode(blake3::hash(text.as_bytes()).as_bytes())),
        );

        let chunks = self.chunker.chunk_text(&text, &metadata)?;
        if chunks.is_empty() {
            return Err(RagError::document_processing(format!(
                "{} produced no chunks",
                filename
            )));
        }

        let (texts, metadatas) = chunks.into_iter().map(|c| (c.text, c.metadata)).unzip();
        Ok(PreparedFile { texts, metadatas })
    }

    /// Answer a question from the ingested documents.
    pub async fn query(&self, text: &str) -> Result<QueryResponse> {
        if text.trim().is_empty() {
            return Err(RagError::invalid_argument("Query text must not be empty"));
        }
        self.pipeline.answer(text.trim()).await
    }

    /// Retrieval only: the `k` best chunks for `text`.
    pub async fn search(&self, text: &str, k: usize, alpha: f32) -> Result<Vec<FusedDocument>> {
        if text.trim().is_empty() {
            return Err(RagError::invalid_argument("Query text must not be empty"));
        }
        self.pipeline.search(text.trim(), k, alpha).await
    }

    /// Number of chunks in the lexical index.
    pub fn corpus_size(&self) -> Result<usize> {
        self.lexical.len()
    }

    /// Number of chunks in the vector store.
    pub async fn chunk_count(&self) -> Result<usize> {
        self.vectors.count().await
    }

    pub fn options(&self) -> &PipelineOptions {
        self.pipeline.options()
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
