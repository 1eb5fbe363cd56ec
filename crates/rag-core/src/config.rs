//! Configuration types for the RAG system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{RagError, Result};

/// Environment variable that overrides the configured generation API key.
pub const API_KEY_ENV: &str = "GOOGLE_API_KEY";

/// Main configuration for the RAG system.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RagConfig {
    /// Storage locations.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Embedding configuration.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Chunking configuration.
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Search configuration.
    #[serde(default)]
    pub search: SearchConfig,

    /// Cross-encoder reranker configuration.
    #[serde(default)]
    pub reranker: RerankerConfig,

    /// Answer generation configuration.
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for persistent data.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// SQLite file backing the vector index.
    #[serde(default = "default_vector_db_path")]
    pub vector_db_path: PathBuf,

    /// Directory receiving copies of ingested files.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            vector_db_path: default_vector_db_path(),
            upload_dir: default_upload_dir(),
        }
    }
}

/// Which embedding backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// ONNX Runtime sentence embedding model.
    Onnx,
    /// Deterministic hashed bag-of-words vectors (no model files needed).
    Hash,
}

/// Embedding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding backend.
    #[serde(default = "default_embedding_provider")]
    pub provider: EmbeddingProvider,

    /// Model name, reported by health checks.
    #[serde(default = "default_embedding_model_name")]
    pub model_name: String,

    /// Path to the ONNX model file.
    #[serde(default = "default_embedding_model_path")]
    pub model_path: PathBuf,

    /// Path to the tokenizer.json file.
    #[serde(default = "default_embedding_tokenizer_path")]
    pub tokenizer_path: PathBuf,

    /// Output dimension.
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Maximum tokens per input; longer inputs are truncated.
    #[serde(default = "default_embedding_max_tokens")]
    pub max_tokens: usize,

    /// Batch size for embedding.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Number of threads for CPU inference.
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,

    /// Prefix prepended to queries (asymmetric models).
    #[serde(default)]
    pub query_prefix: String,

    /// Prefix prepended to documents (asymmetric models).
    #[serde(default)]
    pub document_prefix: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model_name: default_embedding_model_name(),
            model_path: default_embedding_model_path(),
            tokenizer_path: default_embedding_tokenizer_path(),
            dimension: 384,
            max_tokens: 256,
            batch_size: 32,
            num_threads: 4,
            query_prefix: String::new(),
            document_prefix: String::new(),
        }
    }
}

/// Chunking configuration (sizes in characters).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum characters per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared by consecutive chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Number of chunks used as answer context.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Hybrid search alpha (0 = lexical only, 1 = vector only).
    #[serde(default = "default_hybrid_alpha")]
    pub hybrid_alpha: f32,

    /// RRF constant k.
    #[serde(default = "default_rrf_k")]
    pub rrf_k: u32,

    /// Refine fused candidates with the cross-encoder.
    #[serde(default = "default_true")]
    pub rerank: bool,

    /// Fused candidates fetched per context slot when reranking.
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            hybrid_alpha: 0.7,
            rrf_k: 60,
            rerank: true,
            candidate_multiplier: 2,
        }
    }
}

/// Cross-encoder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    /// Model name, reported by health checks.
    #[serde(default = "default_reranker_model_name")]
    pub model_name: String,

    /// Path to the ONNX model file.
    #[serde(default = "default_reranker_model_path")]
    pub model_path: PathBuf,

    /// Path to the tokenizer.json file.
    #[serde(default = "default_reranker_tokenizer_path")]
    pub tokenizer_path: PathBuf,

    /// Maximum tokens per (query, document) pair.
    #[serde(default = "default_reranker_max_tokens")]
    pub max_tokens: usize,

    /// Number of threads for CPU inference.
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            model_name: default_reranker_model_name(),
            model_path: default_reranker_model_path(),
            tokenizer_path: default_reranker_tokenizer_path(),
            max_tokens: 512,
            num_threads: 4,
        }
    }
}

/// Answer generation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Model name.
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// API base URL.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// API key; `GOOGLE_API_KEY` takes precedence when set.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            base_url: default_llm_base_url(),
            api_key: None,
            temperature: 0.2,
            timeout_secs: 60,
        }
    }
}

impl GenerationConfig {
    /// API key from the environment, falling back to the config file.
    pub fn resolved_api_key(&self) -> Option<String> {
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.api_key.clone().filter(|k| !k.trim().is_empty()))
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default value functions

fn default_true() -> bool {
    true
}

fn default_embedding_provider() -> EmbeddingProvider {
    EmbeddingProvider::Onnx
}

fn default_embedding_model_name() -> String {
    "all-MiniLM-L6-v2".to_string()
}

fn default_dimension() -> usize {
    384
}

fn default_embedding_max_tokens() -> usize {
    256
}

fn default_batch_size() -> usize {
    32
}

fn default_num_threads() -> usize {
    4
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_top_k() -> usize {
    5
}

fn default_hybrid_alpha() -> f32 {
    0.7
}

fn default_rrf_k() -> u32 {
    60
}

fn default_candidate_multiplier() -> usize {
    2
}

fn default_reranker_model_name() -> String {
    "cross-encoder/ms-marco-MiniLM-L-6-v2".to_string()
}

fn default_reranker_max_tokens() -> usize {
    512
}

fn default_llm_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_llm_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rag")
}

fn default_vector_db_path() -> PathBuf {
    default_data_dir().join("vectors.db")
}

fn default_upload_dir() -> PathBuf {
    default_data_dir().join("uploads")
}

fn default_models_dir() -> PathBuf {
    default_data_dir().join("models")
}

fn default_embedding_model_path() -> PathBuf {
    default_models_dir().join("all-MiniLM-L6-v2").join("model.onnx")
}

fn default_embedding_tokenizer_path() -> PathBuf {
    default_models_dir()
        .join("all-MiniLM-L6-v2")
        .join("tokenizer.json")
}

fn default_reranker_model_path() -> PathBuf {
    default_models_dir()
        .join("ms-marco-MiniLM-L-6-v2")
        .join("model.onnx")
}

fn default_reranker_tokenizer_path() -> PathBuf {
    default_models_dir()
        .join("ms-marco-MiniLM-L-6-v2")
        .join("tokenizer.json")
}

impl RagConfig {
    /// Load configuration from file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| RagError::config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load configuration from default paths.
    pub fn load_default() -> Result<Self> {
        // Try user config first
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("rag").join("config.toml");
            if user_config.exists() {
                return Self::load(&user_config);
            }
        }

        // Try local config
        let local_config = PathBuf::from("rag.toml");
        if local_config.exists() {
            return Self::load(&local_config);
        }

        Ok(Self::default())
    }

    /// Load from an explicit path when given, else from default paths.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Self::load_default(),
        }
    }

    /// Check value ranges and required names.
    pub fn validate(&self) -> Result<()> {
        let alpha = self.search.hybrid_alpha;
        if !(0.0..=1.0).contains(&alpha) {
            return Err(RagError::config(format!(
                "search.hybrid_alpha must be within [0, 1], got {}",
                alpha
            )));
        }

        if self.search.top_k == 0 {
            return Err(RagError::config("search.top_k must be at least 1"));
        }

        if self.search.rrf_k == 0 {
            return Err(RagError::config("search.rrf_k must be at least 1"));
        }

        if self.search.candidate_multiplier == 0 {
            return Err(RagError::config(
                "search.candidate_multiplier must be at least 1",
            ));
        }

        if self.chunking.chunk_size == 0 {
            return Err(RagError::config("chunking.chunk_size must be at least 1"));
        }

        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(RagError::config(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }

        if self.embedding.model_name.trim().is_empty() {
            return Err(RagError::config("embedding.model_name must not be empty"));
        }

        if self.generation.model.trim().is_empty() {
            return Err(RagError::config("generation.model must not be empty"));
        }

        Ok(())
    }

    /// Copy of the configuration safe to print.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.generation.api_key.is_some() {
            copy.generation.api_key = Some("<redacted>".to_string());
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RagConfig::default();
        assert_eq!(config.search.top_k, 5);
        assert_eq!(config.search.rrf_k, 60);
        assert!((config.search.hybrid_alpha - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.chunking.chunk_size, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: RagConfig = toml::from_str(
            r#"
            [search]
            top_k = 3
            hybrid_alpha = 0.5

            [embedding]
            provider = "hash"
            dimension = 64
            "#,
        )
        .unwrap();

        assert_eq!(config.search.top_k, 3);
        assert_eq!(config.search.rrf_k, 60);
        assert_eq!(config.embedding.provider, EmbeddingProvider::Hash);
        assert_eq!(config.embedding.dimension, 64);
        assert_eq!(config.chunking.chunk_overlap, 200);
    }

    #[test]
    fn test_validate_rejects_alpha_out_of_range() {
        let mut config = RagConfig::default();
        config.search.hybrid_alpha = 1.5;
        let err = config.validate().unwrap_err();
        assert_eq!(err.error_code(), "CONFIGURATION_ERROR");
    }

    #[test]
    fn test_validate_rejects_zero_rrf_k() {
        let mut config = RagConfig::default();
        config.search.rrf_k = 0;
        let err = config.validate().unwrap_err();
        assert_eq!(err.error_code(), "CONFIGURATION_ERROR");

        config.search.rrf_k = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_overlap_not_smaller_than_size() {
        let mut config = RagConfig::default();
        config.chunking.chunk_overlap = config.chunking.chunk_size;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_model_name() {
        let mut config = RagConfig::default();
        config.generation.model = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_redacted_hides_api_key() {
        let mut config = RagConfig::default();
        config.generation.api_key = Some("secret".to_string());
        let printed = toml::to_string(&config.redacted()).unwrap();
        assert!(!printed.contains("secret"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rag.toml");
        std::fs::write(&path, "[chunking]\nchunk_size = 500\nchunk_overlap = 50\n").unwrap();

        let config = RagConfig::load_from(Some(&path)).unwrap();
        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.chunking.chunk_overlap, 50);
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rag.toml");
        std::fs::write(&path, "[search\ntop_k = ").unwrap();

        let err = RagConfig::load(&path).unwrap_err();
        assert_eq!(err.error_code(), "CONFIGURATION_ERROR");
    }
}
