//! Error types for the RAG system.

use thiserror::Error;

/// Result type alias using RagError.
pub type Result<T> = std::result::Result<T, RagError>;

/// Errors that can occur in the RAG system.
#[derive(Error, Debug)]
pub enum RagError {
    /// Malformed input handed to the lexical index.
    #[error("Indexing error: {message}")]
    Indexing { message: String },

    /// Vector store storage or connectivity failure.
    #[error("Vector store error: {message}")]
    VectorStore { message: String },

    /// Embedding model error.
    #[error("Embedding error: {message}")]
    Embedding { message: String },

    /// Text extraction or chunking failed for a document.
    #[error("Document processing error: {message}")]
    DocumentProcessing { message: String },

    /// No parser is registered for the file extension.
    #[error("Unsupported file type: {path}")]
    UnsupportedFileType { path: String },

    /// Failure somewhere in the query pipeline.
    #[error("Query error during {stage}: {message}")]
    Query { stage: String, message: String },

    /// Missing or invalid configuration.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Uploaded file could not be stored.
    #[error("File storage error: {message}")]
    FileStorage { message: String },

    /// Answer generation model error.
    #[error("Generation error: {message}")]
    Generation { message: String },

    /// Relevance model error.
    #[error("Reranking error: {message}")]
    Reranking { message: String },

    /// Invalid argument provided.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error (unexpected).
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl RagError {
    /// Create an indexing error.
    pub fn indexing(message: impl Into<String>) -> Self {
        Self::Indexing {
            message: message.into(),
        }
    }

    /// Create a vector store error.
    pub fn vector_store(message: impl Into<String>) -> Self {
        Self::VectorStore {
            message: message.into(),
        }
    }

    /// Create an embedding error.
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
        }
    }

    /// Create a document processing error.
    pub fn document_processing(message: impl Into<String>) -> Self {
        Self::DocumentProcessing {
            message: message.into(),
        }
    }

    /// Create an unsupported file type error.
    pub fn unsupported_file_type(path: impl Into<String>) -> Self {
        Self::UnsupportedFileType { path: path.into() }
    }

    /// Wrap a failure from one query pipeline stage.
    pub fn query(stage: impl Into<String>, source: impl std::fmt::Display) -> Self {
        Self::Query {
            stage: stage.into(),
            message: source.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a file storage error.
    pub fn file_storage(message: impl Into<String>) -> Self {
        Self::FileStorage {
            message: message.into(),
        }
    }

    /// Create a generation error.
    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation {
            message: message.into(),
        }
    }

    /// Create a reranking error.
    pub fn reranking(message: impl Into<String>) -> Self {
        Self::Reranking {
            message: message.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the stable error code for reports and CLI output.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Indexing { .. } => "INDEXING_ERROR",
            Self::VectorStore { .. } => "VECTOR_STORE_ERROR",
            Self::Embedding { .. } => "EMBEDDING_ERROR",
            Self::DocumentProcessing { .. } => "DOCUMENT_PROCESSING_ERROR",
            Self::UnsupportedFileType { .. } => "UNSUPPORTED_FILE_TYPE",
            Self::Query { .. } => "QUERY_ERROR",
            Self::Config { .. } => "CONFIGURATION_ERROR",
            Self::FileStorage { .. } => "FILE_STORAGE_ERROR",
            Self::Generation { .. } => "GENERATION_ERROR",
            Self::Reranking { .. } => "RERANKING_ERROR",
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show to an end user.
    ///
    /// Query failures and unexpected errors are reduced to a generic sentence;
    /// the full error is still available through `Display` for logs.
    pub fn user_message(&self) -> String {
        match self {
            Self::Query { .. } => "An error occurred while processing your query.".to_string(),
            Self::Internal { .. } | Self::Io(_) | Self::Serialization(_) => {
                "An internal error occurred.".to_string()
            }
            other => other.to_string(),
        }
    }
}
