//! Readiness checks.

use serde::Serialize;

use rag_core::{RagConfig, VectorIndex};
use rag_store::SqliteVectorStore;

/// Overall readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Ready,
    NotReady,
}

/// Result of one dependency check.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: &'static str,
    pub healthy: bool,
    pub detail: String,
}

impl CheckResult {
    fn ok(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            healthy: true,
            detail: detail.into(),
        }
    }

    fn failed(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            healthy: false,
            detail: detail.into(),
        }
    }
}

/// Non-sensitive settings reported alongside the checks.
#[derive(Debug, Clone, Serialize)]
pub struct ReportedSettings {
    pub version: &'static str,
    pub embedding_model: String,
    pub reranker_model: String,
    pub llm_model: String,
    pub top_k: usize,
    pub hybrid_alpha: f32,
    pub rerank: bool,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub checks: Vec<CheckResult>,
    pub settings: ReportedSettings,
}

impl HealthReport {
    /// Check file storage, the vector store and configuration.
    ///
    /// Read-only: missing directories or a missing database are reported,
    /// never created.
    pub async fn check(config: &RagConfig) -> Self {
        let checks = vec![
            check_file_storage(config),
            check_vector_store(config).await,
            check_config(config),
        ];

        let status = if checks.iter().all(|c| c.healthy) {
            HealthStatus::Ready
        } else {
            HealthStatus::NotReady
        };

        Self {
            status,
            checks,
            settings: ReportedSettings {
                version: env!("CARGO_PKG_VERSION"),
                embedding_model: config.embedding.model_name.clone(),
                reranker_model: config.reranker.model_name.clone(),
                llm_model: config.generation.model.clone(),
                top_k: config.search.top_k,
                hybrid_alpha: config.search.hybrid_alpha,
                rerank: config.search.rerank,
                chunk_size: config.chunking.chunk_size,
                chunk_overlap: config.chunking.chunk_overlap,
            },
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == HealthStatus::Ready
    }
}

async fn check_vector_store(config: &RagConfig) -> CheckResult {
    const NAME: &str = "vector_store";

    let store = match SqliteVectorStore::open_read_only(&config.storage.vector_db_path) {
        Ok(store) => store,
        Err(e) => return CheckResult::failed(NAME, e.to_string()),
    };

    match store.count().await {
        Ok(count) => CheckResult::ok(NAME, format!("{} chunks indexed", count)),
        Err(e) => CheckResult::failed(NAME, e.to_string()),
    }
}

fn check_file_storage(config: &RagConfig) -> CheckResult {
    const NAME: &str = "file_storage";

    let missing: Vec<String> = [&config.storage.data_dir, &config.storage.upload_dir]
        .into_iter()
        .filter(|dir| !dir.is_dir())
        .map(|dir| dir.display().to_string())
        .collect();

    if !missing.is_empty() {
        return CheckResult::failed(NAME, format!("directories not found: {}", missing.join(", ")));
    }

    CheckResult::ok(NAME, config.storage.upload_dir.display().to_string())
}

fn check_config(config: &RagConfig) -> CheckResult {
    const NAME: &str = "config";

    if let Err(e) = config.validate() {
        return CheckResult::failed(NAME, e.to_string());
    }

    match config.generation.resolved_api_key() {
        Some(_) => CheckResult::ok(NAME, "generation API key configured"),
        None => CheckResult::failed(
            NAME,
            format!("{} is not set", rag_core::API_KEY_ENV),
        ),
    }
}
