//! rag-service - document ingestion and question answering
//!
//! Wires the store, embedder, chunker and query pipeline into a single
//! [`RagService`] and adds the pieces that talk to the outside world:
//!
//! - [`GeminiGenerator`] - answer generation over HTTP
//! - [`DocumentRepository`] - local copies of uploaded files
//! - [`HealthReport`] - readiness of storage and configuration

mod generator;
mod health;
mod repository;
mod service;

pub use generator::GeminiGenerator;
pub use health::{CheckResult, HealthReport, HealthStatus, ReportedSettings};
pub use repository::DocumentRepository;
pub use service::{RagService, ServiceComponents};
