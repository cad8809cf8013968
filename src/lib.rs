//! Finsight Library
//!
//! Iterative financial-analysis engine: a critique-and-refine LLM loop over
//! a RAG knowledge store of SEC filings, with asynchronous jobs, document
//! ingestion, response grading and an HTTP API.

use sqlx::SqlitePool;
use std::sync::Arc;

pub mod admin;
pub mod config;
pub mod db;
pub mod handlers;
pub mod models;
pub mod services;
pub mod utils;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use config::Config;
pub use services::analysis::{AnalysisController, AnalysisJobService, JobRepository};
pub use services::{
    ChatCompletion, DocumentRegistry, EdgarService, IngestService, RagGateway, ResponseGrader,
    SummaryGenerator,
};

/// Application shared state
///
/// Rust's type system is the DI container: every service is constructed
/// once in main and shared through Arc.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,

    pub llm: Arc<dyn ChatCompletion>,
    pub registry: Arc<DocumentRegistry>,
    pub gateway: Arc<RagGateway>,
    pub edgar: Arc<EdgarService>,
    pub ingest_service: Arc<IngestService>,
    pub job_service: Arc<AnalysisJobService>,
    pub job_repository: Arc<JobRepository>,
}
