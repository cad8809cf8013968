//! Iterative Analysis Module
//!
//! The critique-and-refine engine and its job plumbing:
//!
//! ```text
//! handlers ──> AnalysisJobService ──spawn──> AnalysisController
//!                    │                            │
//!              JobRepository <──ProgressSink──────┤
//!                    ▲                            ├─> ChatCompletion (LLM)
//!              CancelSignal ──────────────────────┤
//!                                                 ├─> RagGateway ─> ResponseGrader
//!                                                 └─> DocumentRegistry (summaries)
//! ```

pub mod controller;
pub mod prompts;
pub mod repository;
pub mod service;
pub mod types;

pub use controller::{AnalysisController, CancelSignal, ProgressSink, ProgressUpdate, MAX_ITERATIONS};
pub use repository::{BulkDeleteOutcome, DeleteOutcome, JobRepository};
pub use service::{AnalysisJobService, CancelOutcome};
pub use types::{
    AnalysisEvaluation, AnalysisQuality, AnalysisRun, InvestmentAnalysis, IterationRecord,
    RetrievalOutcome,
};
