pub mod analysis;
pub mod edgar;
pub mod grader;
pub mod ingest;
pub mod llm;
pub mod rag;
pub mod registry;
pub mod summary;

pub use analysis::{AnalysisController, AnalysisJobService, JobRepository};
pub use edgar::EdgarService;
pub use grader::{GeminiSearchClient, GroundedSearch, ResponseGrader};
pub use ingest::{IngestOutcome, IngestService};
pub use llm::{ChatCompletion, ChatLlmClient, LlmError};
pub use rag::{HttpRagStore, RagGateway, RagStore};
pub use registry::DocumentRegistry;
pub use summary::SummaryGenerator;
