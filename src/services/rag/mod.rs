//! RAG Module
//!
//! Access to the opaque vector/graph knowledge engine. The engine itself is
//! an external collaborator reached over HTTP (`add` -> `cognify` ->
//! `search`); this module wraps it behind the `RagStore` trait and the
//! caching `RagGateway`.

mod gateway;
mod store;

pub use gateway::{RagGateway, RagServiceInfo};
pub use store::{HttpRagStore, RagStore};

use serde::{Deserialize, Serialize};

// ============================================================================
// Errors
// ============================================================================

/// RAG engine errors
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    #[error("RAG engine error: {0}")]
    EngineError(String),

    #[error("RAG engine timeout after {0}s")]
    Timeout(u64),

    #[error("RAG state reset failed: {0}")]
    ResetFailed(String),
}

// ============================================================================
// Search Modes
// ============================================================================

/// Search modes supported by the gateway, mapped onto the engine's
/// capabilities. Unknown mode strings default to `Natural`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Free-form narrative answer (graph completion)
    Natural,
    /// Alias for `Natural`, kept for callers that ask for "completion"
    Completion,
    /// Raw passages from source documents
    Chunks,
    /// Structured relations
    Insights,
    /// Engine-level synopses
    Summaries,
}

impl SearchMode {
    pub fn parse_mode(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "chunks" => Self::Chunks,
            "insights" => Self::Insights,
            "summaries" => Self::Summaries,
            "completion" | "graph" => Self::Completion,
            _ => Self::Natural,
        }
    }

    /// The engine-side query type name
    pub fn engine_query_type(&self) -> &'static str {
        match self {
            Self::Natural | Self::Completion => "GRAPH_COMPLETION",
            Self::Chunks => "CHUNKS",
            Self::Insights => "INSIGHTS",
            Self::Summaries => "SUMMARIES",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Natural => "natural",
            Self::Completion => "completion",
            Self::Chunks => "chunks",
            Self::Insights => "insights",
            Self::Summaries => "summaries",
        }
    }
}

// ============================================================================
// Results
// ============================================================================

/// One raw search result from the engine. The engine returns heterogeneous
/// values; this sum type replaces duck-typed attribute probing with an
/// explicit projection (see `RagGateway::project_result`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RagResult {
    /// Plain string result
    Text(String),
    /// Mapping with an explicit text field
    Keyed { text: String },
    /// Anything else the engine hands back
    Opaque(serde_json::Value),
}
