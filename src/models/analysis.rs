//! Analysis Job Models
//!
//! Row model for the analyses table plus request/response DTOs. The JSON
//! columns (`final_analysis`, `iteration_history`) are parsed on demand
//! through the typed payloads in `services::analysis::types`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use crate::services::analysis::types::{history, InvestmentAnalysis, IterationRecord};

// ============================================================================
// Job Status
// ============================================================================

/// Analysis job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse_status(s: &str) -> Self {
        match s {
            "PENDING" => Self::Pending,
            "IN_PROGRESS" => Self::InProgress,
            "COMPLETED" => Self::Completed,
            "FAILED" => Self::Failed,
            _ => Self::Cancelled,
        }
    }

    /// Terminal states never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

// ============================================================================
// Analysis Job Row
// ============================================================================

/// One iterative analysis job from the database
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub id: i64,
    pub query: String,
    pub company_filter: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
    pub cancel_requested: bool,
    pub total_iterations: i64,
    pub documents_analyzed: i64,
    pub rag_queries_executed: i64,
    pub final_completeness_score: f64,
    /// JSON-encoded `InvestmentAnalysis`
    pub final_analysis: Option<String>,
    /// JSON-encoded `Vec<IterationRecord>`
    pub iteration_history: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AnalysisJob {
    pub fn status_enum(&self) -> JobStatus {
        JobStatus::parse_status(&self.status)
    }

    /// Parse the stored final analysis, if any
    pub fn final_analysis_payload(&self) -> Option<InvestmentAnalysis> {
        self.final_analysis
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
    }

    /// Parse the stored iteration history; unreadable history is treated as
    /// empty rather than failing status reads
    pub fn iteration_records(&self) -> Vec<IterationRecord> {
        self.iteration_history
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default()
    }

    /// Extract the final recommendation from the analysis. A recommendation
    /// may be a bare string or a `{decision, rationale}` object; objects are
    /// flattened to "decision - rationale" when both parts are present.
    pub fn final_recommendation(&self) -> serde_json::Value {
        let Some(analysis) = self.final_analysis_payload() else {
            return serde_json::Value::String("Analysis incomplete".to_string());
        };
        analysis.recommendation()
    }

    /// Extract the confidence level from the final analysis
    pub fn confidence_level(&self) -> String {
        self.final_analysis_payload()
            .map(|a| a.confidence_level())
            .unwrap_or_else(|| "Unknown".to_string())
    }

    /// Most recent analysis payload in the iteration history (initial or
    /// refined), for rendering terminated jobs
    pub fn latest_iteration_analysis(&self) -> Option<InvestmentAnalysis> {
        history::latest_analysis(&self.iteration_records()).cloned()
    }

    /// True iff the job terminated without success but still carries
    /// something renderable
    pub fn has_partial_results(&self) -> bool {
        if !matches!(self.status_enum(), JobStatus::Cancelled | JobStatus::Failed) {
            return false;
        }

        self.final_analysis.is_some()
            || self.latest_iteration_analysis().is_some()
            || !self.iteration_records().is_empty()
    }
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

/// Request to start a new iterative analysis
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateAnalysisRequest {
    /// Investment query or question to analyze
    #[validate(length(min = 10, message = "Query must be at least 10 characters long"))]
    pub query: String,
    /// Optional company name to filter analyzed documents
    #[serde(default)]
    pub company_filter: Option<String>,
}

/// Lightweight row for the jobs list view
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AnalysisSummary {
    pub id: i64,
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_filter: Option<String>,
    pub status: JobStatus,
    pub total_iterations: i64,
    pub documents_analyzed: i64,
    pub final_completeness_score: f64,
    #[schema(value_type = Object)]
    pub final_recommendation: serde_json::Value,
    pub confidence_level: String,
    pub created_at: DateTime<Utc>,
}

impl From<&AnalysisJob> for AnalysisSummary {
    fn from(job: &AnalysisJob) -> Self {
        Self {
            id: job.id,
            query: job.query.clone(),
            company_filter: job.company_filter.clone(),
            status: job.status_enum(),
            total_iterations: job.total_iterations,
            documents_analyzed: job.documents_analyzed,
            final_completeness_score: job.final_completeness_score,
            final_recommendation: job.final_recommendation(),
            confidence_level: job.confidence_level(),
            created_at: job.created_at,
        }
    }
}
