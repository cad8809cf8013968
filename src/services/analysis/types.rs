//! Analysis Payload Types
//!
//! Typed views over the JSON the LLM produces and the engine persists:
//! the structured analysis, the committee evaluation, and the append-only
//! iteration history. Analyses stay close to raw JSON on purpose - the LLM
//! owns the prose, we only address the keys we act on and must hand the
//! rest back unchanged when refining.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::services::grader::{AnswerSource, ValidationVerdict};

// ============================================================================
// Investment analysis
// ============================================================================

/// One structured analysis: a JSON object with the agreed section keys
/// (executive_summary, financial_analysis, investment_opportunities,
/// risk_assessment, market_position, valuation_insights, recommendation,
/// confidence_level, data_gaps) plus whatever else the model added.
///
/// Parsing rejects non-objects; everything else passes through losslessly
/// so refinement rounds never drop model-authored content.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(transparent)]
pub struct InvestmentAnalysis(pub Map<String, Value>);

impl InvestmentAnalysis {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.0.insert(key.to_string(), value);
    }

    /// The recommendation, flattening `{decision, rationale}` objects to
    /// "decision - rationale" while passing plain strings (and anything
    /// else) through for the caller to render.
    pub fn recommendation(&self) -> Value {
        let Some(recommendation) = self.get("recommendation") else {
            return Value::String("No recommendation available".to_string());
        };

        if let Value::Object(fields) = recommendation {
            let decision = fields.get("decision").and_then(Value::as_str).unwrap_or("");
            let rationale = fields.get("rationale").and_then(Value::as_str).unwrap_or("");

            return match (decision.is_empty(), rationale.is_empty()) {
                (false, false) => Value::String(format!("{} - {}", decision, rationale)),
                (false, true) => Value::String(decision.to_string()),
                (true, false) => Value::String(rationale.to_string()),
                (true, true) => recommendation.clone(),
            };
        }

        recommendation.clone()
    }

    pub fn confidence_level(&self) -> String {
        self.get("confidence_level")
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .to_string()
    }
}

// ============================================================================
// Committee evaluation
// ============================================================================

/// The investment-committee verdict on one analysis round
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AnalysisEvaluation {
    #[serde(default)]
    pub overall_assessment: String,
    /// 1-10; 7+ indicates sufficient completeness for a practical decision
    #[serde(default)]
    pub completeness_score: f64,
    #[serde(default)]
    pub specific_questions: Vec<String>,
    #[serde(default)]
    pub missing_areas: Vec<String>,
    #[serde(default)]
    pub data_needs: Vec<String>,
    #[serde(default)]
    pub methodology_concerns: Vec<String>,
    #[serde(default)]
    pub actionability: String,
    #[serde(default)]
    pub next_steps: Vec<String>,
    #[serde(default)]
    pub is_analysis_complete: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// Retrieval outcomes
// ============================================================================

/// One retrieval round-trip: the RAG answer, the grader's verdict, and the
/// final answer chosen (RAG or web-augmented)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalOutcome {
    pub query: String,
    pub original_results: Vec<String>,
    pub final_results: Vec<String>,
    pub source: AnswerSource,
    pub validation: ValidationVerdict,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Iteration history
// ============================================================================

/// Append-only record of everything a job did, in the order it happened
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IterationRecord {
    InitialAnalysis {
        iteration: u32,
        timestamp: DateTime<Utc>,
        analysis: InvestmentAnalysis,
    },
    Evaluation {
        iteration: u32,
        timestamp: DateTime<Utc>,
        evaluation: AnalysisEvaluation,
        completeness_score: f64,
        is_complete: bool,
    },
    RagQueries {
        iteration: u32,
        timestamp: DateTime<Utc>,
        queries: Vec<String>,
        results: Vec<RetrievalOutcome>,
    },
    RefinedAnalysis {
        iteration: u32,
        timestamp: DateTime<Utc>,
        analysis: InvestmentAnalysis,
    },
}

impl IterationRecord {
    pub fn iteration(&self) -> u32 {
        match self {
            Self::InitialAnalysis { iteration, .. }
            | Self::Evaluation { iteration, .. }
            | Self::RagQueries { iteration, .. }
            | Self::RefinedAnalysis { iteration, .. } => *iteration,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::InitialAnalysis { timestamp, .. }
            | Self::Evaluation { timestamp, .. }
            | Self::RagQueries { timestamp, .. }
            | Self::RefinedAnalysis { timestamp, .. } => *timestamp,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::InitialAnalysis { .. } => "initial_analysis",
            Self::Evaluation { .. } => "evaluation",
            Self::RagQueries { .. } => "rag_queries",
            Self::RefinedAnalysis { .. } => "refined_analysis",
        }
    }
}

/// History accessors shared by the controller, the job model and the API
pub mod history {
    use super::*;

    /// `total_iterations` equals the number of evaluation records
    pub fn evaluation_count(records: &[IterationRecord]) -> u32 {
        records
            .iter()
            .filter(|r| matches!(r, IterationRecord::Evaluation { .. }))
            .count() as u32
    }

    /// `rag_queries_executed` equals the sum of query-list lengths
    pub fn total_rag_queries(records: &[IterationRecord]) -> u32 {
        records
            .iter()
            .filter_map(|r| match r {
                IterationRecord::RagQueries { queries, .. } => Some(queries.len() as u32),
                _ => None,
            })
            .sum()
    }

    /// Completeness score of the last evaluation record, or 0 if none
    pub fn final_completeness_score(records: &[IterationRecord]) -> f64 {
        records
            .iter()
            .rev()
            .find_map(|r| match r {
                IterationRecord::Evaluation { completeness_score, .. } => Some(*completeness_score),
                _ => None,
            })
            .unwrap_or(0.0)
    }

    /// Most recent analysis payload (initial or refined)
    pub fn latest_analysis(records: &[IterationRecord]) -> Option<&InvestmentAnalysis> {
        records.iter().rev().find_map(|r| match r {
            IterationRecord::InitialAnalysis { analysis, .. }
            | IterationRecord::RefinedAnalysis { analysis, .. } => Some(analysis),
            _ => None,
        })
    }
}

// ============================================================================
// Run results
// ============================================================================

/// Derived quality numbers reported with every terminal state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisQuality {
    pub final_completeness_score: f64,
    pub improvement_achieved: bool,
    pub rag_queries_executed: u32,
}

/// What one controller run produced. Failure and cancellation still carry
/// everything persisted so far - partial progress is never discarded.
#[derive(Debug, Clone)]
pub struct AnalysisRun {
    pub final_analysis: Option<InvestmentAnalysis>,
    pub iteration_history: Vec<IterationRecord>,
    pub total_iterations: u32,
    pub documents_analyzed: usize,
    pub quality: AnalysisQuality,
    pub cancelled: bool,
    pub error: Option<String>,
    pub termination_reason: Option<String>,
}

impl AnalysisRun {
    pub fn failed(error: String, termination_reason: String) -> Self {
        Self {
            final_analysis: None,
            iteration_history: Vec::new(),
            total_iterations: 0,
            documents_analyzed: 0,
            quality: AnalysisQuality {
                final_completeness_score: 0.0,
                improvement_achieved: false,
                rag_queries_executed: 0,
            },
            cancelled: false,
            error: Some(error),
            termination_reason: Some(termination_reason),
        }
    }
}
