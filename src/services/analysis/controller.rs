//! Iterative Analysis Controller
//!
//! The critique-and-refine state machine: DRAFT once, then
//! EVALUATE -> (RETRIEVE -> REFINE) until the committee is satisfied or a
//! bound is hit. Progress is pushed through the `ProgressSink` at the end
//! of every phase so polling clients always observe a consistent prefix,
//! and the cancel signal is checked at every safe point - cancellation
//! keeps everything already persisted.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;

use crate::models::DocumentSummaryInfo;
use crate::services::grader::ResponseGrader;
use crate::services::llm::{parse_json_payload, ChatCompletion, LlmError};
use crate::services::rag::{RagGateway, SearchMode};
use crate::services::registry::DocumentRegistry;

use super::prompts;
use super::types::{
    history, AnalysisEvaluation, AnalysisQuality, AnalysisRun, InvestmentAnalysis,
    IterationRecord, RetrievalOutcome,
};

/// Hard cap on evaluation rounds
pub const MAX_ITERATIONS: u32 = 10;

/// Committee score at which the analysis counts as decision-ready
const COMPLETENESS_THRESHOLD: f64 = 7.0;

// ============================================================================
// Capability seams
// ============================================================================

/// Cooperative cancellation probe, polled at safe points only
#[async_trait]
pub trait CancelSignal: Send + Sync {
    async fn is_cancelled(&self) -> bool;
}

/// Incremental progress fields; only set fields are written
#[derive(Debug, Default, Clone)]
pub struct ProgressUpdate {
    pub total_iterations: Option<u32>,
    pub documents_analyzed: Option<usize>,
    pub rag_queries_executed: Option<u32>,
    pub final_completeness_score: Option<f64>,
    pub iteration_history: Option<Vec<IterationRecord>>,
    pub final_analysis: Option<InvestmentAnalysis>,
}

/// Where phase-by-phase progress lands (the job row in production)
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn update(&self, update: ProgressUpdate);
}

// ============================================================================
// Controller
// ============================================================================

pub struct AnalysisController {
    llm: Arc<dyn ChatCompletion>,
    registry: Arc<DocumentRegistry>,
    gateway: Arc<RagGateway>,
    grader: Arc<ResponseGrader>,
}

impl AnalysisController {
    pub fn new(
        llm: Arc<dyn ChatCompletion>,
        registry: Arc<DocumentRegistry>,
        gateway: Arc<RagGateway>,
        grader: Arc<ResponseGrader>,
    ) -> Self {
        Self { llm, registry, gateway, grader }
    }

    /// Run the complete iterative analysis for one query
    pub async fn run(
        &self,
        query: &str,
        company_filter: Option<&str>,
        cancel: &dyn CancelSignal,
        sink: &dyn ProgressSink,
    ) -> AnalysisRun {
        if !self.llm.is_available() {
            return AnalysisRun::failed(
                "LLM client not configured".to_string(),
                "Analysis failed: LLM client not configured".to_string(),
            );
        }

        tracing::info!("Starting iterative analysis for query: {}", query);

        // Step 1: gather the agent metadata
        let summaries = self.registry.document_summaries(company_filter, None).await;
        if summaries.is_empty() {
            return AnalysisRun::failed(
                "No documents available for analysis".to_string(),
                "Analysis failed: No documents available for analysis".to_string(),
            );
        }

        sink.update(ProgressUpdate {
            documents_analyzed: Some(summaries.len()),
            ..Default::default()
        })
        .await;

        if cancel.is_cancelled().await {
            tracing::info!("Cancellation requested before starting initial analysis");
            return AnalysisRun {
                final_analysis: None,
                iteration_history: Vec::new(),
                total_iterations: 0,
                documents_analyzed: summaries.len(),
                quality: AnalysisQuality {
                    final_completeness_score: 0.0,
                    improvement_achieved: false,
                    rag_queries_executed: 0,
                },
                cancelled: true,
                error: None,
                termination_reason: Some("User cancelled before analysis started".to_string()),
            };
        }

        // Step 2: initial comprehensive analysis
        tracing::info!("Generating initial comprehensive analysis...");
        let mut current_analysis = match self.generate_initial_analysis(query, &summaries).await {
            Ok(analysis) => analysis,
            Err(e) => {
                tracing::error!("Initial analysis failed: {}", e);
                let mut run = AnalysisRun::failed(
                    e.to_string(),
                    format!("Analysis failed: {}", e),
                );
                run.documents_analyzed = summaries.len();
                return run;
            },
        };

        let mut iteration_history = vec![IterationRecord::InitialAnalysis {
            iteration: 0,
            timestamp: Utc::now(),
            analysis: current_analysis.clone(),
        }];

        sink.update(ProgressUpdate {
            iteration_history: Some(iteration_history.clone()),
            final_analysis: Some(current_analysis.clone()),
            ..Default::default()
        })
        .await;

        // Step 3: iterative refinement loop
        for iteration in 1..=MAX_ITERATIONS {
            tracing::info!("Starting iteration {} - evaluating analysis completeness...", iteration);
            if cancel.is_cancelled().await {
                tracing::info!("Cancellation requested during evaluation phase");
                break;
            }

            let evaluation = match self.evaluate(query, &current_analysis).await {
                Ok(evaluation) => evaluation,
                Err(e) => {
                    tracing::error!("Evaluation failed in iteration {}: {}", iteration, e);
                    break;
                },
            };

            let completeness_score = evaluation.completeness_score;
            let is_complete = evaluation.is_analysis_complete;

            iteration_history.push(IterationRecord::Evaluation {
                iteration,
                timestamp: Utc::now(),
                evaluation: evaluation.clone(),
                completeness_score,
                is_complete,
            });

            sink.update(ProgressUpdate {
                total_iterations: Some(iteration),
                final_completeness_score: Some(completeness_score),
                iteration_history: Some(iteration_history.clone()),
                ..Default::default()
            })
            .await;

            if is_complete || completeness_score >= COMPLETENESS_THRESHOLD {
                tracing::info!(
                    "Analysis complete after {} iterations (score: {}/10)",
                    iteration,
                    completeness_score
                );
                break;
            }

            // Generate targeted retrieval queries
            tracing::info!("Generating targeted RAG queries for iteration {}...", iteration);
            let rag_queries = self.generate_queries(&evaluation, &summaries).await;

            if rag_queries.is_empty() {
                tracing::warn!("No RAG queries generated in iteration {}", iteration);
                break;
            }

            // Execute them, stopping early on cancellation
            tracing::info!("Executing {} RAG queries...", rag_queries.len());
            let mut outcomes = Vec::new();
            for rag_query in &rag_queries {
                if cancel.is_cancelled().await {
                    tracing::info!("Cancellation requested during RAG execution");
                    break;
                }
                outcomes.push(self.run_retrieval(rag_query).await);
            }

            iteration_history.push(IterationRecord::RagQueries {
                iteration,
                timestamp: Utc::now(),
                queries: rag_queries,
                results: outcomes.clone(),
            });

            sink.update(ProgressUpdate {
                rag_queries_executed: Some(history::total_rag_queries(&iteration_history)),
                iteration_history: Some(iteration_history.clone()),
                ..Default::default()
            })
            .await;

            // Refine with the retrieval evidence
            tracing::info!("Refining analysis with RAG results in iteration {}...", iteration);
            if cancel.is_cancelled().await {
                tracing::info!("Cancellation requested before refinement");
                break;
            }

            match self.refine(query, &current_analysis, &outcomes).await {
                Ok(refined) => {
                    current_analysis = refined;
                    iteration_history.push(IterationRecord::RefinedAnalysis {
                        iteration,
                        timestamp: Utc::now(),
                        analysis: current_analysis.clone(),
                    });

                    sink.update(ProgressUpdate {
                        final_analysis: Some(current_analysis.clone()),
                        iteration_history: Some(iteration_history.clone()),
                        ..Default::default()
                    })
                    .await;
                },
                Err(e) => {
                    tracing::error!("Refinement failed in iteration {}: {}", iteration, e);
                    break;
                },
            }
        }

        let total_iterations = history::evaluation_count(&iteration_history);
        let rag_queries_executed = history::total_rag_queries(&iteration_history);
        let final_completeness_score = history::final_completeness_score(&iteration_history);

        let cancelled = cancel.is_cancelled().await;
        if cancelled {
            tracing::info!("Analysis cancelled after {} iterations", total_iterations);
        } else {
            tracing::info!(
                "Iterative analysis completed - {} iterations, {} RAG queries",
                total_iterations,
                rag_queries_executed
            );
        }

        AnalysisRun {
            final_analysis: Some(current_analysis),
            iteration_history,
            total_iterations,
            documents_analyzed: summaries.len(),
            quality: AnalysisQuality {
                final_completeness_score,
                improvement_achieved: total_iterations > 0,
                rag_queries_executed,
            },
            cancelled,
            error: None,
            termination_reason: cancelled.then(|| "User cancelled analysis".to_string()),
        }
    }

    // ========================================================================
    // Phases
    // ========================================================================

    /// DRAFT: comprehensive initial analysis from the document summaries
    async fn generate_initial_analysis(
        &self,
        query: &str,
        summaries: &[DocumentSummaryInfo],
    ) -> Result<InvestmentAnalysis, LlmError> {
        let prompt = prompts::initial_analysis_prompt(query, summaries);
        let response = self.llm.complete(prompts::ANALYST_SYSTEM_PROMPT, &prompt).await?;

        let mut analysis: InvestmentAnalysis = parse_json_payload(&response)?;

        analysis.insert("query", Value::String(query.to_string()));
        analysis.insert("documents_analyzed", Value::from(summaries.len()));
        analysis.insert("analysis_type", Value::String("initial_comprehensive".to_string()));
        analysis.insert("timestamp", Value::String(Utc::now().to_rfc3339()));

        tracing::info!("Generated initial analysis for query: {}", query);
        Ok(analysis)
    }

    /// EVALUATE: committee grading of the current analysis
    async fn evaluate(
        &self,
        query: &str,
        analysis: &InvestmentAnalysis,
    ) -> Result<AnalysisEvaluation, LlmError> {
        let prompt = prompts::evaluation_prompt(query, analysis);
        let response = self.llm.complete(prompts::COMMITTEE_SYSTEM_PROMPT, &prompt).await?;

        let evaluation: AnalysisEvaluation = parse_json_payload(&response)?;
        tracing::info!(
            "Completed analysis evaluation - Completeness: {}/10",
            evaluation.completeness_score
        );
        Ok(evaluation)
    }

    /// RETRIEVE (planning): 3-5 targeted queries from the evaluation gaps.
    /// Errors collapse to an empty list, which terminates the loop.
    async fn generate_queries(
        &self,
        evaluation: &AnalysisEvaluation,
        summaries: &[DocumentSummaryInfo],
    ) -> Vec<String> {
        let prompt = prompts::query_generation_prompt(evaluation, summaries);

        let response = match self.llm.complete(prompts::QUERY_WRITER_SYSTEM_PROMPT, &prompt).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("Error generating RAG queries: {}", e);
                return Vec::new();
            },
        };

        match parse_json_payload::<Vec<String>>(&response) {
            Ok(queries) => {
                tracing::info!("Generated {} targeted RAG queries", queries.len());
                queries
            },
            Err(_) => {
                tracing::error!("Failed to parse RAG queries JSON");
                Vec::new()
            },
        }
    }

    /// RETRIEVE (execution): RAG search then grading/augmentation for one
    /// query. Never fails - empty answers are data the refiner can see.
    async fn run_retrieval(&self, query: &str) -> RetrievalOutcome {
        let original_results = self.gateway.search(query, SearchMode::Completion).await;

        let graded = self.grader.answer(query, original_results.clone()).await;

        RetrievalOutcome {
            query: query.to_string(),
            original_results,
            final_results: graded.final_answers,
            source: graded.source,
            validation: graded.validation,
            timestamp: Utc::now(),
        }
    }

    /// REFINE: same-schema analysis with the retrieval evidence integrated
    async fn refine(
        &self,
        query: &str,
        original: &InvestmentAnalysis,
        outcomes: &[RetrievalOutcome],
    ) -> Result<InvestmentAnalysis, LlmError> {
        let prompt = prompts::refinement_prompt(query, original, outcomes);
        let response = self.llm.complete(prompts::REFINER_SYSTEM_PROMPT, &prompt).await?;

        let mut refined: InvestmentAnalysis = parse_json_payload(&response)?;

        refined.insert("query", Value::String(query.to_string()));
        refined.insert("analysis_type", Value::String("refined_with_rag".to_string()));
        refined.insert("rag_queries_used", Value::from(outcomes.len()));
        refined.insert("refinement_timestamp", Value::String(Utc::now().to_rfc3339()));
        refined.insert("enhancement_applied", Value::Bool(true));

        tracing::info!("Successfully refined analysis with {} RAG query results", outcomes.len());
        Ok(refined)
    }
}
