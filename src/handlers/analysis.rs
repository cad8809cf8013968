//! Analysis API Handlers
//!
//! REST endpoints for the iterative analysis jobs: create, poll, fetch
//! results, inspect iteration history, cancel and delete.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::ToSchema;
use validator::Validate;

use crate::models::{AnalysisSummary, CreateAnalysisRequest, JobStatus};
use crate::services::analysis::types::IterationRecord;
use crate::services::analysis::{BulkDeleteOutcome, CancelOutcome, DeleteOutcome};
use crate::utils::{ApiError, ApiResult};
use crate::AppState;

/// Start a new iterative analysis
/// POST /api/analysis/iterative
#[utoipa::path(
    post,
    path = "/api/analysis/iterative",
    request_body = CreateAnalysisRequest,
    responses(
        (status = 201, description = "Analysis started"),
        (status = 400, description = "Validation error"),
        (status = 503, description = "Analysis service unavailable")
    ),
    tag = "Analysis"
)]
pub async fn create_analysis(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateAnalysisRequest>,
) -> ApiResult<impl IntoResponse> {
    request
        .validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    if !state.llm.is_available() {
        return Err(ApiError::service_unavailable("LLM client not configured"));
    }

    let query = request.query.trim().to_string();
    let company_filter = request
        .company_filter
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let job = state.job_service.start(&query, company_filter).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": job.id,
            "message": "Iterative analysis started",
            "query": job.query,
            "company_filter": job.company_filter,
            "status": job.status,
            "estimated_completion": "2-5 minutes depending on complexity",
        })),
    ))
}

/// List analyses (lightweight rows)
/// GET /api/analysis/iterative
pub async fn list_analyses(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<AnalysisSummary>>> {
    let jobs = state.job_repository.list().await?;
    Ok(Json(jobs.iter().map(AnalysisSummary::from).collect()))
}

/// Poll analysis status and progress
/// GET /api/analysis/iterative/:id/status
#[utoipa::path(
    get,
    path = "/api/analysis/iterative/{id}/status",
    params(("id" = i64, Path, description = "Analysis job id")),
    responses(
        (status = 200, description = "Job status with progress counters"),
        (status = 404, description = "Job not found")
    ),
    tag = "Analysis"
)]
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let job = state
        .job_repository
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Analysis {} not found", id)))?;

    let status = job.status_enum();
    let completed_at = if status == JobStatus::Completed { job.completed_at } else { None };

    let mut response = json!({
        "id": job.id,
        "status": job.status.clone(),
        "query": job.query.clone(),
        "company_filter": job.company_filter.clone(),
        "cancel_requested": job.cancel_requested,
        "created_at": job.created_at,
        "completed_at": completed_at,
        "progress": {
            "total_iterations": job.total_iterations,
            "documents_analyzed": job.documents_analyzed,
            "rag_queries_executed": job.rag_queries_executed,
            "final_completeness_score": job.final_completeness_score,
        },
    });

    let fields = response.as_object_mut().expect("status response is an object");

    match status {
        JobStatus::Completed => {
            fields.insert("final_recommendation".to_string(), job.final_recommendation());
            fields.insert("confidence_level".to_string(), Value::String(job.confidence_level()));
        },
        JobStatus::Failed | JobStatus::Cancelled => {
            if status == JobStatus::Failed {
                fields.insert("error_message".to_string(), json!(job.error_message.clone()));
            }

            let has_partials = job.has_partial_results();
            fields.insert("has_partial_results".to_string(), Value::Bool(has_partials));

            if has_partials {
                if let Some(latest) = job.latest_iteration_analysis() {
                    fields.insert("latest_iteration_analysis".to_string(), json!(latest));
                }
                let reason = if status == JobStatus::Cancelled {
                    "Analysis was cancelled by user".to_string()
                } else {
                    format!(
                        "Analysis failed: {}",
                        job.error_message.as_deref().unwrap_or("unknown error")
                    )
                };
                fields.insert("termination_reason".to_string(), Value::String(reason));
            }
        },
        _ => {},
    }

    Ok(Json(response))
}

/// Full analysis payload
/// GET /api/analysis/iterative/:id/results
///
/// Permitted for completed jobs, and for cancelled/failed jobs that carry
/// partial results.
pub async fn get_results(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let job = state
        .job_repository
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Analysis {} not found", id)))?;

    let status = job.status_enum();
    let renderable = status == JobStatus::Completed
        || (matches!(status, JobStatus::Cancelled | JobStatus::Failed)
            && job.has_partial_results());

    if !renderable {
        return Err(ApiError::bad_request(format!(
            "Analysis not completed and no partial results available. Current status: {}",
            job.status
        )));
    }

    let final_analysis = job.final_analysis_payload();
    let iteration_history = job.iteration_records();
    let final_recommendation = job.final_recommendation();
    let confidence_level = job.confidence_level();

    Ok(Json(json!({
        "id": job.id,
        "query": job.query,
        "company_filter": job.company_filter,
        "final_analysis": final_analysis,
        "iteration_history": iteration_history,
        "total_iterations": job.total_iterations,
        "documents_analyzed": job.documents_analyzed,
        "rag_queries_executed": job.rag_queries_executed,
        "final_completeness_score": job.final_completeness_score,
        "created_at": job.created_at,
        "completed_at": job.completed_at,
        "status": job.status,
        "error_message": job.error_message,
        "final_recommendation": final_recommendation,
        "confidence_level": confidence_level,
        "cancel_requested": job.cancel_requested,
    })))
}

/// Formatted iteration history
/// GET /api/analysis/iterative/:id/iteration_details
pub async fn get_iteration_details(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let job = state
        .job_repository
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Analysis {} not found", id)))?;

    let formatted: Vec<Value> = job
        .iteration_records()
        .iter()
        .map(format_iteration_record)
        .collect();

    Ok(Json(json!({
        "analysis_id": job.id,
        "query": job.query,
        "total_iterations": job.total_iterations,
        "final_score": job.final_completeness_score,
        "iteration_history": formatted,
        "status": job.status,
    })))
}

fn format_iteration_record(record: &IterationRecord) -> Value {
    let mut formatted = json!({
        "iteration": record.iteration(),
        "type": record.type_name(),
        "timestamp": record.timestamp(),
    });
    let fields = formatted.as_object_mut().expect("formatted record is an object");

    match record {
        IterationRecord::InitialAnalysis { .. } => {
            fields.insert(
                "summary".to_string(),
                Value::String("Generated comprehensive initial analysis".to_string()),
            );
        },
        IterationRecord::Evaluation { evaluation, completeness_score, is_complete, .. } => {
            fields.insert("completeness_score".to_string(), json!(completeness_score));
            fields.insert("is_complete".to_string(), Value::Bool(*is_complete));
            fields.insert(
                "assessment".to_string(),
                Value::String(if evaluation.overall_assessment.is_empty() {
                    "Unknown".to_string()
                } else {
                    evaluation.overall_assessment.clone()
                }),
            );
            fields.insert(
                "questions_raised".to_string(),
                json!(evaluation.specific_questions.len()),
            );
        },
        IterationRecord::RagQueries { queries, .. } => {
            fields.insert("queries_executed".to_string(), json!(queries.len()));
            fields.insert("queries".to_string(), json!(queries));
        },
        IterationRecord::RefinedAnalysis { .. } => {
            fields.insert(
                "summary".to_string(),
                Value::String("Analysis refined with RAG results".to_string()),
            );
        },
    }

    formatted
}

/// Request cancellation of an in-progress analysis (idempotent)
/// POST /api/analysis/iterative/:id/cancel
#[utoipa::path(
    post,
    path = "/api/analysis/iterative/{id}/cancel",
    params(("id" = i64, Path, description = "Analysis job id")),
    responses(
        (status = 200, description = "Cancellation requested, or no-op on a terminal job"),
        (status = 404, description = "Job not found")
    ),
    tag = "Analysis"
)]
pub async fn cancel_analysis(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    match state.job_service.request_cancel(id).await? {
        CancelOutcome::NotFound => {
            Err(ApiError::not_found(format!("Analysis {} not found", id)))
        },
        CancelOutcome::AlreadyTerminal(job) => Ok(Json(json!({
            "status": job.status,
            "message": "Analysis is no longer running",
        }))),
        CancelOutcome::Requested(job) => Ok(Json(json!({
            "id": job.id,
            "status": job.status,
            "cancel_requested": true,
            "message": "Cancellation requested",
        }))),
    }
}

/// Delete an analysis (forbidden while running)
/// DELETE /api/analysis/iterative/:id
pub async fn delete_analysis(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    match state.job_repository.delete(id).await? {
        DeleteOutcome::Deleted => {
            tracing::info!("Analysis {} deleted successfully", id);
            Ok(StatusCode::NO_CONTENT)
        },
        DeleteOutcome::InProgress => Err(ApiError::bad_request(
            "Cannot delete a running analysis. Please cancel it first.",
        )),
        DeleteOutcome::NotFound => {
            Err(ApiError::not_found(format!("Analysis {} not found", id)))
        },
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkDeleteRequest {
    #[serde(default)]
    pub analysis_ids: Vec<i64>,
}

/// Delete multiple analyses
/// POST /api/analysis/iterative/bulk_delete
pub async fn bulk_delete_analyses(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BulkDeleteRequest>,
) -> ApiResult<impl IntoResponse> {
    if request.analysis_ids.is_empty() {
        return Err(ApiError::bad_request("No analysis IDs provided"));
    }

    match state.job_repository.bulk_delete(&request.analysis_ids).await? {
        BulkDeleteOutcome::Running { ids } => Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "Cannot delete running analyses. Please cancel them first.",
                "running_analyses": ids,
            })),
        )),
        BulkDeleteOutcome::Deleted { count } => {
            tracing::info!("Bulk deleted {} analyses", count);
            Ok((
                StatusCode::OK,
                Json(json!({
                    "message": format!("Successfully deleted {} analyses", count),
                    "deleted_count": count,
                })),
            ))
        },
    }
}

/// Capability probe for the analysis service
/// GET /api/analysis/iterative/service_status
#[utoipa::path(
    get,
    path = "/api/analysis/iterative/service_status",
    responses((status = 200, description = "Service availability and capabilities")),
    tag = "Analysis"
)]
pub async fn service_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    if !state.llm.is_available() {
        return Json(json!({
            "available": false,
            "error": "LLM client not configured",
            "requires": "AGENT_LLM_API_KEY environment variable",
        }));
    }

    let stats = state.registry.stats().await;

    Json(json!({
        "available": true,
        "service_ready": true,
        "documents_available": stats.total_documents,
        "companies_available": stats.companies.len(),
        "capabilities": [
            "Iterative analysis with self-improvement",
            "RAG-powered document querying",
            "Completeness evaluation and gap identification",
            "Targeted information retrieval",
            "Multi-iteration refinement",
        ],
    }))
}
