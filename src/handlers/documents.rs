//! Document & RAG API Handlers
//!
//! Ingestion from the filings source, registry views, and RAG maintenance.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::models::{DocumentSummaryInfo, RegistryEntryView, RegistryStats};
use crate::services::IngestOutcome;
use crate::utils::{ApiError, ApiResult};
use crate::AppState;

// ============================================================================
// Ingestion
// ============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct SearchAndStoreRequest {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    5
}

/// Search the filings source and ingest everything found
/// POST /api/documents/search_and_store
#[utoipa::path(
    post,
    path = "/api/documents/search_and_store",
    request_body = SearchAndStoreRequest,
    responses(
        (status = 200, description = "Per-filing ingestion outcomes"),
        (status = 400, description = "Empty query")
    ),
    tag = "Documents"
)]
pub async fn search_and_store(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchAndStoreRequest>,
) -> ApiResult<Json<Value>> {
    let query = request.query.trim();
    if query.is_empty() {
        return Err(ApiError::bad_request("Query cannot be empty"));
    }

    let filings = state.edgar.search_filings(query, request.limit).await;
    let total_found = filings.len();

    let mut stored = Vec::new();
    let mut duplicates = Vec::new();
    let mut failed = Vec::new();

    for filing in filings {
        let accession = filing.accession_number.clone();
        let company = filing.company_name.clone();
        let form = filing.form.clone();

        let Some(content) = state.edgar.fetch_content(&accession, &filing.cik).await else {
            failed.push(json!({
                "accession_number": accession,
                "company_name": company,
                "form": form,
                "reason": "Failed to fetch filing content",
            }));
            continue;
        };

        match state
            .ingest_service
            .ingest(content.content, filing.into_metadata())
            .await
        {
            IngestOutcome::Stored { fingerprint, rag_stored, content_length } => {
                stored.push(json!({
                    "accession_number": accession,
                    "company_name": company,
                    "form": form,
                    "fingerprint": fingerprint,
                    "rag_stored": rag_stored,
                    "content_length": content_length,
                }));
            },
            IngestOutcome::Duplicate { reason, existing } => {
                duplicates.push(json!({
                    "accession_number": accession,
                    "company_name": company,
                    "form": form,
                    "reason": reason,
                    "existing": existing,
                }));
            },
        }
    }

    Ok(Json(json!({
        "message": "Search and store completed",
        "query": query,
        "total_found": total_found,
        "stored_count": stored.len(),
        "duplicate_count": duplicates.len(),
        "failed_count": failed.len(),
        "results": {
            "stored": stored,
            "duplicates": duplicates,
            "failed": failed,
        },
    })))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CompanyQueryRequest {
    pub query: String,
    pub company_name: String,
    #[serde(default)]
    pub search_type: Option<String>,
}

/// Company-biased knowledge query
/// POST /api/documents/query_company
///
/// The company bias is prompt-level only (query concatenation); the engine
/// decides how strongly to honor it.
pub async fn query_company_documents(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CompanyQueryRequest>,
) -> ApiResult<Json<Value>> {
    let query = request.query.trim();
    let company = request.company_name.trim();
    if query.is_empty() || company.is_empty() {
        return Err(ApiError::bad_request("Both query and company_name are required"));
    }

    let mode = crate::services::rag::SearchMode::parse_mode(
        request.search_type.as_deref().unwrap_or("natural"),
    );

    let results = state.gateway.search_by_company(query, company, mode).await;
    let matching_documents = state.registry.list_all(Some(company)).await;
    let result_count = results.len();

    Ok(Json(json!({
        "query": query,
        "company_name": company,
        "search_type": mode.as_str(),
        "results": results,
        "result_count": result_count,
        "matching_documents": matching_documents,
    })))
}

// ============================================================================
// Registry views
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct DocumentListParams {
    pub company: Option<String>,
}

/// List registered documents (metadata only)
/// GET /api/documents
pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DocumentListParams>,
) -> Json<Vec<RegistryEntryView>> {
    Json(state.registry.list_all(params.company.as_deref()).await)
}

/// Registry statistics
/// GET /api/documents/stats
#[utoipa::path(
    get,
    path = "/api/documents/stats",
    responses((status = 200, description = "Registry statistics", body = RegistryStats)),
    tag = "Documents"
)]
pub async fn registry_stats(State(state): State<Arc<AppState>>) -> Json<RegistryStats> {
    Json(state.registry.stats().await)
}

#[derive(Debug, Deserialize)]
pub struct SummaryListParams {
    pub company: Option<String>,
    pub form_type: Option<String>,
}

/// Document summaries (the agent-metadata view)
/// GET /api/documents/summaries
pub async fn list_summaries(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SummaryListParams>,
) -> Json<Vec<DocumentSummaryInfo>> {
    Json(
        state
            .registry
            .document_summaries(params.company.as_deref(), params.form_type.as_deref())
            .await,
    )
}

/// One document's summary
/// GET /api/documents/:accession/summary
pub async fn get_document_summary(
    State(state): State<Arc<AppState>>,
    Path(accession): Path<String>,
) -> ApiResult<Json<Value>> {
    let entry = state
        .registry
        .lookup_by_accession(&accession)
        .await
        .ok_or_else(|| ApiError::not_found(format!("Document {} not found", accession)))?;

    Ok(Json(json!({
        "accession_number": entry.metadata.accession_number,
        "company_name": entry.metadata.company_name,
        "form_type": entry.metadata.form_type,
        "filing_date": entry.metadata.filing_date,
        "fingerprint": entry.fingerprint,
        "content_length": entry.content_length,
        "summary": entry.summary,
        "summary_generated_at": entry.summary_generated_at,
        "stored_at": entry.stored_at,
    })))
}

// ============================================================================
// RAG maintenance
// ============================================================================

/// Delete engine data and clear the search cache
/// POST /api/rag/prune
pub async fn rag_prune(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    state
        .gateway
        .prune()
        .await
        .map_err(|e| ApiError::internal(format!("Prune failed: {}", e)))?;

    Ok(Json(json!({ "message": "RAG data pruned and cache cleared" })))
}

/// Destructive full reset: engine state directories, cache and registry
/// POST /api/rag/reset
pub async fn rag_reset(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    state
        .gateway
        .reset_all()
        .await
        .map_err(|e| ApiError::internal(format!("Reset failed: {}", e)))?;
    state.registry.clear_all().await;

    Ok(Json(json!({
        "message": "Complete reset successful - RAG state and document registry cleared",
    })))
}

/// Gateway configuration and cache state
/// GET /api/rag/status
pub async fn rag_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let info = state.gateway.service_info();
    let stats = state.registry.stats().await;

    Json(json!({
        "rag": info,
        "registry": {
            "total_documents": stats.total_documents,
            "documents_with_summaries": stats.documents_with_summaries,
        },
        "llm_configured": state.llm.is_available(),
    }))
}
