// HTTP contract tests: status codes and response shapes of the analysis
// API, driven through the real router with stubbed services.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::routing::{delete, get, post};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use crate::config::EdgarConfig;
use crate::handlers;
use crate::models::JobStatus;
use crate::services::analysis::{AnalysisController, AnalysisJobService, JobRepository};
use crate::services::grader::ResponseGrader;
use crate::services::llm::ChatCompletion;
use crate::services::registry::DocumentRegistry;
use crate::services::{EdgarService, IngestService, SummaryGenerator};
use crate::AppState;

use super::common::*;

async fn test_state(chat: Arc<dyn ChatCompletion>, registry: Arc<DocumentRegistry>) -> Arc<AppState> {
    let pool = create_test_db().await;

    let gateway = Arc::new(test_gateway(vec!["Apple is a tech company.".to_string()]));
    let grader = Arc::new(ResponseGrader::new(Arc::new(UnconfiguredGrounded)));
    let summarizer = Arc::new(SummaryGenerator::new(Arc::clone(&chat)));

    let ingest_service = Arc::new(IngestService::new(
        Arc::clone(&registry),
        Arc::clone(&gateway),
        summarizer,
    ));

    let controller = Arc::new(AnalysisController::new(
        Arc::clone(&chat),
        Arc::clone(&registry),
        Arc::clone(&gateway),
        grader,
    ));

    let job_repository = Arc::new(JobRepository::new(pool.clone()));
    let job_service = Arc::new(AnalysisJobService::new(
        Arc::clone(&job_repository),
        controller,
    ));

    Arc::new(AppState {
        db: pool,
        llm: chat,
        registry,
        gateway,
        edgar: Arc::new(EdgarService::new(&EdgarConfig::default())),
        ingest_service,
        job_service,
        job_repository,
    })
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/api/analysis/iterative",
            post(handlers::analysis::create_analysis).get(handlers::analysis::list_analyses),
        )
        .route(
            "/api/analysis/iterative/service_status",
            get(handlers::analysis::service_status),
        )
        .route(
            "/api/analysis/iterative/bulk_delete",
            post(handlers::analysis::bulk_delete_analyses),
        )
        .route("/api/analysis/iterative/:id/status", get(handlers::analysis::get_status))
        .route("/api/analysis/iterative/:id/results", get(handlers::analysis::get_results))
        .route(
            "/api/analysis/iterative/:id/iteration_details",
            get(handlers::analysis::get_iteration_details),
        )
        .route("/api/analysis/iterative/:id/cancel", post(handlers::analysis::cancel_analysis))
        .route("/api/analysis/iterative/:id", delete(handlers::analysis::delete_analysis))
        .with_state(state)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn create_rejects_short_queries() {
    let state = test_state(
        Arc::new(ScriptedChat::new(vec![])),
        seeded_registry().await,
    )
    .await;

    let response = router(state)
        .oneshot(post_json("/api/analysis/iterative", json!({ "query": "too short" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("at least 10 characters"));
}

#[tokio::test]
async fn create_requires_a_configured_llm() {
    let state = test_state(Arc::new(UnavailableChat), seeded_registry().await).await;

    let response = router(state)
        .oneshot(post_json(
            "/api/analysis/iterative",
            json!({ "query": "Analyze Apple Inc's investment potential" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn create_returns_201_and_job_completes() {
    let state = test_state(
        Arc::new(ScriptedChat::new(vec![
            initial_analysis_json(),
            evaluation_json(9.0, false),
        ])),
        seeded_registry().await,
    )
    .await;

    let response = router(Arc::clone(&state))
        .oneshot(post_json(
            "/api/analysis/iterative",
            json!({
                "query": "Analyze Apple Inc's investment potential based on recent filings",
                "company_filter": "Apple",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["status"], "IN_PROGRESS");
    assert_eq!(body["company_filter"], "Apple");
    let id = body["id"].as_i64().unwrap();

    // Wait for the background worker, then poll the status endpoint
    for _ in 0..500 {
        let job = state.job_repository.get(id).await.unwrap().unwrap();
        if job.status_enum().is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let response = router(state)
        .oneshot(get_request(&format!("/api/analysis/iterative/{}/status", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "COMPLETED");
    assert_eq!(body["progress"]["total_iterations"], 1);
    assert_eq!(body["progress"]["documents_analyzed"], 1);
    assert_eq!(body["final_recommendation"], "Buy");
    assert_eq!(body["confidence_level"], "Medium");
    assert!(body["completed_at"].is_string());
}

#[tokio::test]
async fn status_of_unknown_job_is_404() {
    let state = test_state(
        Arc::new(ScriptedChat::new(vec![])),
        seeded_registry().await,
    )
    .await;

    let response = router(state)
        .oneshot(get_request("/api/analysis/iterative/4242/status"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["code"], 404);
}

#[tokio::test]
async fn results_of_an_unfinished_job_are_400() {
    let state = test_state(
        Arc::new(ScriptedChat::new(vec![])),
        seeded_registry().await,
    )
    .await;

    // A job with no worker attached stays IN_PROGRESS
    let job = state.job_repository.create("some pending question", None).await.unwrap();

    let response = router(state)
        .oneshot(get_request(&format!("/api/analysis/iterative/{}/results", job.id)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("Current status: IN_PROGRESS"));
}

#[tokio::test]
async fn delete_refuses_running_jobs() {
    let state = test_state(
        Arc::new(ScriptedChat::new(vec![])),
        seeded_registry().await,
    )
    .await;

    let job = state.job_repository.create("still running", None).await.unwrap();

    let response = router(Arc::clone(&state))
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/analysis/iterative/{}", job.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(state.job_repository.get(job.id).await.unwrap().unwrap().status, "IN_PROGRESS");
}

#[tokio::test]
async fn cancel_on_a_terminal_job_is_a_no_op() {
    let state = test_state(
        Arc::new(ScriptedChat::new(vec![])),
        seeded_registry().await,
    )
    .await;

    let job = state.job_repository.create("finished question", None).await.unwrap();
    state
        .job_repository
        .mark_failed(job.id, "boom", &crate::services::analysis::AnalysisRun::failed(
            "boom".to_string(),
            "Analysis failed: boom".to_string(),
        ))
        .await
        .unwrap();

    let response = router(Arc::clone(&state))
        .oneshot(post_json(
            &format!("/api/analysis/iterative/{}/cancel", job.id),
            json!({}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["message"], "Analysis is no longer running");
    assert_eq!(body["status"], "FAILED");

    // The status stays FAILED and the flag had no effect on the state
    let reloaded = state.job_repository.get(job.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status_enum(), JobStatus::Failed);
}

#[tokio::test]
async fn bulk_delete_with_empty_list_is_400() {
    let state = test_state(
        Arc::new(ScriptedChat::new(vec![])),
        seeded_registry().await,
    )
    .await;

    let response = router(state)
        .oneshot(post_json(
            "/api/analysis/iterative/bulk_delete",
            json!({ "analysis_ids": [] }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "No analysis IDs provided");
}

#[tokio::test]
async fn bulk_delete_reports_running_ids() {
    let state = test_state(
        Arc::new(ScriptedChat::new(vec![])),
        seeded_registry().await,
    )
    .await;

    let running = state.job_repository.create("running", None).await.unwrap();

    let response = router(state)
        .oneshot(post_json(
            "/api/analysis/iterative/bulk_delete",
            json!({ "analysis_ids": [running.id] }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["running_analyses"], json!([running.id]));
}

#[tokio::test]
async fn service_status_reports_llm_and_corpus_availability() {
    // Unavailable LLM
    let state = test_state(Arc::new(UnavailableChat), seeded_registry().await).await;
    let response = router(state)
        .oneshot(get_request("/api/analysis/iterative/service_status"))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["available"], false);
    assert_eq!(body["requires"], "AGENT_LLM_API_KEY environment variable");

    // Available LLM with one seeded document
    let state = test_state(
        Arc::new(ScriptedChat::new(vec![])),
        seeded_registry().await,
    )
    .await;
    let response = router(state)
        .oneshot(get_request("/api/analysis/iterative/service_status"))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["available"], true);
    assert_eq!(body["documents_available"], 1);
    assert_eq!(body["companies_available"], 1);
}
