// Job model and scheduler: lifecycle, terminal-state immutability,
// idempotent cancel, delete rules, and the full background flow.

use std::sync::Arc;
use std::time::Duration;

use crate::models::{AnalysisJob, JobStatus};
use crate::services::analysis::controller::ProgressUpdate;
use crate::services::analysis::repository::{BulkDeleteOutcome, DeleteOutcome};
use crate::services::analysis::service::CancelOutcome;
use crate::services::analysis::types::{AnalysisQuality, AnalysisRun};
use crate::services::analysis::{AnalysisController, AnalysisJobService, JobRepository};
use crate::services::grader::ResponseGrader;
use crate::services::llm::ChatCompletion;

use super::common::*;

fn completed_run(score: f64) -> AnalysisRun {
    AnalysisRun {
        final_analysis: serde_json::from_str(&refined_analysis_json()).ok(),
        iteration_history: Vec::new(),
        total_iterations: 2,
        documents_analyzed: 1,
        quality: AnalysisQuality {
            final_completeness_score: score,
            improvement_achieved: true,
            rag_queries_executed: 3,
        },
        cancelled: false,
        error: None,
        termination_reason: None,
    }
}

async fn service_with_chat(
    pool: sqlx::SqlitePool,
    chat: Arc<dyn ChatCompletion>,
) -> AnalysisJobService {
    let registry = seeded_registry().await;
    let controller = AnalysisController::new(
        chat,
        registry,
        Arc::new(test_gateway(vec!["Apple is a tech company.".to_string()])),
        Arc::new(ResponseGrader::new(Arc::new(UnconfiguredGrounded))),
    );

    AnalysisJobService::new(Arc::new(JobRepository::new(pool)), Arc::new(controller))
}

/// Poll the repository until the predicate holds or the timeout expires
async fn wait_for<F>(repository: &JobRepository, id: i64, predicate: F) -> AnalysisJob
where
    F: Fn(&AnalysisJob) -> bool,
{
    for _ in 0..500 {
        if let Ok(Some(job)) = repository.get(id).await
            && predicate(&job)
        {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for job {} to reach expected state", id);
}

#[tokio::test]
async fn create_starts_in_progress() {
    let pool = create_test_db().await;
    let repository = JobRepository::new(pool);

    let job = repository
        .create("Analyze Apple Inc's investment potential", Some("Apple"))
        .await
        .unwrap();

    assert_eq!(job.status_enum(), JobStatus::InProgress);
    assert_eq!(job.company_filter.as_deref(), Some("Apple"));
    assert!(!job.cancel_requested);
    assert_eq!(job.total_iterations, 0);
    assert!(job.completed_at.is_none());
}

#[tokio::test]
async fn terminal_states_never_transition_again() {
    let pool = create_test_db().await;
    let repository = JobRepository::new(pool);
    let job = repository.create("some investment question", None).await.unwrap();

    repository.mark_completed(job.id, &completed_run(8.0)).await.unwrap();

    // A late failure write from a racing worker must not change anything
    repository
        .mark_failed(job.id, "late failure", &AnalysisRun::failed("late".into(), "late".into()))
        .await
        .unwrap();
    let reloaded = repository.get(job.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status_enum(), JobStatus::Completed);
    assert!(reloaded.error_message.is_none());

    // Nor a late cancellation
    repository
        .mark_cancelled(job.id, "late cancel", &completed_run(1.0))
        .await
        .unwrap();
    let reloaded = repository.get(job.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status_enum(), JobStatus::Completed);
    assert!((reloaded.final_completeness_score - 8.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn update_progress_writes_only_set_fields() {
    let pool = create_test_db().await;
    let repository = JobRepository::new(pool);
    let job = repository.create("some investment question", None).await.unwrap();

    repository
        .update_progress(
            job.id,
            &ProgressUpdate { documents_analyzed: Some(4), ..Default::default() },
        )
        .await
        .unwrap();

    repository
        .update_progress(
            job.id,
            &ProgressUpdate {
                total_iterations: Some(2),
                final_completeness_score: Some(6.0),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let reloaded = repository.get(job.id).await.unwrap().unwrap();
    assert_eq!(reloaded.documents_analyzed, 4);
    assert_eq!(reloaded.total_iterations, 2);
    assert!((reloaded.final_completeness_score - 6.0).abs() < f64::EPSILON);
    // Untouched fields keep their values
    assert_eq!(reloaded.rag_queries_executed, 0);
    assert_eq!(reloaded.status_enum(), JobStatus::InProgress);
}

#[tokio::test]
async fn delete_rules() {
    let pool = create_test_db().await;
    let repository = JobRepository::new(pool);

    let running = repository.create("still running", None).await.unwrap();
    assert_eq!(repository.delete(running.id).await.unwrap(), DeleteOutcome::InProgress);

    repository.mark_completed(running.id, &completed_run(8.0)).await.unwrap();
    assert_eq!(repository.delete(running.id).await.unwrap(), DeleteOutcome::Deleted);

    assert_eq!(repository.delete(running.id).await.unwrap(), DeleteOutcome::NotFound);
    assert_eq!(repository.delete(999).await.unwrap(), DeleteOutcome::NotFound);
}

#[tokio::test]
async fn bulk_delete_refuses_running_jobs() {
    let pool = create_test_db().await;
    let repository = JobRepository::new(pool);

    let running = repository.create("running", None).await.unwrap();
    let done = repository.create("done", None).await.unwrap();
    repository.mark_completed(done.id, &completed_run(8.0)).await.unwrap();

    match repository.bulk_delete(&[running.id, done.id]).await.unwrap() {
        BulkDeleteOutcome::Running { ids } => assert_eq!(ids, vec![running.id]),
        other => panic!("expected Running, got {:?}", other),
    }

    // Nothing was deleted
    assert!(repository.get(done.id).await.unwrap().is_some());

    repository.mark_completed(running.id, &completed_run(5.0)).await.unwrap();
    match repository.bulk_delete(&[running.id, done.id]).await.unwrap() {
        BulkDeleteOutcome::Deleted { count } => assert_eq!(count, 2),
        other => panic!("expected Deleted, got {:?}", other),
    }
}

#[tokio::test]
async fn full_background_flow_completes_and_persists_counters() {
    let pool = create_test_db().await;
    let chat = Arc::new(ScriptedChat::new(vec![
        initial_analysis_json(),
        evaluation_json(5.0, false),
        queries_json(3),
        refined_analysis_json(),
        evaluation_json(8.0, false),
    ]));
    let service = service_with_chat(pool, chat).await;

    let job = service
        .start("Analyze Apple Inc's investment potential based on recent filings", None)
        .await
        .unwrap();
    assert_eq!(job.status_enum(), JobStatus::InProgress);

    let finished =
        wait_for(service.repository(), job.id, |j| j.status_enum().is_terminal()).await;

    assert_eq!(finished.status_enum(), JobStatus::Completed);
    assert_eq!(finished.total_iterations, 2);
    assert_eq!(finished.rag_queries_executed, 3);
    assert!((finished.final_completeness_score - 8.0).abs() < f64::EPSILON);
    assert_eq!(finished.documents_analyzed, 1);
    assert!(finished.completed_at.is_some());

    // Completed jobs expose the final recommendation, not partials
    assert!(!finished.has_partial_results());
    assert_eq!(
        finished.final_recommendation(),
        serde_json::Value::String("Buy - durable services growth".to_string())
    );
    assert_eq!(finished.confidence_level(), "High");

    // Invariants over the persisted history
    let records = finished.iteration_records();
    use crate::services::analysis::types::history;
    assert_eq!(history::evaluation_count(&records) as i64, finished.total_iterations);
    assert_eq!(history::total_rag_queries(&records) as i64, finished.rag_queries_executed);
    assert_eq!(
        history::final_completeness_score(&records),
        finished.final_completeness_score
    );
}

#[tokio::test]
async fn cancellation_flow_preserves_partials() {
    let pool = create_test_db().await;
    // Committee never satisfied, so the job spins until cancelled
    let chat = Arc::new(ScriptedChat::cycling(
        vec![initial_analysis_json()],
        vec![evaluation_json(4.0, false), queries_json(2), refined_analysis_json()],
    ));
    let service = service_with_chat(pool, chat).await;

    let job = service
        .start("Analyze Apple Inc's investment potential", None)
        .await
        .unwrap();

    // Wait until the first evaluation is persisted, then cancel
    wait_for(service.repository(), job.id, |j| j.total_iterations >= 1).await;

    match service.request_cancel(job.id).await.unwrap() {
        CancelOutcome::Requested(job) => assert!(job.cancel_requested),
        other => panic!("expected Requested, got {:?}", other),
    }

    let finished =
        wait_for(service.repository(), job.id, |j| j.status_enum().is_terminal()).await;
    assert_eq!(finished.status_enum(), JobStatus::Cancelled);
    assert_eq!(finished.error_message.as_deref(), Some("User cancelled analysis"));

    // Partial results survive cancellation
    assert!(finished.has_partial_results());
    assert!(finished.latest_iteration_analysis().is_some());
    assert!(finished.total_iterations >= 1);

    // A second cancel is a no-op reporting the terminal state
    match service.request_cancel(job.id).await.unwrap() {
        CancelOutcome::AlreadyTerminal(job) => {
            assert_eq!(job.status_enum(), JobStatus::Cancelled)
        },
        other => panic!("expected AlreadyTerminal, got {:?}", other),
    }
}

#[tokio::test]
async fn cancel_unknown_job_reports_not_found() {
    let pool = create_test_db().await;
    let chat = Arc::new(ScriptedChat::new(vec![]));
    let service = service_with_chat(pool, chat).await;

    assert!(matches!(service.request_cancel(12345).await.unwrap(), CancelOutcome::NotFound));
}

#[tokio::test]
async fn failed_job_keeps_partial_counters() {
    let pool = create_test_db().await;
    let repository = JobRepository::new(pool);
    let job = repository.create("doomed question", None).await.unwrap();

    // Simulate progress before the failure
    repository
        .update_progress(
            job.id,
            &ProgressUpdate {
                documents_analyzed: Some(2),
                total_iterations: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let failed_run = AnalysisRun::failed(
        "LLM timeout".to_string(),
        "Analysis failed: LLM timeout".to_string(),
    );
    repository.mark_failed(job.id, "LLM timeout", &failed_run).await.unwrap();

    let reloaded = repository.get(job.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status_enum(), JobStatus::Failed);
    assert_eq!(reloaded.error_message.as_deref(), Some("LLM timeout"));
    // Progress persisted before the failure is retained
    assert_eq!(reloaded.documents_analyzed, 2);
    assert_eq!(reloaded.total_iterations, 1);
    assert!(reloaded.completed_at.is_some());
}
