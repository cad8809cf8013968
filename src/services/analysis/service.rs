//! Analysis Job Service
//!
//! Owns the job lifecycle: creates the row, spawns the controller on a
//! background task, and maps the run outcome onto the terminal state. The
//! worker is cooperatively cancelable through the persisted
//! `cancel_requested` flag, which it polls between phases.

use async_trait::async_trait;
use std::sync::Arc;

use crate::models::AnalysisJob;

use super::controller::{AnalysisController, CancelSignal, ProgressSink, ProgressUpdate};
use super::repository::JobRepository;

pub struct AnalysisJobService {
    repository: Arc<JobRepository>,
    controller: Arc<AnalysisController>,
}

#[derive(Debug)]
pub enum CancelOutcome {
    NotFound,
    /// Job already terminal; cancel is a no-op reporting the current state
    AlreadyTerminal(AnalysisJob),
    Requested(AnalysisJob),
}

impl AnalysisJobService {
    pub fn new(repository: Arc<JobRepository>, controller: Arc<AnalysisController>) -> Self {
        Self { repository, controller }
    }

    pub fn repository(&self) -> &JobRepository {
        &self.repository
    }

    /// Persist a new IN_PROGRESS job, spawn its worker, and return
    /// immediately with the row
    pub async fn start(
        &self,
        query: &str,
        company_filter: Option<&str>,
    ) -> Result<AnalysisJob, sqlx::Error> {
        let job = self.repository.create(query, company_filter).await?;

        let repository = Arc::clone(&self.repository);
        let controller = Arc::clone(&self.controller);
        let job_id = job.id;
        let query = query.to_string();
        let company_filter = company_filter.map(String::from);

        tokio::spawn(async move {
            Self::process_job(repository, controller, job_id, query, company_filter).await;
        });

        tracing::info!("Started analysis job {} for query: {}", job.id, job.query);
        Ok(job)
    }

    async fn process_job(
        repository: Arc<JobRepository>,
        controller: Arc<AnalysisController>,
        job_id: i64,
        query: String,
        company_filter: Option<String>,
    ) {
        let cancel = DbCancelSignal { repository: Arc::clone(&repository), job_id };
        let sink = DbProgressSink { repository: Arc::clone(&repository), job_id };

        let run = controller
            .run(&query, company_filter.as_deref(), &cancel, &sink)
            .await;

        let result = if run.cancelled {
            repository
                .mark_cancelled(job_id, "User cancelled analysis", &run)
                .await
        } else if let Some(error) = &run.error {
            tracing::error!("Analysis job {} failed: {}", job_id, error);
            repository.mark_failed(job_id, error, &run).await
        } else {
            repository.mark_completed(job_id, &run).await
        };

        if let Err(e) = result {
            tracing::error!("Failed to finalize analysis job {}: {}", job_id, e);
        } else {
            tracing::info!("Analysis job {} finalized", job_id);
        }
    }

    /// Idempotent cancellation request
    pub async fn request_cancel(&self, id: i64) -> Result<CancelOutcome, sqlx::Error> {
        let Some(job) = self.repository.get(id).await? else {
            return Ok(CancelOutcome::NotFound);
        };

        if job.status_enum().is_terminal() {
            return Ok(CancelOutcome::AlreadyTerminal(job));
        }

        self.repository.request_cancel(id).await?;
        let job = self.repository.get(id).await?.unwrap_or(job);
        Ok(CancelOutcome::Requested(job))
    }
}

// ============================================================================
// DB-backed controller capabilities
// ============================================================================

/// Cancel signal that reloads the persisted flag on every poll
struct DbCancelSignal {
    repository: Arc<JobRepository>,
    job_id: i64,
}

#[async_trait]
impl CancelSignal for DbCancelSignal {
    async fn is_cancelled(&self) -> bool {
        match self.repository.is_cancel_requested(self.job_id).await {
            Ok(requested) => requested,
            Err(e) => {
                tracing::warn!("Failed to read cancel flag for job {}: {}", self.job_id, e);
                false
            },
        }
    }
}

/// Progress sink writing incremental updates to the job row. Write errors
/// are logged and swallowed - losing one progress tick must not kill the
/// analysis.
struct DbProgressSink {
    repository: Arc<JobRepository>,
    job_id: i64,
}

#[async_trait]
impl ProgressSink for DbProgressSink {
    async fn update(&self, update: ProgressUpdate) {
        if let Err(e) = self.repository.update_progress(self.job_id, &update).await {
            tracing::warn!("Failed to update progress for job {}: {}", self.job_id, e);
        }
    }
}
