//! Job Repository - database operations for analysis jobs
//!
//! All writes that end a job are guarded on non-terminal status: a job that
//! reached COMPLETED/FAILED/CANCELLED never transitions again, no matter
//! what a racing worker tries to write.

use sqlx::sqlite::SqliteArguments;
use sqlx::{Arguments, SqlitePool};

use crate::models::{AnalysisJob, JobStatus};

use super::controller::ProgressUpdate;
use super::types::AnalysisRun;

pub struct JobRepository {
    pool: SqlitePool,
}

#[derive(Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
    InProgress,
}

#[derive(Debug)]
pub enum BulkDeleteOutcome {
    Deleted { count: u64 },
    Running { ids: Vec<i64> },
}

impl JobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a job directly in IN_PROGRESS; the worker is spawned right
    /// after and the job is observable immediately
    pub async fn create(
        &self,
        query: &str,
        company_filter: Option<&str>,
    ) -> Result<AnalysisJob, sqlx::Error> {
        let result = sqlx::query(
            r#"INSERT INTO analyses (query, company_filter, status)
               VALUES (?, ?, 'IN_PROGRESS')"#,
        )
        .bind(query)
        .bind(company_filter)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.get_required(id).await
    }

    pub async fn get(&self, id: i64) -> Result<Option<AnalysisJob>, sqlx::Error> {
        sqlx::query_as::<_, AnalysisJob>("SELECT * FROM analyses WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn get_required(&self, id: i64) -> Result<AnalysisJob, sqlx::Error> {
        sqlx::query_as::<_, AnalysisJob>("SELECT * FROM analyses WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
    }

    pub async fn list(&self) -> Result<Vec<AnalysisJob>, sqlx::Error> {
        sqlx::query_as::<_, AnalysisJob>("SELECT * FROM analyses ORDER BY created_at DESC, id DESC")
            .fetch_all(&self.pool)
            .await
    }

    /// Apply the changed fields of one progress update. Only set fields are
    /// written, so concurrent pollers see monotonic progress.
    pub async fn update_progress(
        &self,
        id: i64,
        update: &ProgressUpdate,
    ) -> Result<(), sqlx::Error> {
        let mut sql = String::from("UPDATE analyses SET id = id");
        let mut args = SqliteArguments::default();

        if let Some(total_iterations) = update.total_iterations {
            sql.push_str(", total_iterations = ?");
            args.add(total_iterations as i64);
        }
        if let Some(documents_analyzed) = update.documents_analyzed {
            sql.push_str(", documents_analyzed = ?");
            args.add(documents_analyzed as i64);
        }
        if let Some(rag_queries_executed) = update.rag_queries_executed {
            sql.push_str(", rag_queries_executed = ?");
            args.add(rag_queries_executed as i64);
        }
        if let Some(score) = update.final_completeness_score {
            sql.push_str(", final_completeness_score = ?");
            args.add(score);
        }
        if let Some(history) = &update.iteration_history {
            sql.push_str(", iteration_history = ?");
            args.add(serde_json::to_string(history).unwrap_or_else(|_| "[]".to_string()));
        }
        if let Some(analysis) = &update.final_analysis {
            sql.push_str(", final_analysis = ?");
            args.add(serde_json::to_string(analysis).unwrap_or_else(|_| "{}".to_string()));
        }

        sql.push_str(" WHERE id = ?");
        args.add(id);

        sqlx::query_with(&sql, args).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn is_cancel_requested(&self, id: i64) -> Result<bool, sqlx::Error> {
        let requested: Option<bool> =
            sqlx::query_scalar("SELECT cancel_requested FROM analyses WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(requested.unwrap_or(false))
    }

    /// Set the cancel flag. Separate from status on purpose - only the
    /// controller observes the flag and drives the CANCELLED transition.
    pub async fn request_cancel(&self, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE analyses SET cancel_requested = TRUE WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ========================================================================
    // Terminal transitions (guarded)
    // ========================================================================

    pub async fn mark_completed(&self, id: i64, run: &AnalysisRun) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"UPDATE analyses SET
                   status = 'COMPLETED',
                   final_analysis = ?,
                   iteration_history = ?,
                   total_iterations = ?,
                   documents_analyzed = ?,
                   rag_queries_executed = ?,
                   final_completeness_score = ?,
                   completed_at = CURRENT_TIMESTAMP
               WHERE id = ? AND status NOT IN ('COMPLETED', 'FAILED', 'CANCELLED')"#,
        )
        .bind(encode_analysis(run))
        .bind(encode_history(run))
        .bind(run.total_iterations as i64)
        .bind(run.documents_analyzed as i64)
        .bind(run.quality.rag_queries_executed as i64)
        .bind(run.quality.final_completeness_score)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark failed, preserving whatever partial progress the run carried
    pub async fn mark_failed(
        &self,
        id: i64,
        error_message: &str,
        run: &AnalysisRun,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"UPDATE analyses SET
                   status = 'FAILED',
                   error_message = ?,
                   final_analysis = COALESCE(?, final_analysis),
                   iteration_history = COALESCE(?, iteration_history),
                   total_iterations = MAX(total_iterations, ?),
                   documents_analyzed = MAX(documents_analyzed, ?),
                   rag_queries_executed = MAX(rag_queries_executed, ?),
                   completed_at = CURRENT_TIMESTAMP
               WHERE id = ? AND status NOT IN ('COMPLETED', 'FAILED', 'CANCELLED')"#,
        )
        .bind(error_message)
        .bind(encode_analysis(run))
        .bind((!run.iteration_history.is_empty()).then(|| encode_history(run)))
        .bind(run.total_iterations as i64)
        .bind(run.documents_analyzed as i64)
        .bind(run.quality.rag_queries_executed as i64)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark cancelled, preserving partial state
    pub async fn mark_cancelled(
        &self,
        id: i64,
        message: &str,
        run: &AnalysisRun,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"UPDATE analyses SET
                   status = 'CANCELLED',
                   error_message = ?,
                   final_analysis = COALESCE(?, final_analysis),
                   iteration_history = COALESCE(?, iteration_history),
                   total_iterations = MAX(total_iterations, ?),
                   documents_analyzed = MAX(documents_analyzed, ?),
                   rag_queries_executed = MAX(rag_queries_executed, ?),
                   final_completeness_score = ?,
                   completed_at = CURRENT_TIMESTAMP
               WHERE id = ? AND status NOT IN ('COMPLETED', 'FAILED', 'CANCELLED')"#,
        )
        .bind(message)
        .bind(encode_analysis(run))
        .bind((!run.iteration_history.is_empty()).then(|| encode_history(run)))
        .bind(run.total_iterations as i64)
        .bind(run.documents_analyzed as i64)
        .bind(run.quality.rag_queries_executed as i64)
        .bind(run.quality.final_completeness_score)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ========================================================================
    // Deletion
    // ========================================================================

    /// Delete one job; running jobs are refused
    pub async fn delete(&self, id: i64) -> Result<DeleteOutcome, sqlx::Error> {
        let Some(job) = self.get(id).await? else {
            return Ok(DeleteOutcome::NotFound);
        };

        if job.status_enum() == JobStatus::InProgress {
            return Ok(DeleteOutcome::InProgress);
        }

        sqlx::query("DELETE FROM analyses WHERE id = ? AND status != 'IN_PROGRESS'")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(DeleteOutcome::Deleted)
    }

    /// Delete many jobs, refusing the whole batch if any are running
    pub async fn bulk_delete(&self, ids: &[i64]) -> Result<BulkDeleteOutcome, sqlx::Error> {
        if ids.is_empty() {
            return Ok(BulkDeleteOutcome::Deleted { count: 0 });
        }

        let placeholders = vec!["?"; ids.len()].join(", ");

        let running_sql = format!(
            "SELECT id FROM analyses WHERE status = 'IN_PROGRESS' AND id IN ({})",
            placeholders
        );
        let mut running_query = sqlx::query_scalar::<_, i64>(&running_sql);
        for id in ids {
            running_query = running_query.bind(id);
        }
        let running: Vec<i64> = running_query.fetch_all(&self.pool).await?;

        if !running.is_empty() {
            return Ok(BulkDeleteOutcome::Running { ids: running });
        }

        let delete_sql = format!("DELETE FROM analyses WHERE id IN ({})", placeholders);
        let mut delete_query = sqlx::query(&delete_sql);
        for id in ids {
            delete_query = delete_query.bind(id);
        }
        let result = delete_query.execute(&self.pool).await?;

        Ok(BulkDeleteOutcome::Deleted { count: result.rows_affected() })
    }
}

fn encode_analysis(run: &AnalysisRun) -> Option<String> {
    run.final_analysis
        .as_ref()
        .and_then(|analysis| serde_json::to_string(analysis).ok())
}

fn encode_history(run: &AnalysisRun) -> String {
    serde_json::to_string(&run.iteration_history).unwrap_or_else(|_| "[]".to_string())
}
