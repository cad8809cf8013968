//! Database bootstrap
//!
//! Creates the SQLite pool and applies the schema for the analysis-jobs
//! table. The document registry does not live here - it persists as a JSON
//! file under the RAG data root (see `services::registry`).

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

/// Create the database pool and ensure the schema exists
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists for file-backed databases
    if let Some(path) = database_url.strip_prefix("sqlite://")
        && path != ":memory:"
        && let Some(parent) = std::path::Path::new(path).parent()
    {
        let _ = std::fs::create_dir_all(parent);
    }

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    apply_schema(&pool).await?;

    Ok(pool)
}

/// Create tables if they do not exist
pub async fn apply_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analyses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            query TEXT NOT NULL,
            company_filter TEXT,
            status TEXT NOT NULL DEFAULT 'PENDING',
            error_message TEXT,
            cancel_requested BOOLEAN NOT NULL DEFAULT FALSE,
            total_iterations INTEGER NOT NULL DEFAULT 0,
            documents_analyzed INTEGER NOT NULL DEFAULT 0,
            rag_queries_executed INTEGER NOT NULL DEFAULT 0,
            final_completeness_score REAL NOT NULL DEFAULT 0.0,
            final_analysis TEXT,
            iteration_history TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            completed_at TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_analyses_status ON analyses (status)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
