//! Administrative CLI
//!
//! Maintenance commands that run against the same data stores as the
//! server: job inspection and cleanup, registry inspection, and RAG
//! maintenance. Exit codes: 0 success, 1 configuration error, 2 partial
//! success (the operation ran but could not fully apply).

use clap::Subcommand;
use std::sync::Arc;

use crate::config::Config;
use crate::db;
use crate::services::analysis::{DeleteOutcome, JobRepository};
use crate::services::rag::{HttpRagStore, RagGateway};
use crate::services::registry::DocumentRegistry;

pub const EXIT_OK: u8 = 0;
pub const EXIT_CONFIG_ERROR: u8 = 1;
pub const EXIT_PARTIAL: u8 = 2;

#[derive(Subcommand, Debug, Clone)]
pub enum AdminCommand {
    /// Inspect and manage analysis jobs
    Jobs {
        #[command(subcommand)]
        action: JobsAction,
    },
    /// Inspect the document registry
    Registry {
        #[command(subcommand)]
        action: RegistryAction,
    },
    /// RAG engine maintenance
    Rag {
        #[command(subcommand)]
        action: RagAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum JobsAction {
    /// List all jobs
    List,
    /// Show one job in full
    Show { id: i64 },
    /// Request cancellation of a running job
    Cancel { id: i64 },
    /// Delete a job (refused while running)
    Delete { id: i64 },
}

#[derive(Subcommand, Debug, Clone)]
pub enum RegistryAction {
    /// List registered documents
    List {
        /// Filter by company name (substring match)
        #[arg(long)]
        company: Option<String>,
    },
    /// Show one document entry by accession number
    Show { accession: String },
    /// Generate (or regenerate) the summary for one document
    Summarize { accession: String },
}

#[derive(Subcommand, Debug, Clone)]
pub enum RagAction {
    /// Delete engine data and clear the search cache
    Prune,
    /// Destructive full reset: engine state, cache and registry
    Reset,
}

/// Run one admin command and return the process exit code
pub async fn run(command: AdminCommand, config: &Config) -> u8 {
    match command {
        AdminCommand::Jobs { action } => run_jobs(action, config).await,
        AdminCommand::Registry { action } => run_registry(action, config).await,
        AdminCommand::Rag { action } => run_rag(action, config).await,
    }
}

async fn run_jobs(action: JobsAction, config: &Config) -> u8 {
    let pool = match db::create_pool(&config.database.url).await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("Cannot open database {}: {}", config.database.url, e);
            return EXIT_CONFIG_ERROR;
        },
    };
    let repository = JobRepository::new(pool);

    match action {
        JobsAction::List => {
            let jobs = match repository.list().await {
                Ok(jobs) => jobs,
                Err(e) => {
                    eprintln!("Failed to list jobs: {}", e);
                    return EXIT_CONFIG_ERROR;
                },
            };

            println!("{:<6} {:<12} {:<6} {:<8} {:<22} QUERY", "ID", "STATUS", "ITER", "SCORE", "CREATED");
            for job in jobs {
                println!(
                    "{:<6} {:<12} {:<6} {:<8.1} {:<22} {}",
                    job.id,
                    job.status,
                    job.total_iterations,
                    job.final_completeness_score,
                    job.created_at.format("%Y-%m-%d %H:%M:%S"),
                    truncate(&job.query, 60),
                );
            }
            EXIT_OK
        },
        JobsAction::Show { id } => match repository.get(id).await {
            Ok(Some(job)) => {
                match serde_json::to_string_pretty(&job) {
                    Ok(rendered) => println!("{}", rendered),
                    Err(e) => {
                        eprintln!("Failed to render job {}: {}", id, e);
                        return EXIT_PARTIAL;
                    },
                }
                EXIT_OK
            },
            Ok(None) => {
                eprintln!("Job {} not found", id);
                EXIT_PARTIAL
            },
            Err(e) => {
                eprintln!("Failed to load job {}: {}", id, e);
                EXIT_CONFIG_ERROR
            },
        },
        JobsAction::Cancel { id } => match repository.get(id).await {
            Ok(Some(job)) if job.status_enum().is_terminal() => {
                println!("Job {} is already {}", id, job.status);
                EXIT_OK
            },
            Ok(Some(_)) => {
                if let Err(e) = repository.request_cancel(id).await {
                    eprintln!("Failed to request cancellation: {}", e);
                    return EXIT_CONFIG_ERROR;
                }
                println!("Cancellation requested for job {}", id);
                EXIT_OK
            },
            Ok(None) => {
                eprintln!("Job {} not found", id);
                EXIT_PARTIAL
            },
            Err(e) => {
                eprintln!("Failed to load job {}: {}", id, e);
                EXIT_CONFIG_ERROR
            },
        },
        JobsAction::Delete { id } => match repository.delete(id).await {
            Ok(DeleteOutcome::Deleted) => {
                println!("Deleted job {}", id);
                EXIT_OK
            },
            Ok(DeleteOutcome::InProgress) => {
                eprintln!("Job {} is running - cancel it first", id);
                EXIT_PARTIAL
            },
            Ok(DeleteOutcome::NotFound) => {
                eprintln!("Job {} not found", id);
                EXIT_PARTIAL
            },
            Err(e) => {
                eprintln!("Failed to delete job {}: {}", id, e);
                EXIT_CONFIG_ERROR
            },
        },
    }
}

async fn run_registry(action: RegistryAction, config: &Config) -> u8 {
    let registry =
        DocumentRegistry::load(Some(std::path::Path::new(&config.rag.data_root)));

    match action {
        RegistryAction::List { company } => {
            let entries = registry.list_all(company.as_deref()).await;
            println!(
                "{:<10} {:<28} {:<8} {:<12} {:<10} ACCESSION",
                "FPRINT", "COMPANY", "FORM", "FILED", "SUMMARY"
            );
            for entry in entries {
                println!(
                    "{:<10} {:<28} {:<8} {:<12} {:<10} {}",
                    &entry.fingerprint[..8],
                    truncate(&entry.metadata.company_name, 26),
                    entry.metadata.form_type,
                    entry.metadata.filing_date,
                    if entry.has_summary { "yes" } else { "no" },
                    entry.metadata.accession_number,
                );
            }
            EXIT_OK
        },
        RegistryAction::Summarize { accession } => {
            let llm = Arc::new(crate::services::ChatLlmClient::new(&config.llm));
            if !crate::services::ChatCompletion::is_available(llm.as_ref()) {
                eprintln!("AGENT_LLM_API_KEY not set - cannot generate summaries");
                return EXIT_CONFIG_ERROR;
            }

            let Some(entry) = registry.lookup_by_accession(&accession).await else {
                eprintln!("Document {} not found in registry", accession);
                return EXIT_PARTIAL;
            };

            let summarizer = crate::services::SummaryGenerator::new(llm);
            let summary = summarizer.summarize(&entry.full_content, &entry.metadata).await;
            registry.attach_summary(&entry.fingerprint, summary).await;
            println!(
                "Summary generated for {} {} ({})",
                entry.metadata.company_name, entry.metadata.form_type, accession
            );
            EXIT_OK
        },
        RegistryAction::Show { accession } => match registry.lookup_by_accession(&accession).await {
            Some(entry) => {
                println!("Fingerprint:    {}", entry.fingerprint);
                println!("Company:        {}", entry.metadata.company_name);
                println!("Form type:      {}", entry.metadata.form_type);
                println!("Filing date:    {}", entry.metadata.filing_date);
                println!("Content length: {}", entry.content_length);
                println!("Stored at:      {}", entry.stored_at.to_rfc3339());
                match &entry.summary {
                    Some(summary) => {
                        println!("\nExecutive summary:\n  {}", summary.executive_summary);
                        println!("\nFinancial highlights:\n  {}", summary.financial_highlights);
                        println!("\nInvestment insights:\n  {}", summary.investment_insights);
                        println!("\nRisk factors:\n  {}", summary.risk_factors);
                    },
                    None => println!("\nNo summary generated yet"),
                }
                EXIT_OK
            },
            None => {
                eprintln!("Document {} not found in registry", accession);
                EXIT_PARTIAL
            },
        },
    }
}

async fn run_rag(action: RagAction, config: &Config) -> u8 {
    let store = Arc::new(HttpRagStore::new(&config.rag));
    let gateway = RagGateway::new(store, config.rag.clone());

    match action {
        RagAction::Prune => match gateway.prune().await {
            Ok(()) => {
                println!("RAG data pruned and cache cleared");
                EXIT_OK
            },
            Err(e) => {
                eprintln!("Prune failed: {}", e);
                EXIT_PARTIAL
            },
        },
        RagAction::Reset => {
            let result = gateway.reset_all().await;
            let registry =
                DocumentRegistry::load(Some(std::path::Path::new(&config.rag.data_root)));
            registry.clear_all().await;

            match result {
                Ok(()) => {
                    println!("Complete reset successful - RAG state and registry cleared");
                    EXIT_OK
                },
                Err(e) => {
                    eprintln!("Reset incomplete: {}", e);
                    EXIT_PARTIAL
                },
            }
        },
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{}...", truncated)
}
