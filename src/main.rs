use axum::{
    routing::{delete, get, post},
    Router,
};
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use finsight::config::{CommandLineArgs, Config};
use finsight::services::analysis::{AnalysisController, AnalysisJobService, JobRepository};
use finsight::services::grader::GeminiSearchClient;
use finsight::services::rag::HttpRagStore;
use finsight::services::{
    ChatCompletion, ChatLlmClient, DocumentRegistry, EdgarService, IngestService, RagGateway,
    ResponseGrader, SummaryGenerator,
};
use finsight::{admin, db, handlers, models, AppState};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::analysis::create_analysis,
        handlers::analysis::get_status,
        handlers::analysis::cancel_analysis,
        handlers::analysis::service_status,
        handlers::documents::search_and_store,
        handlers::documents::registry_stats,
    ),
    components(
        schemas(
            models::CreateAnalysisRequest,
            models::RegistryStats,
            models::DocumentMetadata,
            models::DocumentSummary,
            handlers::documents::SearchAndStoreRequest,
        )
    ),
    tags(
        (name = "Analysis", description = "Iterative analysis jobs"),
        (name = "Documents", description = "Document ingestion and registry"),
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cli_args = CommandLineArgs::parse();
    let config = Config::load(&cli_args)?;

    // Admin subcommands run against the shared stores and exit
    if let Some(command) = cli_args.command.clone() {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("warn"))
            .init();
        let code = admin::run(command, &config).await;
        std::process::exit(code as i32);
    }

    let log_filter = tracing_subscriber::EnvFilter::new(&config.logging.level);
    let registry_builder = tracing_subscriber::registry().with(log_filter);

    // Keep the appender guard alive for the process lifetime
    let mut _appender_guard = None;

    if let Some(log_file) = &config.logging.file {
        let log_path = std::path::Path::new(log_file);
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let log_dir = log_path.parent().and_then(|p| p.to_str()).unwrap_or("logs");
        let file_name = log_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("finsight.log");
        let file_prefix = file_name.strip_suffix(".log").unwrap_or(file_name);

        let file_appender = tracing_appender::rolling::daily(log_dir, file_prefix);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        _appender_guard = Some(guard);

        registry_builder
            .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
            .with(tracing_subscriber::fmt::layer())
            .init();
    } else {
        registry_builder.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Finsight starting up");
    tracing::info!("Configuration loaded successfully");

    let pool = db::create_pool(&config.database.url).await?;
    tracing::info!("Database pool created successfully");

    // Make sure the RAG state directories exist before anything touches them
    std::fs::create_dir_all(&config.rag.data_root)?;
    std::fs::create_dir_all(&config.rag.system_root)?;

    let llm: Arc<dyn ChatCompletion> = Arc::new(ChatLlmClient::new(&config.llm));
    let registry = Arc::new(DocumentRegistry::load(Some(std::path::Path::new(
        &config.rag.data_root,
    ))));
    let gateway = Arc::new(RagGateway::new(
        Arc::new(HttpRagStore::new(&config.rag)),
        config.rag.clone(),
    ));
    let edgar = Arc::new(EdgarService::new(&config.edgar));
    let summarizer = Arc::new(SummaryGenerator::new(Arc::clone(&llm)));
    let grader = Arc::new(ResponseGrader::new(Arc::new(GeminiSearchClient::new(
        &config.search,
    ))));

    let ingest_service = Arc::new(IngestService::new(
        Arc::clone(&registry),
        Arc::clone(&gateway),
        Arc::clone(&summarizer),
    ));

    let controller = Arc::new(AnalysisController::new(
        Arc::clone(&llm),
        Arc::clone(&registry),
        Arc::clone(&gateway),
        Arc::clone(&grader),
    ));

    let job_repository = Arc::new(JobRepository::new(pool.clone()));
    let job_service = Arc::new(AnalysisJobService::new(
        Arc::clone(&job_repository),
        Arc::clone(&controller),
    ));

    tracing::info!("Analysis services initialized");

    let app_state = Arc::new(AppState {
        db: pool.clone(),
        llm,
        registry,
        gateway,
        edgar,
        ingest_service,
        job_service,
        job_repository,
    });

    let api_routes = Router::new()
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
        .route("/api/documents", get(handlers::documents::list_documents))
        .route("/api/documents/search_and_store", post(handlers::documents::search_and_store))
        .route(
            "/api/documents/query_company",
            post(handlers::documents::query_company_documents),
        )
        .route("/api/documents/stats", get(handlers::documents::registry_stats))
        .route("/api/documents/summaries", get(handlers::documents::list_summaries))
        .route(
            "/api/documents/:accession/summary",
            get(handlers::documents::get_document_summary),
        )
        .route("/api/rag/prune", post(handlers::documents::rag_prune))
        .route("/api/rag/reset", post(handlers::documents::rag_reset))
        .route("/api/rag/status", get(handlers::documents::rag_status))
        .with_state(Arc::clone(&app_state));

    let health_routes = Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check));

    let app = Router::new()
        .merge(SwaggerUi::new("/api-docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_routes)
        .merge(health_routes)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("API documentation available at http://{}/api-docs", addr);
    tracing::info!("Finsight is ready to serve requests");

    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

async fn ready_check() -> &'static str {
    "READY"
}
