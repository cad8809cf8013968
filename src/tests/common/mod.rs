// Common test utilities: in-memory stores and scripted LLM stubs

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::RagConfig;
use crate::models::{DocumentMetadata, DocumentSummary};
use crate::services::analysis::controller::{CancelSignal, ProgressSink, ProgressUpdate};
use crate::services::grader::GroundedSearch;
use crate::services::llm::{ChatCompletion, LlmError};
use crate::services::rag::{RagError, RagGateway, RagResult, RagStore, SearchMode};
use crate::services::registry::DocumentRegistry;

/// Create an in-memory SQLite database with the analyses schema
pub async fn create_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(3))
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create test database");

    crate::db::apply_schema(&pool)
        .await
        .expect("Failed to apply schema");

    pool
}

// ============================================================================
// Scripted chat LLM
// ============================================================================

struct ChatScript {
    queue: VecDeque<String>,
    cycle: Vec<String>,
    cycle_index: usize,
}

/// Chat stub that serves a fixed response sequence, optionally followed by
/// a repeating cycle. Can flip a cancel flag after the Nth call to exercise
/// mid-loop cancellation deterministically.
pub struct ScriptedChat {
    script: Mutex<ChatScript>,
    calls: AtomicUsize,
    cancel_after: Option<(usize, Arc<AtomicBool>)>,
}

impl ScriptedChat {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            script: Mutex::new(ChatScript {
                queue: responses.into(),
                cycle: Vec::new(),
                cycle_index: 0,
            }),
            calls: AtomicUsize::new(0),
            cancel_after: None,
        }
    }

    /// Fixed prefix, then repeat `cycle` forever
    pub fn cycling(prefix: Vec<String>, cycle: Vec<String>) -> Self {
        Self {
            script: Mutex::new(ChatScript { queue: prefix.into(), cycle, cycle_index: 0 }),
            calls: AtomicUsize::new(0),
            cancel_after: None,
        }
    }

    /// Set `flag` after `n` completed calls
    pub fn with_cancel_after(mut self, n: usize, flag: Arc<AtomicBool>) -> Self {
        self.cancel_after = Some((n, flag));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatCompletion for ScriptedChat {
    fn is_available(&self) -> bool {
        true
    }

    async fn complete(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String, LlmError> {
        let response = {
            let mut script = self.script.lock().unwrap();
            if let Some(next) = script.queue.pop_front() {
                Ok(next)
            } else if !script.cycle.is_empty() {
                let next = script.cycle[script.cycle_index % script.cycle.len()].clone();
                script.cycle_index += 1;
                Ok(next)
            } else {
                Err(LlmError::ApiError("scripted responses exhausted".to_string()))
            }
        };

        let completed = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((n, flag)) = &self.cancel_after
            && completed >= *n
        {
            flag.store(true, Ordering::SeqCst);
        }

        response
    }
}

/// Chat stub with no credentials
pub struct UnavailableChat;

#[async_trait]
impl ChatCompletion for UnavailableChat {
    fn is_available(&self) -> bool {
        false
    }

    async fn complete(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String, LlmError> {
        Err(LlmError::MissingCredentials)
    }
}

// ============================================================================
// RAG store stub
// ============================================================================

/// Engine stub answering every search with fixed strings
pub struct StubRagStore {
    pub answers: Vec<String>,
}

impl StubRagStore {
    pub fn new(answers: Vec<String>) -> Self {
        Self { answers }
    }
}

#[async_trait]
impl RagStore for StubRagStore {
    async fn add(&self, _text: &str) -> Result<(), RagError> {
        Ok(())
    }

    async fn cognify(&self) -> Result<(), RagError> {
        Ok(())
    }

    async fn search(&self, _query: &str, _mode: SearchMode) -> Result<Vec<RagResult>, RagError> {
        Ok(self.answers.iter().cloned().map(RagResult::Text).collect())
    }

    async fn prune(&self) -> Result<(), RagError> {
        Ok(())
    }
}

pub fn test_gateway(answers: Vec<String>) -> RagGateway {
    let config = RagConfig {
        data_root: "target/test-rag-data".to_string(),
        system_root: "target/test-rag-system".to_string(),
        ..RagConfig::default()
    };
    RagGateway::new(Arc::new(StubRagStore::new(answers)), config)
}

// ============================================================================
// Grounded-search stubs
// ============================================================================

/// Grader backend with no credentials: every verdict defaults to pass
pub struct UnconfiguredGrounded;

#[async_trait]
impl GroundedSearch for UnconfiguredGrounded {
    fn is_configured(&self) -> bool {
        false
    }

    async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
        Err(LlmError::MissingCredentials)
    }

    async fn grounded_generate(&self, _prompt: &str) -> Result<String, LlmError> {
        Err(LlmError::MissingCredentials)
    }
}

/// Grader backend serving a fixed verdict and a fixed web answer
pub struct ScriptedGrounded {
    pub verdict_json: String,
    pub web_response: Result<String, String>,
}

#[async_trait]
impl GroundedSearch for ScriptedGrounded {
    fn is_configured(&self) -> bool {
        true
    }

    async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
        Ok(self.verdict_json.clone())
    }

    async fn grounded_generate(&self, _prompt: &str) -> Result<String, LlmError> {
        self.web_response
            .clone()
            .map_err(LlmError::ApiError)
    }
}

// ============================================================================
// Controller capabilities
// ============================================================================

/// Cancel signal over a shared flag
pub struct FlagCancel(pub Arc<AtomicBool>);

#[async_trait]
impl CancelSignal for FlagCancel {
    async fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress sink capturing every update in order
#[derive(Default)]
pub struct MemorySink {
    pub updates: Mutex<Vec<ProgressUpdate>>,
}

#[async_trait]
impl ProgressSink for MemorySink {
    async fn update(&self, update: ProgressUpdate) {
        self.updates.lock().unwrap().push(update);
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn apple_metadata() -> DocumentMetadata {
    DocumentMetadata {
        accession_number: "0000320193-24-000123".to_string(),
        form_type: "10-K".to_string(),
        company_name: "Apple Inc.".to_string(),
        ticker: Some("AAPL".to_string()),
        cik: "0000320193".to_string(),
        filing_date: "2024-11-01".to_string(),
        period_of_report: Some("2024-09-28".to_string()),
        source_url: None,
    }
}

pub fn apple_summary() -> DocumentSummary {
    DocumentSummary {
        executive_summary: "Apple's annual report covering fiscal 2024".to_string(),
        financial_highlights: "Revenue $391B, services revenue at record levels".to_string(),
        investment_insights: "Services growth and installed-base expansion".to_string(),
        risk_factors: "Supply chain concentration, regulatory pressure".to_string(),
    }
}

/// Registry pre-seeded with one Apple 10-K summary
pub async fn seeded_registry() -> Arc<DocumentRegistry> {
    let registry = Arc::new(DocumentRegistry::in_memory());
    registry
        .insert_if_new(
            "Apple Inc. annual report full text. Revenue grew on services strength.",
            apple_metadata(),
            Some(apple_summary()),
        )
        .await;
    registry
}

// ============================================================================
// Canned LLM payloads
// ============================================================================

pub fn initial_analysis_json() -> String {
    serde_json::json!({
        "executive_summary": "Apple presents a solid investment case.",
        "financial_analysis": "Revenue and margins are healthy.",
        "investment_opportunities": "Services and wearables growth.",
        "risk_assessment": "Regulatory and supply chain risks.",
        "market_position": "Dominant premium hardware position.",
        "valuation_insights": "Trades at a premium multiple.",
        "recommendation": "Buy",
        "confidence_level": "Medium",
        "data_gaps": ["Segment-level margin detail"],
    })
    .to_string()
}

pub fn evaluation_json(score: f64, complete: bool) -> String {
    serde_json::json!({
        "overall_assessment": "Fair",
        "completeness_score": score,
        "specific_questions": ["What is the services margin trend?"],
        "missing_areas": ["Capital allocation"],
        "data_needs": ["Segment margins"],
        "methodology_concerns": [],
        "actionability": "Medium",
        "next_steps": ["Query segment data"],
        "is_analysis_complete": complete,
    })
    .to_string()
}

pub fn queries_json(count: usize) -> String {
    let queries: Vec<String> = (1..=count)
        .map(|i| format!("Targeted query {} about Apple financials", i))
        .collect();
    serde_json::to_string(&queries).unwrap()
}

pub fn refined_analysis_json() -> String {
    serde_json::json!({
        "executive_summary": "Apple remains attractive after deeper review.",
        "financial_analysis": "Services margins confirmed expanding.",
        "investment_opportunities": "Services and wearables growth.",
        "risk_assessment": "Regulatory risk remains the key watch item.",
        "market_position": "Dominant premium hardware position.",
        "valuation_insights": "Premium justified by services mix.",
        "recommendation": {"decision": "Buy", "rationale": "durable services growth"},
        "confidence_level": "High",
        "data_gaps": [],
    })
    .to_string()
}
