//! Response Grader / Web Augmenter
//!
//! Two-stage pipeline over every RAG answer the controller retrieves:
//!
//! 1. Grade the answer against a strict financial-information rubric.
//! 2. If it fails, run a grounded (web-search-enabled) completion and score
//!    the augmentation's source quality before trusting it.
//!
//! Grader outages never stall the analysis: infrastructure failures default
//! to passing the RAG answer through, and any error in the augmentation
//! path falls back to the original RAG strings.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use utoipa::ToSchema;

use super::llm::{parse_json_payload, LlmError};
use crate::config::SearchConfig;

/// Combined RAG answers longer than this are truncated before being
/// embedded in the grading rubric. Summarization never truncates; grading
/// tolerates it because the verdict only needs the answer's shape.
const GRADING_MAX_CHARS: usize = 15_000;

const QUALITY_WARNING: &str = "\n\n[Note: This information from web search may not meet all \
financial data quality standards. Please verify with authoritative sources.]";

const SOURCE_INDICATORS: [&str; 13] = [
    "reuters",
    "bloomberg",
    "wall street journal",
    "financial times",
    "sec filing",
    "10-k",
    "10-q",
    "federal reserve",
    "treasury",
    "yahoo finance",
    "marketwatch",
    "source:",
    "according to",
];

const SPECIFIC_DATA_INDICATORS: [&str; 12] = [
    "$", "%", "billion", "million", "quarter", "Q1", "Q2", "Q3", "Q4", "2024", "2025",
    "fiscal year",
];

const TIMEFRAME_INDICATORS: [&str; 18] = [
    "as of", "current", "latest", "recent", "today", "this year", "january", "february",
    "march", "april", "may", "june", "july", "august", "september", "october", "november",
    "december",
];

const DISCLAIMER_PHRASES: [&str; 3] =
    ["cannot provide", "unable to access", "no information available"];

// ============================================================================
// Grounded search client
// ============================================================================

/// Grounded-search LLM abstraction: plain generation for the grading
/// rubric, grounded generation (web-search tool attached) for augmentation.
#[async_trait]
pub trait GroundedSearch: Send + Sync {
    fn is_configured(&self) -> bool;

    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;

    async fn grounded_generate(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Gemini generateContent client (REST), with the google_search tool for
/// grounded calls
pub struct GeminiSearchClient {
    http_client: Client,
    api_key: Option<String>,
    model: String,
    timeout_seconds: u64,
}

impl GeminiSearchClient {
    pub fn new(config: &SearchConfig) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http_client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            timeout_seconds: config.timeout_seconds,
        }
    }

    async fn generate_content(
        &self,
        prompt: &str,
        with_search_tool: bool,
    ) -> Result<String, LlmError> {
        let api_key = self.api_key.as_ref().ok_or(LlmError::MissingCredentials)?;

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.model
        );

        let mut body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
        });
        if with_search_tool {
            body["tools"] = json!([{ "google_search": {} }]);
        }

        let response = self
            .http_client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.timeout_seconds)
                } else {
                    LlmError::ApiError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LlmError::ApiError(format!("API error {}: {}", status, error_text)));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(e.to_string()))?;

        let text = parsed
            .candidates
            .into_iter()
            .next()
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(LlmError::ParseError("Empty response from grounded LLM".to_string()));
        }

        Ok(text.trim().to_string())
    }
}

#[async_trait]
impl GroundedSearch for GeminiSearchClient {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        self.generate_content(prompt, false).await
    }

    async fn grounded_generate(&self, prompt: &str) -> Result<String, LlmError> {
        self.generate_content(prompt, true).await
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

// ============================================================================
// Verdicts and assessments
// ============================================================================

/// Stage-1 grading verdict
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ValidationVerdict {
    /// Whether a real grading call happened (false on outage/unconfigured)
    pub validation_available: bool,
    pub validation_passed: bool,
    pub reasoning: String,
    pub confidence_score: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_aspects: Vec<String>,
    #[serde(default)]
    pub requires_current_data: bool,
}

impl ValidationVerdict {
    fn default_pass(reasoning: impl Into<String>) -> Self {
        Self {
            validation_available: false,
            validation_passed: true,
            reasoning: reasoning.into(),
            confidence_score: 0.5,
            missing_aspects: Vec::new(),
            requires_current_data: false,
        }
    }
}

/// Raw rubric payload from the grader LLM
#[derive(Debug, Deserialize)]
struct VerdictPayload {
    validation_passed: bool,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    confidence_score: f64,
    #[serde(default)]
    missing_aspects: Vec<String>,
    #[serde(default)]
    requires_current_data: bool,
}

/// Heuristic source-quality score of a grounded search response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QualityAssessment {
    pub has_sources: bool,
    pub has_specific_data: bool,
    pub has_timeframe: bool,
    pub appropriate_length: bool,
    pub not_disclaimer_only: bool,
    pub quality_score: f64,
    pub meets_financial_standards: bool,
}

/// Stage-2 augmentation result
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebAugmentation {
    pub response: String,
    pub quality: QualityAssessment,
    pub retrieved_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AnswerSource {
    Rag,
    Web,
}

/// Final graded answer with full provenance
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GradedAnswer {
    pub final_answers: Vec<String>,
    pub source: AnswerSource,
    pub validation: ValidationVerdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub augmentation: Option<WebAugmentation>,
}

// ============================================================================
// Grader
// ============================================================================

pub struct ResponseGrader {
    search: Arc<dyn GroundedSearch>,
}

impl ResponseGrader {
    pub fn new(search: Arc<dyn GroundedSearch>) -> Self {
        Self { search }
    }

    /// Full pipeline: grade, maybe augment, choose the final answer
    pub async fn answer(&self, query: &str, rag_answers: Vec<String>) -> GradedAnswer {
        let validation = self.validate(query, &rag_answers).await;

        if validation.validation_passed {
            return GradedAnswer {
                final_answers: rag_answers,
                source: AnswerSource::Rag,
                validation,
                augmentation: None,
            };
        }

        tracing::info!("RAG validation failed for query '{}' - searching the web", truncate_log(query));

        let Some(augmentation) = self.web_search(query).await else {
            // Augmentation path failed entirely - fall back to RAG
            return GradedAnswer {
                final_answers: rag_answers,
                source: AnswerSource::Rag,
                validation,
                augmentation: None,
            };
        };

        let final_answers = if augmentation.quality.meets_financial_standards {
            vec![augmentation.response.clone()]
        } else {
            vec![format!("{}{}", augmentation.response, QUALITY_WARNING)]
        };

        GradedAnswer {
            final_answers,
            source: AnswerSource::Web,
            validation,
            augmentation: Some(augmentation),
        }
    }

    /// Stage 1: grade the RAG answer against the financial rubric
    pub async fn validate(&self, query: &str, rag_answers: &[String]) -> ValidationVerdict {
        if !self.search.is_configured() {
            return ValidationVerdict::default_pass("Grader not available");
        }

        let combined = if rag_answers.is_empty() {
            "No response available".to_string()
        } else {
            rag_answers.join("\n")
        };
        let combined = truncate_chars(&combined, GRADING_MAX_CHARS);

        let prompt = build_validation_prompt(query, &combined);

        let response = match self.search.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("Grading call failed: {} - defaulting to pass", e);
                return ValidationVerdict::default_pass(format!("Validation error: {}", e));
            },
        };

        match parse_json_payload::<VerdictPayload>(&response) {
            Ok(payload) => {
                tracing::info!(
                    "Validation result for query '{}': {}",
                    truncate_log(query),
                    payload.validation_passed
                );
                ValidationVerdict {
                    validation_available: true,
                    validation_passed: payload.validation_passed,
                    reasoning: payload.reasoning,
                    confidence_score: payload.confidence_score,
                    missing_aspects: payload.missing_aspects,
                    requires_current_data: payload.requires_current_data,
                }
            },
            Err(_) => {
                tracing::error!("Failed to parse grading verdict as JSON");
                ValidationVerdict {
                    validation_available: true,
                    validation_passed: false,
                    reasoning: "Failed to parse validation response".to_string(),
                    confidence_score: 0.0,
                    missing_aspects: Vec::new(),
                    requires_current_data: false,
                }
            },
        }
    }

    /// Stage 2: grounded completion plus quality heuristic. Any error in
    /// this path returns None; the caller falls back to the RAG strings.
    pub async fn web_search(&self, query: &str) -> Option<WebAugmentation> {
        if !self.search.is_configured() {
            return None;
        }

        let prompt = build_grounded_prompt(query);

        let response = match self.search.grounded_generate(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("Grounded search failed: {}", e);
                return None;
            },
        };

        let quality = Self::assess_quality(&response);
        tracing::info!(
            "Grounded search completed for query '{}' - quality {:.2}",
            truncate_log(query),
            quality.quality_score
        );

        Some(WebAugmentation { response, quality, retrieved_at: Utc::now() })
    }

    /// Source-quality heuristic over a grounded search response
    pub fn assess_quality(text: &str) -> QualityAssessment {
        let lower = text.to_lowercase();

        let has_sources = SOURCE_INDICATORS.iter().any(|token| lower.contains(token));
        // Case-sensitive on purpose: "Q1".."Q4" and bare years are only
        // meaningful in their literal form
        let has_specific_data =
            SPECIFIC_DATA_INDICATORS.iter().any(|token| text.contains(token));
        let has_timeframe = TIMEFRAME_INDICATORS.iter().any(|token| lower.contains(token));
        let appropriate_length = text.len() > 100 && text.len() < 2000;
        let not_disclaimer_only = !(text.len() < 200
            && DISCLAIMER_PHRASES.iter().any(|phrase| lower.contains(phrase)));

        let indicators = [
            has_sources,
            has_specific_data,
            has_timeframe,
            appropriate_length,
            not_disclaimer_only,
        ];
        let quality_score =
            indicators.iter().filter(|&&b| b).count() as f64 / indicators.len() as f64;

        let meets_financial_standards =
            has_specific_data && appropriate_length && not_disclaimer_only && quality_score >= 0.6;

        QualityAssessment {
            has_sources,
            has_specific_data,
            has_timeframe,
            appropriate_length,
            not_disclaimer_only,
            quality_score,
            meets_financial_standards,
        }
    }
}

// ============================================================================
// Prompts
// ============================================================================

fn build_validation_prompt(query: &str, combined_response: &str) -> String {
    format!(
        r#"You are an expert financial information evaluator. Please assess whether the provided response adequately answers the user's financial question with appropriate accuracy and completeness.

User Question: {query}

Response to Evaluate: {combined_response}

FINANCIAL INFORMATION EVALUATION CRITERIA:
1. Does the response directly address the specific financial question asked?
2. Is the information relevant, specific, and actionable for financial decision-making?
3. Are there significant gaps or missing critical financial information?
4. Is the response substantive enough to be helpful for investment/financial analysis?
5. For financial data: Are specific numbers, dates, and sources provided when needed?
6. For market information: Is the timeframe and context clearly specified?
7. For company information: Are the metrics relevant to the financial question?

SPECIAL REQUIREMENTS FOR FINANCIAL QUERIES:
- Current market data (stock prices, rates) requires real-time or very recent information
- Financial metrics should include context (time period, comparison benchmarks)
- Regulatory or policy questions need authoritative sources
- Investment advice should be clearly distinguished from factual data

Respond with a JSON object containing:
- "validation_passed": true/false
- "reasoning": detailed explanation focusing on financial information quality
- "confidence_score": 0.0-1.0 indicating confidence in the response quality for financial use
- "missing_aspects": list of key financial aspects not addressed (if any)
- "requires_current_data": true/false if the question needs real-time financial information

Be VERY strict in your evaluation - only pass responses that provide genuinely useful financial information that could support investment or business decisions.
"#
    )
}

fn build_grounded_prompt(query: &str) -> String {
    format!(
        r#"Please provide a comprehensive answer to this financial/investment question using current information from TRUSTED and AUTHORITATIVE sources only:

{query}

CRITICAL REQUIREMENTS for financial information:
- ONLY use information from trusted financial sources such as:
  * Official company filings (SEC, 10-K, 10-Q, 8-K reports)
  * Reputable financial news outlets (Reuters, Bloomberg, Wall Street Journal, Financial Times)
  * Government financial agencies (Federal Reserve, Treasury, SEC, BLS)
  * Established financial data providers (Yahoo Finance, Google Finance, MarketWatch)
  * Major investment banks and research firms (Goldman Sachs, Morgan Stanley, etc.)
  * Credit rating agencies (Moody's, S&P, Fitch)

- AVOID unverified sources, social media, blogs, or unofficial websites
- When providing specific numbers (stock prices, financial metrics), cite the exact source and timestamp
- If conflicting information exists, mention the discrepancy and source reliability
- Clearly distinguish between factual data and analyst opinions/projections

Focus on:
- Recent financial data and trends from official sources
- Market analysis from reputable financial institutions
- Regulatory or industry developments from government agencies
- Quantitative metrics with proper source attribution

Always include source citations and timestamps when available. If reliable sources cannot be found for specific claims, explicitly state this limitation.
"#
    )
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.len() <= max_chars {
        return text.to_string();
    }
    let cut = text
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i <= max_chars)
        .last()
        .unwrap_or(0);
    format!("{}\n\n[Response truncated for validation...]", &text[..cut])
}

fn truncate_log(query: &str) -> &str {
    let end = query
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i <= 50)
        .last()
        .unwrap_or(0);
    &query[..end]
}
