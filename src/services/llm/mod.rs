//! LLM Service Module
//!
//! Chat-completion access for the analysis engine. The `ChatCompletion`
//! trait is the seam every LLM-consuming service depends on (controller,
//! summarizer); production wires in the OpenAI-compatible HTTP client,
//! tests wire in scripted stubs.

mod client;

pub use client::ChatLlmClient;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

// ============================================================================
// Errors
// ============================================================================

/// LLM service errors
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM API key not configured")]
    MissingCredentials,

    #[error("LLM API error: {0}")]
    ApiError(String),

    #[error("LLM response parsing error: {0}")]
    ParseError(String),

    #[error("LLM timeout after {0}s")]
    Timeout(u64),

    #[error("LLM rate limited, retry after {0}s")]
    RateLimited(u64),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

// ============================================================================
// Chat Completion Trait
// ============================================================================

/// Chat-completion endpoint abstraction
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Whether credentials are configured and calls can be attempted
    fn is_available(&self) -> bool;

    /// Send one system+user exchange, returning the raw assistant text
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError>;
}

// ============================================================================
// Response payload helpers
// ============================================================================

/// Strip surrounding markdown code fences from an LLM response.
///
/// Models frequently wrap JSON in ```json ... ``` even when asked not to.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();

    let body = if let Some(rest) = trimmed.strip_prefix("```json") {
        rest
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        rest
    } else {
        return trimmed;
    };

    let body = body.strip_prefix('\n').unwrap_or(body);
    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

/// Parse an LLM response as JSON after fence stripping
pub fn parse_json_payload<T: DeserializeOwned>(text: &str) -> Result<T, LlmError> {
    let cleaned = strip_code_fences(text);
    serde_json::from_str(cleaned).map_err(|e| {
        LlmError::ParseError(format!("Failed to parse LLM response: {}. Content: {}", e, cleaned))
    })
}
