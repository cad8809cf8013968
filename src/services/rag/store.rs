//! RAG Store - transport to the opaque knowledge engine
//!
//! The engine exposes `add`, `cognify`, `search` and `prune` over HTTP.
//! Everything the engine does internally (chunking, embedding, graph
//! construction) is its own business; we never interpret its state.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{RagError, RagResult, SearchMode};
use crate::config::RagConfig;

/// Engine contract. Implemented by the HTTP client in production and by
/// in-memory stubs in tests.
#[async_trait]
pub trait RagStore: Send + Sync {
    /// Queue a text blob for indexing. Indexing is asynchronous with
    /// respect to this call; `cognify` builds derived structures afterwards.
    async fn add(&self, text: &str) -> Result<(), RagError>;

    /// Ask the engine to process everything added since the last cognify
    async fn cognify(&self) -> Result<(), RagError>;

    /// Search the engine with a query and mode
    async fn search(&self, query: &str, mode: SearchMode) -> Result<Vec<RagResult>, RagError>;

    /// Delete all engine-held data
    async fn prune(&self) -> Result<(), RagError>;
}

/// HTTP-backed engine client
pub struct HttpRagStore {
    http_client: Client,
    endpoint: String,
    timeout_seconds: u64,
}

impl HttpRagStore {
    pub fn new(config: &RagConfig) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http_client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            timeout_seconds: config.timeout_seconds,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<reqwest::Response, RagError> {
        let response = self
            .http_client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RagError::Timeout(self.timeout_seconds)
                } else {
                    RagError::EngineError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RagError::EngineError(format!("engine returned {}: {}", status, error_text)));
        }

        Ok(response)
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<RagResult>,
}

#[async_trait]
impl RagStore for HttpRagStore {
    async fn add(&self, text: &str) -> Result<(), RagError> {
        self.post("/api/add", json!({ "data": text })).await?;
        Ok(())
    }

    async fn cognify(&self) -> Result<(), RagError> {
        self.post("/api/cognify", json!({})).await?;
        Ok(())
    }

    async fn search(&self, query: &str, mode: SearchMode) -> Result<Vec<RagResult>, RagError> {
        let response = self
            .post(
                "/api/search",
                json!({
                    "query": query,
                    "query_type": mode.engine_query_type(),
                }),
            )
            .await?;

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| RagError::EngineError(format!("unreadable search response: {}", e)))?;

        Ok(parsed.results)
    }

    async fn prune(&self) -> Result<(), RagError> {
        self.post("/api/prune", json!({})).await?;
        Ok(())
    }
}
