//! RAG Gateway - caching facade over the opaque engine
//!
//! Adds result memoization, a stable result-to-string projection, and the
//! destructive maintenance operations (prune / full reset). Engine failures
//! surface as empty result sets; higher layers treat "no results" as
//! "no data" rather than failing the phase.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use super::{RagError, RagResult, RagStore, SearchMode};
use crate::config::RagConfig;

/// Opaque results longer than this are truncated in the projection
const OPAQUE_RESULT_MAX_CHARS: usize = 500;

pub struct RagGateway {
    store: Arc<dyn RagStore>,
    cache: DashMap<(String, SearchMode), Vec<String>>,
    config: RagConfig,
}

impl RagGateway {
    pub fn new(store: Arc<dyn RagStore>, config: RagConfig) -> Self {
        Self { store, cache: DashMap::new(), config }
    }

    /// Queue text for indexing
    pub async fn add(&self, text: &str) -> Result<(), RagError> {
        self.store.add(text).await
    }

    /// Build derived structures after a batch of adds
    pub async fn cognify(&self) -> Result<(), RagError> {
        self.store.cognify().await
    }

    /// Search with memoization on (normalized query, mode).
    ///
    /// Engine errors are logged and produce an empty result set; only
    /// successful searches are cached.
    pub async fn search(&self, query: &str, mode: SearchMode) -> Vec<String> {
        let cache_key = (normalize_query(query), mode);

        if let Some(cached) = self.cache.get(&cache_key) {
            tracing::info!("Returning cached results for query: {}", preview(query));
            return cached.clone();
        }

        match self.store.search(query, mode).await {
            Ok(results) => {
                let projected: Vec<String> =
                    results.iter().map(Self::project_result).collect();
                self.cache.insert(cache_key, projected.clone());
                projected
            },
            Err(e) => {
                tracing::error!("RAG search failed for query '{}': {}", preview(query), e);
                Vec::new()
            },
        }
    }

    /// Company-biased search.
    ///
    /// This is query-string concatenation only - the gateway keeps no
    /// per-company indexes, and callers must not assume stronger filtering
    /// than the engine applies to a company-biased prompt.
    pub async fn search_by_company(
        &self,
        query: &str,
        company_name: &str,
        mode: SearchMode,
    ) -> Vec<String> {
        let enhanced_query = format!("{} {}", query, company_name);
        self.search(&enhanced_query, mode).await
    }

    /// Project one engine result to a string
    pub fn project_result(result: &RagResult) -> String {
        match result {
            RagResult::Text(text) => text.clone(),
            RagResult::Keyed { text } => text.clone(),
            RagResult::Opaque(value) => {
                let rendered = value.to_string();
                if rendered.len() > OPAQUE_RESULT_MAX_CHARS {
                    let cut = rendered
                        .char_indices()
                        .map(|(i, _)| i)
                        .take_while(|&i| i <= OPAQUE_RESULT_MAX_CHARS)
                        .last()
                        .unwrap_or(0);
                    format!("{}...", &rendered[..cut])
                } else {
                    rendered
                }
            },
        }
    }

    /// Delete all engine-held data and clear the cache
    pub async fn prune(&self) -> Result<(), RagError> {
        self.store.prune().await?;
        self.cache.clear();
        tracing::info!("Pruned RAG engine data and cleared search cache");
        Ok(())
    }

    /// Destructive maintenance: remove the engine's state directories,
    /// recreate them empty, and clear the cache. The caller is responsible
    /// for clearing the document registry alongside this.
    pub async fn reset_all(&self) -> Result<(), RagError> {
        // Best effort: ask the engine to drop its data first
        if let Err(e) = self.store.prune().await {
            tracing::warn!("Engine prune during reset failed (continuing): {}", e);
        }

        for root in [&self.config.data_root, &self.config.system_root] {
            let path = std::path::Path::new(root);
            if path.exists() {
                std::fs::remove_dir_all(path)
                    .map_err(|e| RagError::ResetFailed(format!("removing {}: {}", root, e)))?;
            }
            std::fs::create_dir_all(path)
                .map_err(|e| RagError::ResetFailed(format!("recreating {}: {}", root, e)))?;
            tracing::info!("Recreated RAG state directory: {}", root);
        }

        self.cache.clear();
        tracing::info!("RAG reset complete - state directories recreated, cache cleared");
        Ok(())
    }

    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }

    /// Configuration snapshot for the status endpoint
    pub fn service_info(&self) -> RagServiceInfo {
        RagServiceInfo {
            endpoint: self.config.endpoint.clone(),
            data_root: self.config.data_root.clone(),
            system_root: self.config.system_root.clone(),
            graph_provider: self.config.graph_provider.clone(),
            vector_provider: self.config.vector_provider.clone(),
            db_provider: self.config.db_provider.clone(),
            cache_size: self.cache.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RagServiceInfo {
    pub endpoint: String,
    pub data_root: String,
    pub system_root: String,
    pub graph_provider: String,
    pub vector_provider: String,
    pub db_provider: String,
    pub cache_size: usize,
}

fn normalize_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

fn preview(query: &str) -> &str {
    let end = query
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i <= 50)
        .last()
        .unwrap_or(0);
    &query[..end]
}
