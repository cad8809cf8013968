//! Ingestion Pipeline
//!
//! Takes (content, metadata) into the system: duplicate check against the
//! registry, then RAG indexing and summary generation run concurrently -
//! indexing is the heavy side and the summary call is LLM-latency bound, so
//! the smaller latency hides behind the larger. The summary is agent
//! metadata only and is never written into the RAG engine.

use std::sync::Arc;

use super::rag::RagGateway;
use super::registry::{DocumentRegistry, ExistingDocumentInfo, InsertOutcome};
use super::summary::SummaryGenerator;
use crate::models::DocumentMetadata;

pub struct IngestService {
    registry: Arc<DocumentRegistry>,
    gateway: Arc<RagGateway>,
    summarizer: Arc<SummaryGenerator>,
}

#[derive(Debug)]
pub enum IngestOutcome {
    /// Document registered. `rag_stored` is false when the engine rejected
    /// the add - the registry entry (with summary) still exists so the
    /// document can be re-indexed later without re-summarizing.
    Stored { fingerprint: String, rag_stored: bool, content_length: usize },
    Duplicate { reason: String, existing: ExistingDocumentInfo },
}

impl IngestService {
    pub fn new(
        registry: Arc<DocumentRegistry>,
        gateway: Arc<RagGateway>,
        summarizer: Arc<SummaryGenerator>,
    ) -> Self {
        Self { registry, gateway, summarizer }
    }

    pub async fn ingest(&self, content: String, metadata: DocumentMetadata) -> IngestOutcome {
        // Early probe so duplicates skip the expensive parallel work. The
        // authoritative check happens again inside insert_if_new under the
        // registry's write lock.
        if let Some((reason, existing)) = self.registry.probe_duplicate(&content, &metadata).await {
            tracing::info!(
                "Rejecting duplicate ingest: {} {} ({})",
                metadata.company_name,
                metadata.form_type,
                reason
            );
            return IngestOutcome::Duplicate { reason, existing };
        }

        let rag_text = build_rag_text(&content, &metadata);

        // Index and summarize concurrently. The summary must not enter the
        // RAG store - rag_text carries raw content plus basic metadata only.
        let (rag_stored, summary) = tokio::join!(
            self.store_in_rag(&rag_text),
            self.summarizer.summarize(&content, &metadata),
        );

        match self
            .registry
            .insert_if_new(&content, metadata.clone(), Some(summary))
            .await
        {
            InsertOutcome::Inserted { fingerprint } => {
                tracing::info!(
                    "Ingested document {} - RAG storage and summary generation completed in parallel",
                    metadata.accession_number
                );
                IngestOutcome::Stored { fingerprint, rag_stored, content_length: content.len() }
            },
            InsertOutcome::Duplicate { reason, existing } => {
                // A racing ingestion won the insert
                IngestOutcome::Duplicate { reason, existing }
            },
        }
    }

    /// Add the document to the engine and cognify on success
    async fn store_in_rag(&self, rag_text: &str) -> bool {
        if let Err(e) = self.gateway.add(rag_text).await {
            tracing::error!("Failed to store document in RAG: {}", e);
            return false;
        }

        if let Err(e) = self.gateway.cognify().await {
            tracing::error!("RAG cognify failed after add: {}", e);
            return false;
        }

        true
    }
}

/// The engine-side representation: a metadata header plus the raw content
fn build_rag_text(content: &str, metadata: &DocumentMetadata) -> String {
    format!(
        "Document Metadata:\n\
         - Company: {}\n\
         - Form Type: {}\n\
         - Filing Date: {}\n\
         - Ticker: {}\n\
         - Accession Number: {}\n\
         \n\
         Document Content:\n\
         {}",
        metadata.company_name,
        metadata.form_type,
        metadata.filing_date,
        metadata.ticker.as_deref().unwrap_or("Unknown"),
        metadata.accession_number,
        content,
    )
}
