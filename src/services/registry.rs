//! Document Registry
//!
//! Content-addressed store of ingested documents and their agent summaries.
//! The registry is the agent-metadata side of ingestion: summaries live here
//! and are never written into the RAG engine. Persists as a JSON file under
//! the RAG data root, written with atomic replace, and must round-trip every
//! field including the full document text (grading reads it back).
//!
//! Concurrency: one coarse `RwLock` guards the map. Both duplicate checks
//! run under the write lock so racing ingestions of the same document
//! deduplicate correctly.

use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use utoipa::ToSchema;

use crate::models::{
    DocumentMetadata, DocumentSummary, DocumentSummaryInfo, RegistryEntry, RegistryEntryView,
    RegistryStats,
};

const REGISTRY_FILE_NAME: &str = "document_registry.json";

/// Leading slice of content kept for similarity display
const CONTENT_PREVIEW_CHARS: usize = 2000;

// ============================================================================
// Insert outcome
// ============================================================================

/// Identifying details of an already-registered document, returned with
/// duplicate rejections
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ExistingDocumentInfo {
    pub company_name: String,
    pub form_type: String,
    pub filing_date: String,
    pub stored_at: chrono::DateTime<Utc>,
    pub fingerprint: String,
}

impl From<&RegistryEntry> for ExistingDocumentInfo {
    fn from(entry: &RegistryEntry) -> Self {
        Self {
            company_name: entry.metadata.company_name.clone(),
            form_type: entry.metadata.form_type.clone(),
            filing_date: entry.metadata.filing_date.clone(),
            stored_at: entry.stored_at,
            fingerprint: entry.fingerprint.clone(),
        }
    }
}

#[derive(Debug)]
pub enum InsertOutcome {
    Inserted { fingerprint: String },
    Duplicate { reason: String, existing: ExistingDocumentInfo },
}

// ============================================================================
// Registry
// ============================================================================

pub struct DocumentRegistry {
    entries: RwLock<HashMap<String, RegistryEntry>>,
    registry_path: Option<PathBuf>,
}

impl DocumentRegistry {
    /// Load the registry from `<data_root>/document_registry.json`. Load
    /// errors are non-fatal: the registry starts empty and logs the reason.
    pub fn load(data_root: Option<&Path>) -> Self {
        let registry_path = data_root.map(|root| root.join(REGISTRY_FILE_NAME));

        let entries = match &registry_path {
            Some(path) if path.exists() => match Self::read_file(path) {
                Ok(entries) => {
                    tracing::info!("Loaded document registry with {} entries", entries.len());
                    entries
                },
                Err(e) => {
                    tracing::error!("Failed to load document registry: {} - starting empty", e);
                    HashMap::new()
                },
            },
            Some(_) => HashMap::new(),
            None => {
                tracing::warn!("No data root configured - registry will not persist");
                HashMap::new()
            },
        };

        Self { entries: RwLock::new(entries), registry_path }
    }

    /// In-memory registry for tests
    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self { entries: RwLock::new(HashMap::new()), registry_path: None }
    }

    fn read_file(path: &Path) -> Result<HashMap<String, RegistryEntry>, anyhow::Error> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Compute the content-address of a document.
    ///
    /// SHA-256 over the canonical JSON (sorted keys) of the content hash
    /// plus the identifying metadata tuple. Deterministic: recomputing for
    /// the same (content, metadata) always yields the same value.
    pub fn fingerprint(content: &str, metadata: &DocumentMetadata) -> String {
        let content_hash = Self::content_hash(content);

        let mut fields = BTreeMap::new();
        fields.insert("accession_number", metadata.accession_number.clone());
        fields.insert("company_name", metadata.company_name.to_lowercase());
        fields.insert("content_hash", content_hash);
        fields.insert("filing_date", metadata.filing_date.clone());
        fields.insert("form_type", metadata.form_type.to_lowercase());

        // BTreeMap serializes in key order, giving a canonical encoding
        let canonical = serde_json::to_string(&fields).expect("fingerprint fields serialize");
        hex_digest(canonical.as_bytes())
    }

    pub fn content_hash(content: &str) -> String {
        hex_digest(content.as_bytes())
    }

    /// Insert a document unless the tiered duplicate policy rejects it:
    ///
    /// 1. exact fingerprint match -> "exact fingerprint"
    /// 2. same (company lowercase, form type lowercase, filing date) triple
    ///    -> "similar triple"
    ///
    /// Callers can override the policy by submitting metadata with a
    /// forced-unique accession number suffix, which changes the fingerprint.
    pub async fn insert_if_new(
        &self,
        content: &str,
        metadata: DocumentMetadata,
        summary: Option<DocumentSummary>,
    ) -> InsertOutcome {
        let fingerprint = Self::fingerprint(content, &metadata);

        let mut entries = self.entries.write().await;

        if let Some(existing) = entries.get(&fingerprint) {
            return InsertOutcome::Duplicate {
                reason: "exact fingerprint".to_string(),
                existing: existing.into(),
            };
        }

        if let Some(existing) = Self::find_similar(&entries, &metadata) {
            return InsertOutcome::Duplicate {
                reason: format!(
                    "similar triple: {} {} from {}",
                    existing.metadata.company_name,
                    existing.metadata.form_type,
                    existing.metadata.filing_date
                ),
                existing: existing.into(),
            };
        }

        let now = Utc::now();
        let entry = RegistryEntry {
            fingerprint: fingerprint.clone(),
            content_hash: Self::content_hash(content),
            content_preview: preview_of(content),
            content_length: content.len(),
            full_content: content.to_string(),
            summary_generated_at: summary.as_ref().map(|_| now),
            summary,
            metadata,
            stored_at: now,
        };

        tracing::info!(
            "Registered document: {} {} ({})",
            entry.metadata.company_name,
            entry.metadata.form_type,
            &fingerprint[..8]
        );

        entries.insert(fingerprint.clone(), entry);
        self.persist(&entries);

        InsertOutcome::Inserted { fingerprint }
    }

    /// Non-authoritative duplicate probe. Ingestion uses this to skip the
    /// expensive parallel work early; `insert_if_new` repeats the checks
    /// under the write lock before committing.
    pub async fn probe_duplicate(
        &self,
        content: &str,
        metadata: &DocumentMetadata,
    ) -> Option<(String, ExistingDocumentInfo)> {
        let fingerprint = Self::fingerprint(content, metadata);
        let entries = self.entries.read().await;

        if let Some(existing) = entries.get(&fingerprint) {
            return Some(("exact fingerprint".to_string(), existing.into()));
        }

        Self::find_similar(&entries, metadata).map(|existing| {
            (
                format!(
                    "similar triple: {} {} from {}",
                    existing.metadata.company_name,
                    existing.metadata.form_type,
                    existing.metadata.filing_date
                ),
                existing.into(),
            )
        })
    }

    fn find_similar<'a>(
        entries: &'a HashMap<String, RegistryEntry>,
        metadata: &DocumentMetadata,
    ) -> Option<&'a RegistryEntry> {
        entries.values().find(|entry| {
            entry.metadata.company_name.to_lowercase() == metadata.company_name.to_lowercase()
                && entry.metadata.form_type.to_lowercase() == metadata.form_type.to_lowercase()
                && entry.metadata.filing_date == metadata.filing_date
        })
    }

    /// Attach a summary to an existing entry. The only mutation entries
    /// support after creation.
    pub async fn attach_summary(&self, fingerprint: &str, summary: DocumentSummary) -> bool {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(fingerprint) else {
            return false;
        };

        entry.summary = Some(summary);
        entry.summary_generated_at = Some(Utc::now());
        self.persist(&entries);
        true
    }

    pub async fn lookup_by_accession(&self, accession: &str) -> Option<RegistryEntry> {
        let entries = self.entries.read().await;
        entries
            .values()
            .find(|entry| entry.metadata.accession_number == accession)
            .cloned()
    }

    /// List entries (no full content), newest filing first
    pub async fn list_all(&self, company_filter: Option<&str>) -> Vec<RegistryEntryView> {
        let entries = self.entries.read().await;
        let mut views: Vec<RegistryEntryView> = entries
            .values()
            .filter(|entry| match company_filter {
                Some(filter) => company_matches(&entry.metadata.company_name, filter),
                None => true,
            })
            .map(RegistryEntryView::from)
            .collect();

        views.sort_by(|a, b| b.metadata.filing_date.cmp(&a.metadata.filing_date));
        views
    }

    /// Agent-metadata view consumed by the analysis controller, newest
    /// filing first.
    ///
    /// Company filtering matches substrings in either direction so that
    /// "Apple" matches "Apple Inc." and vice versa. Entries without a
    /// generated summary appear with an empty one.
    pub async fn document_summaries(
        &self,
        company_filter: Option<&str>,
        form_type: Option<&str>,
    ) -> Vec<DocumentSummaryInfo> {
        let entries = self.entries.read().await;

        let mut summaries: Vec<DocumentSummaryInfo> = entries
            .values()
            .filter(|entry| {
                if let Some(filter) = company_filter
                    && !company_matches(&entry.metadata.company_name, filter)
                {
                    return false;
                }
                if let Some(form) = form_type
                    && entry.metadata.form_type.to_lowercase() != form.to_lowercase()
                {
                    return false;
                }
                true
            })
            .map(|entry| DocumentSummaryInfo {
                fingerprint: entry.fingerprint[..8].to_string(),
                company_name: entry.metadata.company_name.clone(),
                form_type: entry.metadata.form_type.clone(),
                filing_date: entry.metadata.filing_date.clone(),
                ticker: entry.metadata.ticker.clone(),
                summary: entry.summary.clone().unwrap_or_default(),
                content_length: entry.content_length,
                stored_at: entry.stored_at,
            })
            .collect();

        summaries.sort_by(|a, b| b.filing_date.cmp(&a.filing_date));
        summaries
    }

    pub async fn stats(&self) -> RegistryStats {
        let entries = self.entries.read().await;

        let mut companies: Vec<String> = Vec::new();
        let mut form_types: Vec<String> = Vec::new();
        let mut earliest: Option<String> = None;
        let mut latest: Option<String> = None;
        let mut with_summaries = 0;

        for entry in entries.values() {
            if !companies.contains(&entry.metadata.company_name) {
                companies.push(entry.metadata.company_name.clone());
            }
            if !form_types.contains(&entry.metadata.form_type) {
                form_types.push(entry.metadata.form_type.clone());
            }
            if entry.summary.is_some() {
                with_summaries += 1;
            }

            let date = &entry.metadata.filing_date;
            if earliest.as_ref().is_none_or(|e| date < e) {
                earliest = Some(date.clone());
            }
            if latest.as_ref().is_none_or(|l| date > l) {
                latest = Some(date.clone());
            }
        }

        companies.sort();
        form_types.sort();

        RegistryStats {
            total_documents: entries.len(),
            companies,
            form_types,
            earliest_filing_date: earliest,
            latest_filing_date: latest,
            documents_with_summaries: with_summaries,
        }
    }

    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Drop every entry (part of the RAG full reset)
    pub async fn clear_all(&self) {
        let mut entries = self.entries.write().await;
        entries.clear();
        self.persist(&entries);
        tracing::info!("Cleared document registry");
    }

    /// Write the registry file with atomic replace. Save errors are logged
    /// and swallowed; the in-memory entry stays live either way.
    fn persist(&self, entries: &HashMap<String, RegistryEntry>) {
        let Some(path) = &self.registry_path else {
            return;
        };

        if let Err(e) = Self::write_file(path, entries) {
            tracing::error!("Failed to save document registry: {}", e);
        } else {
            tracing::info!("Saved document registry with {} entries", entries.len());
        }
    }

    fn write_file(
        path: &Path,
        entries: &HashMap<String, RegistryEntry>,
    ) -> Result<(), anyhow::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp_path = path.with_extension("json.tmp");
        let raw = serde_json::to_vec(entries)?;
        std::fs::write(&tmp_path, raw)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

/// Substring match in either direction, case-insensitive. The asymmetric
/// containment is intentional: a stored "Apple Inc." matches the filter
/// "Apple", and a stored "Apple" matches the filter "Apple Inc.".
fn company_matches(stored: &str, filter: &str) -> bool {
    let stored = stored.to_lowercase();
    let filter = filter.to_lowercase();
    stored.contains(&filter) || filter.contains(&stored)
}

fn preview_of(content: &str) -> String {
    if content.len() <= CONTENT_PREVIEW_CHARS {
        return content.to_string();
    }
    let cut = content
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i <= CONTENT_PREVIEW_CHARS)
        .last()
        .unwrap_or(0);
    content[..cut].to_string()
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(company: &str, form: &str, date: &str, accession: &str) -> DocumentMetadata {
        DocumentMetadata {
            accession_number: accession.to_string(),
            form_type: form.to_string(),
            company_name: company.to_string(),
            ticker: Some("AAPL".to_string()),
            cik: "0000320193".to_string(),
            filing_date: date.to_string(),
            period_of_report: None,
            source_url: None,
        }
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let meta = metadata("Apple Inc.", "10-K", "2024-11-01", "0000320193-24-000123");
        let first = DocumentRegistry::fingerprint("annual report content", &meta);
        let second = DocumentRegistry::fingerprint("annual report content", &meta);
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn fingerprint_depends_on_content_and_metadata() {
        let meta = metadata("Apple Inc.", "10-K", "2024-11-01", "0000320193-24-000123");
        let base = DocumentRegistry::fingerprint("content", &meta);

        assert_ne!(base, DocumentRegistry::fingerprint("different content", &meta));

        let other_accession = metadata("Apple Inc.", "10-K", "2024-11-01", "0000320193-24-000999");
        assert_ne!(base, DocumentRegistry::fingerprint("content", &other_accession));
    }

    #[tokio::test]
    async fn second_insert_is_exact_fingerprint_duplicate() {
        let registry = DocumentRegistry::in_memory();
        let meta = metadata("Apple Inc.", "10-K", "2024-11-01", "0000320193-24-000123");

        let first = registry.insert_if_new("content", meta.clone(), None).await;
        assert!(matches!(first, InsertOutcome::Inserted { .. }));

        let second = registry.insert_if_new("content", meta, None).await;
        match second {
            InsertOutcome::Duplicate { reason, .. } => assert_eq!(reason, "exact fingerprint"),
            other => panic!("expected duplicate, got {:?}", other),
        }

        assert_eq!(registry.entry_count().await, 1);
    }

    #[tokio::test]
    async fn similar_triple_is_rejected_despite_different_content() {
        let registry = DocumentRegistry::in_memory();
        registry
            .insert_if_new(
                "original content",
                metadata("Apple Inc.", "10-K", "2024-11-01", "acc-1"),
                None,
            )
            .await;

        // Same company/form/date triple, different content and accession
        let outcome = registry
            .insert_if_new(
                "re-downloaded content",
                metadata("APPLE INC.", "10-k", "2024-11-01", "acc-2"),
                None,
            )
            .await;

        match outcome {
            InsertOutcome::Duplicate { reason, .. } => {
                assert!(reason.starts_with("similar triple"))
            },
            other => panic!("expected duplicate, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn company_filter_matches_both_directions() {
        let registry = DocumentRegistry::in_memory();
        registry
            .insert_if_new(
                "content",
                metadata("Apple Inc.", "10-K", "2024-11-01", "acc-1"),
                Some(DocumentSummary::default()),
            )
            .await;

        // Short filter matches longer stored name
        assert_eq!(registry.document_summaries(Some("Apple"), None).await.len(), 1);
        // Longer filter matches shorter stored name too
        assert_eq!(
            registry.document_summaries(Some("Apple Inc. and subsidiaries"), None).await.len(),
            1
        );
        assert_eq!(registry.document_summaries(Some("Microsoft"), None).await.len(), 0);
    }

    #[tokio::test]
    async fn summaries_sorted_newest_first() {
        let registry = DocumentRegistry::in_memory();
        registry
            .insert_if_new("a", metadata("Apple Inc.", "10-Q", "2024-05-01", "acc-1"), None)
            .await;
        registry
            .insert_if_new("b", metadata("Apple Inc.", "10-K", "2024-11-01", "acc-2"), None)
            .await;

        let summaries = registry.document_summaries(None, None).await;
        assert_eq!(summaries[0].filing_date, "2024-11-01");
        assert_eq!(summaries[1].filing_date, "2024-05-01");
    }

    #[tokio::test]
    async fn save_and_reload_round_trips_full_content() {
        let dir = tempfile::tempdir().unwrap();
        let content = "full annual report text ".repeat(200);

        {
            let registry = DocumentRegistry::load(Some(dir.path()));
            registry
                .insert_if_new(
                    &content,
                    metadata("Apple Inc.", "10-K", "2024-11-01", "acc-1"),
                    Some(DocumentSummary {
                        executive_summary: "overview".to_string(),
                        financial_highlights: "numbers".to_string(),
                        investment_insights: "insights".to_string(),
                        risk_factors: "risks".to_string(),
                    }),
                )
                .await;
        }

        let reloaded = DocumentRegistry::load(Some(dir.path()));
        let entry = reloaded.lookup_by_accession("acc-1").await.expect("entry survived reload");
        assert_eq!(entry.full_content, content);
        assert_eq!(entry.content_length, content.len());
        assert_eq!(entry.summary.as_ref().unwrap().executive_summary, "overview");
        assert_eq!(entry.content_hash, DocumentRegistry::content_hash(&content));
    }

    #[tokio::test]
    async fn corrupt_registry_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(REGISTRY_FILE_NAME), "{ not valid json").unwrap();

        let registry = DocumentRegistry::load(Some(dir.path()));
        assert_eq!(registry.entry_count().await, 0);
    }

    #[tokio::test]
    async fn stats_aggregates_companies_and_dates() {
        let registry = DocumentRegistry::in_memory();
        registry
            .insert_if_new(
                "a",
                metadata("Apple Inc.", "10-K", "2024-11-01", "acc-1"),
                Some(DocumentSummary::default()),
            )
            .await;
        registry
            .insert_if_new("b", metadata("Microsoft Corporation", "10-Q", "2024-04-25", "acc-2"), None)
            .await;

        let stats = registry.stats().await;
        assert_eq!(stats.total_documents, 2);
        assert_eq!(stats.companies.len(), 2);
        assert_eq!(stats.documents_with_summaries, 1);
        assert_eq!(stats.earliest_filing_date.as_deref(), Some("2024-04-25"));
        assert_eq!(stats.latest_filing_date.as_deref(), Some("2024-11-01"));
    }
}
