//! Document Data Models
//!
//! Filing metadata, registry entries and structured summaries. Registry
//! entries round-trip through JSON persistence, so every field here must
//! serialize losslessly (including the full document text).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Immutable metadata attached to an ingested filing
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DocumentMetadata {
    pub accession_number: String,
    pub form_type: String,
    pub company_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticker: Option<String>,
    pub cik: String,
    /// ISO date string (YYYY-MM-DD), as reported by the filings source
    pub filing_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_of_report: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

/// Structured 4-field summary generated per document.
///
/// The shape is invariant: all four keys are always present. Missing keys
/// in the LLM response are filled with placeholders before this struct is
/// built (see `services::summary`).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, ToSchema)]
pub struct DocumentSummary {
    pub executive_summary: String,
    pub financial_highlights: String,
    pub investment_insights: String,
    pub risk_factors: String,
}

/// One document registry entry (see `services::registry`).
///
/// `full_content` is retained on purpose - grading needs the original text
/// and must not work from a lossy copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub fingerprint: String,
    pub metadata: DocumentMetadata,
    pub content_hash: String,
    pub full_content: String,
    pub content_preview: String,
    pub content_length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<DocumentSummary>,
    pub stored_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_generated_at: Option<DateTime<Utc>>,
}

/// Lightweight registry view for API listings (no full content)
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RegistryEntryView {
    pub fingerprint: String,
    pub metadata: DocumentMetadata,
    pub content_length: usize,
    pub has_summary: bool,
    pub stored_at: DateTime<Utc>,
}

impl From<&RegistryEntry> for RegistryEntryView {
    fn from(entry: &RegistryEntry) -> Self {
        Self {
            fingerprint: entry.fingerprint.clone(),
            metadata: entry.metadata.clone(),
            content_length: entry.content_length,
            has_summary: entry.summary.is_some(),
            stored_at: entry.stored_at,
        }
    }
}

/// Agent-metadata view of a document: the summary plus enough metadata for
/// the controller to format its prompt context
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DocumentSummaryInfo {
    /// Short fingerprint prefix for reference
    pub fingerprint: String,
    pub company_name: String,
    pub form_type: String,
    pub filing_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticker: Option<String>,
    pub summary: DocumentSummary,
    pub content_length: usize,
    pub stored_at: DateTime<Utc>,
}

/// Aggregate registry statistics
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RegistryStats {
    pub total_documents: usize,
    pub companies: Vec<String>,
    pub form_types: Vec<String>,
    pub earliest_filing_date: Option<String>,
    pub latest_filing_date: Option<String>,
    pub documents_with_summaries: usize,
}

// ============================================================================
// Filings source (EDGAR) types
// ============================================================================

/// One filing descriptor returned by the external source
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FilingRef {
    pub accession_number: String,
    pub form: String,
    pub company_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticker: Option<String>,
    pub cik: String,
    pub filing_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_of_report: Option<String>,
    pub description: String,
    pub url: String,
}

impl FilingRef {
    /// Convert into registry metadata
    pub fn into_metadata(self) -> DocumentMetadata {
        DocumentMetadata {
            accession_number: self.accession_number,
            form_type: self.form,
            company_name: self.company_name,
            ticker: self.ticker,
            cik: self.cik,
            filing_date: self.filing_date,
            period_of_report: self.period_of_report,
            source_url: Some(self.url),
        }
    }
}

/// Fetched filing text
#[derive(Debug, Clone)]
pub struct FilingContent {
    pub content: String,
    pub size: usize,
    pub retrieved_at: DateTime<Utc>,
}
