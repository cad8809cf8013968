//! Prompt construction for the critique-and-refine loop
//!
//! DRAFT and RETRIEVE share the same document-summary formatting so the
//! model keeps one mental model of the corpus across phases.

use crate::models::DocumentSummaryInfo;

use super::types::{AnalysisEvaluation, InvestmentAnalysis, RetrievalOutcome};

pub const ANALYST_SYSTEM_PROMPT: &str = "You are a senior financial analyst with expertise in \
investment research. Always provide detailed, evidence-based analysis in valid JSON format.";

pub const COMMITTEE_SYSTEM_PROMPT: &str = "You are an experienced investment committee chair who \
balances thoroughness with practical decision-making needs, recognizing that good investment \
decisions can be made with reasonable analysis rather than perfect completeness.";

pub const QUERY_WRITER_SYSTEM_PROMPT: &str = "You are an expert at crafting precise database \
queries to extract financial information. Generate specific, targeted queries.";

pub const REFINER_SYSTEM_PROMPT: &str = "You are a senior financial analyst integrating new \
information to enhance investment analysis. Maintain analytical rigor and update conclusions \
based on evidence.";

/// Shared document context block: one entry per document with the four
/// summary fields and the content size
pub fn format_documents(summaries: &[DocumentSummaryInfo]) -> String {
    if summaries.is_empty() {
        return "No documents available.".to_string();
    }

    summaries
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            format!(
                "\nDocument {n}: {company} - {form} ({date})\n\
                 - Executive Summary: {exec}\n\
                 - Financial Highlights: {fin}\n\
                 - Investment Insights: {insights}\n\
                 - Risk Factors: {risks}\n\
                 - Content Length: {len} characters\n",
                n = i + 1,
                company = doc.company_name,
                form = doc.form_type,
                date = doc.filing_date,
                exec = non_empty(&doc.summary.executive_summary),
                fin = non_empty(&doc.summary.financial_highlights),
                insights = non_empty(&doc.summary.investment_insights),
                risks = non_empty(&doc.summary.risk_factors),
                len = doc.content_length,
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Retrieval context block for REFINE: each query with its first three
/// answer strings
pub fn format_rag_results(outcomes: &[RetrievalOutcome]) -> String {
    if outcomes.is_empty() {
        return "No RAG results available.".to_string();
    }

    outcomes
        .iter()
        .enumerate()
        .map(|(i, outcome)| {
            let result_text = outcome
                .final_results
                .iter()
                .take(3)
                .cloned()
                .collect::<Vec<_>>()
                .join("\n");

            format!(
                "\nRAG Query {n}: \"{query}\"\nResults ({count} total):\n{results}\n",
                n = i + 1,
                query = outcome.query,
                count = outcome.final_results.len(),
                results = result_text,
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn initial_analysis_prompt(query: &str, summaries: &[DocumentSummaryInfo]) -> String {
    format!(
        r#"You are an expert financial analyst. Based on the provided document summaries, generate a comprehensive investment analysis for the following query:

INVESTMENT QUERY: "{query}"

AVAILABLE DOCUMENTS WITH SUMMARIES:
{documents}

Please provide a comprehensive analysis in JSON format with these sections:

1. "executive_summary": 2-3 sentence overview of your investment recommendation
2. "financial_analysis": Analysis of financial performance, metrics, and trends
3. "investment_opportunities": Growth opportunities and competitive advantages
4. "risk_assessment": Key risks and potential challenges
5. "market_position": Company's position in the market and competitive landscape
6. "valuation_insights": Insights on company valuation and pricing
7. "recommendation": Clear investment recommendation (Buy/Hold/Sell) with rationale
8. "confidence_level": Your confidence in this analysis (High/Medium/Low)
9. "data_gaps": Areas where you need more specific information to improve the analysis

Focus on actionable insights for investment decisions. Be specific about what documents inform each conclusion.
"#,
        query = query,
        documents = format_documents(summaries),
    )
}

pub fn evaluation_prompt(query: &str, analysis: &InvestmentAnalysis) -> String {
    let analysis_json =
        serde_json::to_string_pretty(analysis).unwrap_or_else(|_| "{}".to_string());

    format!(
        r#"You are a senior investment committee member reviewing an analyst's report. Your job is to identify gaps, weaknesses, and areas that need more detailed investigation, while recognizing that practical investment decisions often need to be made with reasonable information rather than perfect completeness.

ORIGINAL INVESTMENT QUERY: "{query}"

ANALYST'S REPORT:
{analysis_json}

Please evaluate this analysis and provide feedback in JSON format with these sections:

1. "overall_assessment": Your overall assessment of the analysis quality (Excellent/Good/Fair/Poor)
2. "completeness_score": Score from 1-10 on how complete the analysis is (consider that 7+ indicates sufficient completeness for practical decision-making)
3. "specific_questions": List of specific questions that need to be answered to improve the analysis
4. "missing_areas": Areas of analysis that are missing or insufficient
5. "data_needs": Specific data points or information needed for better analysis
6. "methodology_concerns": Any concerns about the analytical approach
7. "actionability": How actionable is the current recommendation (High/Medium/Low)
8. "next_steps": Specific next steps to improve the analysis
9. "is_analysis_complete": Boolean - true if analysis is sufficient for practical investment decision-making, false if needs more work

Be thorough but balanced in your evaluation, recognizing that investment decisions often require working with available information rather than waiting for perfect completeness.
"#
    )
}

pub fn query_generation_prompt(
    evaluation: &AnalysisEvaluation,
    summaries: &[DocumentSummaryInfo],
) -> String {
    let evaluation_json =
        serde_json::to_string_pretty(evaluation).unwrap_or_else(|_| "{}".to_string());

    format!(
        r#"Based on the analysis evaluation, generate specific RAG database queries to fill the identified gaps.

ANALYSIS EVALUATION:
{evaluation_json}

AVAILABLE DOCUMENTS:
{documents}

Generate 3-5 specific, targeted queries that would help address the gaps and questions identified in the evaluation. Each query should:
1. Be specific and actionable
2. Target information likely to be in the available documents
3. Address the most critical gaps first
4. Include company names and specific metrics when relevant

Provide the queries as a JSON array of strings, like:
["query 1", "query 2", "query 3"]

Focus on queries that will provide the most valuable additional insights for the investment decision.
"#,
        evaluation_json = evaluation_json,
        documents = format_documents(summaries),
    )
}

pub fn refinement_prompt(
    query: &str,
    original_analysis: &InvestmentAnalysis,
    outcomes: &[RetrievalOutcome],
) -> String {
    let analysis_json =
        serde_json::to_string_pretty(original_analysis).unwrap_or_else(|_| "{}".to_string());

    format!(
        r#"You are a senior financial analyst refining your investment analysis with additional detailed information from the document database.

ORIGINAL INVESTMENT QUERY: "{query}"

ORIGINAL ANALYSIS:
{analysis_json}

ADDITIONAL INFORMATION FROM RAG DATABASE:
{rag_context}

Please provide a refined and enhanced analysis in JSON format. Keep the same structure as the original analysis but:

1. Integrate the new information where relevant
2. Update conclusions based on additional data
3. Strengthen weak areas identified in the original analysis
4. Provide more specific metrics and details
5. Update confidence levels if appropriate
6. Revise recommendations if new information changes the outlook

Maintain the same JSON structure as the original analysis but enhance the content with the additional information. Mark sections that have been significantly updated.
"#,
        query = query,
        analysis_json = analysis_json,
        rag_context = format_rag_results(outcomes),
    )
}

fn non_empty(text: &str) -> &str {
    if text.is_empty() { "Not available" } else { text }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentSummary;
    use crate::services::grader::{AnswerSource, ValidationVerdict};
    use chrono::Utc;

    fn summary_info() -> DocumentSummaryInfo {
        DocumentSummaryInfo {
            fingerprint: "abcd1234".to_string(),
            company_name: "Apple Inc.".to_string(),
            form_type: "10-K".to_string(),
            filing_date: "2024-11-01".to_string(),
            ticker: Some("AAPL".to_string()),
            summary: DocumentSummary {
                executive_summary: "Annual report overview".to_string(),
                financial_highlights: "Revenue $391B".to_string(),
                investment_insights: "Services growth".to_string(),
                risk_factors: "Supply chain concentration".to_string(),
            },
            content_length: 123456,
            stored_at: Utc::now(),
        }
    }

    #[test]
    fn document_block_carries_all_four_fields() {
        let block = format_documents(&[summary_info()]);
        assert!(block.contains("Document 1: Apple Inc. - 10-K (2024-11-01)"));
        assert!(block.contains("- Executive Summary: Annual report overview"));
        assert!(block.contains("- Financial Highlights: Revenue $391B"));
        assert!(block.contains("- Investment Insights: Services growth"));
        assert!(block.contains("- Risk Factors: Supply chain concentration"));
        assert!(block.contains("- Content Length: 123456 characters"));
    }

    #[test]
    fn empty_summary_fields_render_as_not_available() {
        let mut info = summary_info();
        info.summary = DocumentSummary::default();
        let block = format_documents(&[info]);
        assert!(block.contains("- Executive Summary: Not available"));
    }

    #[test]
    fn rag_results_take_first_three_answers() {
        let outcome = RetrievalOutcome {
            query: "What is the revenue?".to_string(),
            original_results: Vec::new(),
            final_results: (1..=5).map(|i| format!("answer {}", i)).collect(),
            source: AnswerSource::Rag,
            validation: ValidationVerdict {
                validation_available: false,
                validation_passed: true,
                reasoning: String::new(),
                confidence_score: 0.5,
                missing_aspects: Vec::new(),
                requires_current_data: false,
            },
            timestamp: Utc::now(),
        };

        let block = format_rag_results(&[outcome]);
        assert!(block.contains("RAG Query 1: \"What is the revenue?\""));
        assert!(block.contains("Results (5 total):"));
        assert!(block.contains("answer 3"));
        assert!(!block.contains("answer 4"));
    }
}
