//! Request, response, option, and error types for the question-answering pipeline.

use crate::{
    config::{Config, ContextMode, FailurePolicy},
    document::StatementMarkers,
    embedding::EmbeddingClientError,
    store::StoreError,
    table::TableRow,
};
use serde::Serialize;
use thiserror::Error;

/// Answer used when retrieval produced no context for a query.
pub const NO_CONTEXT_ANSWER: &str = "No relevant context found.";
/// Answer used when generation failed.
pub const GENERATION_ERROR_ANSWER: &str = "Error generating answer.";
/// Message returned in place of answers when the pipeline fails.
pub const PIPELINE_ERROR_MESSAGE: &str = "Error processing the queries.";

/// Errors raised while embedding and indexing table rows.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Embedding provider failed to produce row vectors.
    #[error("Failed to embed rows: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Vector store rejected a write.
    #[error("Failed to store rows: {0}")]
    Store(#[from] StoreError),
    /// Provider returned a different number of vectors than rows.
    #[error("Embedding count mismatch: expected {expected}, got {actual}")]
    CountMismatch {
        /// Rows submitted for embedding.
        expected: usize,
        /// Vectors returned.
        actual: usize,
    },
}

/// Errors raised while retrieving rows for queries.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Embedding provider failed to produce query vectors.
    #[error("Failed to embed queries: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Nearest-neighbour search failed.
    #[error("Vector search failed: {0}")]
    Store(#[from] StoreError),
    /// Provider returned a different number of vectors than queries.
    #[error("Embedding count mismatch: expected {expected}, got {actual}")]
    CountMismatch {
        /// Queries submitted for embedding.
        expected: usize,
        /// Vectors returned.
        actual: usize,
    },
}

/// Failures that end a request with the generic error message.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Row retrieval failed.
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
    /// A blocking worker panicked or was cancelled.
    #[error("Worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Errors raised while constructing the service at startup.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// The Qdrant client could not be created.
    #[error("Failed to initialize Qdrant client: {0}")]
    Qdrant(#[from] crate::qdrant::QdrantError),
    /// The collection could not be ensured.
    #[error("Failed to prepare vector collection: {0}")]
    Store(#[from] StoreError),
}

/// One question-answering request.
#[derive(Debug, Clone, Default)]
pub struct QaRequest {
    /// Raw PDF bytes.
    pub document: Vec<u8>,
    /// Queries selected from the sample menu.
    pub selected_queries: Vec<String>,
    /// Free-text, comma-separated queries; take precedence when non-empty.
    pub custom_queries: Option<String>,
}

impl QaRequest {
    /// Custom queries split on commas when present, otherwise the menu selections.
    pub fn resolve_queries(&self) -> Vec<String> {
        match self.custom_queries.as_deref().map(str::trim) {
            Some(custom) if !custom.is_empty() => custom
                .split(',')
                .map(|query| query.trim().trim_matches(|c| c == '\'' || c == '"').trim())
                .filter(|query| !query.is_empty())
                .map(str::to_string)
                .collect(),
            _ => self
                .selected_queries
                .iter()
                .map(|query| query.trim())
                .filter(|query| !query.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Rows judged relevant to one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelevantRowSet {
    /// The query the rows were retrieved for.
    pub query: String,
    /// Matching rows ordered by row index.
    pub rows: Vec<TableRow>,
}

/// Result of a request: retrieved rows (absent on failure) and newline-joined answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QaResponse {
    /// Rows retrieved per query; `None` when the pipeline failed.
    pub rows: Option<Vec<RelevantRowSet>>,
    /// One answer per query joined with `\n`, or the generic error message.
    pub answers: String,
}

impl QaResponse {
    /// The response returned for any pipeline failure.
    pub fn failure() -> Self {
        Self {
            rows: None,
            answers: PIPELINE_ERROR_MESSAGE.to_string(),
        }
    }
}

/// Outcome of generating one answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerOutcome {
    /// The model produced an answer.
    Answered(String),
    /// Retrieval found nothing; the model was not called.
    NoContext,
    /// Generation failed with the given reason.
    Failed(String),
}

impl AnswerOutcome {
    /// Text shown to the caller.
    pub fn text(&self) -> &str {
        match self {
            Self::Answered(answer) => answer,
            Self::NoContext => NO_CONTEXT_ANSWER,
            Self::Failed(_) => GENERATION_ERROR_ANSWER,
        }
    }

    /// Whether this entry failed.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Sampling settings applied to every answer.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    /// Model identifier.
    pub model: String,
    /// Generated token budget.
    pub max_new_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Nucleus sampling mass.
    pub top_p: f32,
    /// How failures affect the rest of the batch.
    pub failure_policy: FailurePolicy,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: "deepseek-coder:1.3b-instruct".into(),
            max_new_tokens: 200,
            temperature: 0.01,
            top_p: 0.9,
            failure_policy: FailurePolicy::default(),
        }
    }
}

/// Per-service pipeline settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    /// Vector collection holding the indexed rows.
    pub collection: String,
    /// Vector dimension used when creating the collection.
    pub vector_size: u64,
    /// Rows retrieved per query.
    pub top_k: usize,
    /// Context composition strategy.
    pub context_mode: ContextMode,
    /// Drop stored rows before indexing a new table.
    pub clear_before_upsert: bool,
    /// Marker phrases identifying the statement page.
    pub markers: StatementMarkers,
    /// Answer generation settings.
    pub generation: GenerationSettings,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            collection: "financial_data".into(),
            vector_size: 384,
            top_k: 5,
            context_mode: ContextMode::default(),
            clear_before_upsert: true,
            markers: StatementMarkers::default(),
            generation: GenerationSettings::default(),
        }
    }
}

impl PipelineOptions {
    /// Derive options from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            collection: config.qdrant_collection_name.clone(),
            vector_size: config.embedding_dimension as u64,
            top_k: config.retrieval_top_k.max(1),
            context_mode: config.context_mode,
            clear_before_upsert: config.index_clear_before_upsert,
            markers: StatementMarkers::default(),
            generation: GenerationSettings {
                model: config.llm_model.clone(),
                max_new_tokens: config.generation_max_new_tokens,
                failure_policy: config.generation_failure_policy,
                ..GenerationSettings::default()
            },
        }
    }
}

/// Sample questions offered by the query menu.
pub const SAMPLE_QUERIES: [&str; 5] = [
    "What is the gross profit for Q3 2024?",
    "What is the net income for 2024?",
    "How much was the operating income for Q2 2024?",
    "Show the operating margin for the past 6 months.",
    "What are the total expenses for Q2 2023?",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_queries_take_precedence_over_selection() {
        let request = QaRequest {
            selected_queries: vec![SAMPLE_QUERIES[0].into()],
            custom_queries: Some("'What is the net income?', What is revenue? ,".into()),
            ..QaRequest::default()
        };
        assert_eq!(
            request.resolve_queries(),
            vec!["What is the net income?", "What is revenue?"]
        );
    }

    #[test]
    fn blank_custom_field_falls_back_to_selection() {
        let request = QaRequest {
            selected_queries: vec!["Unrelated".into(), "  ".into()],
            custom_queries: Some("   ".into()),
            ..QaRequest::default()
        };
        assert_eq!(request.resolve_queries(), vec!["Unrelated"]);
    }

    #[test]
    fn failure_response_has_no_rows() {
        let response = QaResponse::failure();
        assert_eq!(response.rows, None);
        assert_eq!(response.answers, "Error processing the queries.");
    }

    #[test]
    fn outcome_text_uses_placeholders() {
        assert_eq!(AnswerOutcome::NoContext.text(), NO_CONTEXT_ANSWER);
        assert_eq!(AnswerOutcome::Failed("x".into()).text(), GENERATION_ERROR_ANSWER);
        assert_eq!(AnswerOutcome::Answered("40".into()).text(), "40");
    }
}
