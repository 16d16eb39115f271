//! The question-answering pipeline over an uploaded statement.
//!
//! A request flows through five stages: locate the statement page, extract and reshape its
//! table, index the rows in the vector store, retrieve rows per query, and generate one answer
//! per query from the composed context. [`QaService`] owns the collaborators and runs the stages.

pub mod answer;
pub mod context;
pub mod indexer;
pub mod retriever;
pub mod service;
pub mod types;

pub use answer::{answer_batch, build_prompt, extract_answer};
pub use context::{compose_context, merge_row_sets};
pub use indexer::index_table;
pub use retriever::retrieve_rows;
pub use service::{QaApi, QaService, QaServiceParts, ServiceHealth};
pub use types::{
    AnswerOutcome, BootstrapError, GENERATION_ERROR_ANSWER, GenerationSettings, IndexError,
    NO_CONTEXT_ANSWER, PIPELINE_ERROR_MESSAGE, PipelineError, PipelineOptions, QaRequest,
    QaResponse, RelevantRowSet, RetrievalError, SAMPLE_QUERIES,
};
