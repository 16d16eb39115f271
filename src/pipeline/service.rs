//! Request orchestration: locate, extract, index, retrieve, compose, answer.

use super::{
    answer::answer_batch,
    context::{compose_context, merge_row_sets},
    indexer::index_table,
    retriever::retrieve_rows,
    types::{
        AnswerOutcome, BootstrapError, PipelineError, PipelineOptions, QaRequest, QaResponse,
        RelevantRowSet,
    },
};
use crate::{
    config::{Config, ContextMode},
    document::{DocumentReader, LopdfReader, load_and_locate},
    embedding::{EmbeddingClient, get_embedding_client},
    generation::{GenerationClient, OllamaGenerationClient},
    metrics::{MetricsSnapshot, QaMetrics},
    qdrant::{QdrantService, compute_document_hash},
    store::{StoreHealth, VectorStore},
    table::{
        FinancialTable, NormalizerSet, StreamTableExtractor, TableExtractor,
        extract_statement_table,
    },
};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::Instrument;
use uuid::Uuid;

/// Readiness report returned by `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceHealth {
    /// `"ok"` when the vector store is reachable, otherwise `"degraded"`.
    pub status: &'static str,
    /// Collection the service indexes into.
    pub collection: String,
    /// Vector store probe result.
    pub store: StoreHealth,
}

/// Operations the HTTP surface and CLI need from the pipeline.
#[async_trait]
pub trait QaApi: Send + Sync {
    /// Answer the request's queries against its document. Never fails; errors map to
    /// [`QaResponse::failure`].
    async fn answer(&self, request: QaRequest) -> QaResponse;

    /// Probe the backing services.
    async fn health(&self) -> ServiceHealth;

    /// Current request counters.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Owns every collaborator of the question-answering pipeline.
///
/// Collaborators are injected as trait objects so tests and the CLI can swap the PDF reader,
/// table extractor, embedder, store, or language model. Indexing and retrieval for one request
/// run under a per-service lock because row ids are reused across documents.
pub struct QaService {
    reader: Arc<dyn DocumentReader>,
    extractor: Arc<dyn TableExtractor>,
    normalizers: Arc<NormalizerSet>,
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn VectorStore>,
    generator: Arc<dyn GenerationClient>,
    options: PipelineOptions,
    metrics: QaMetrics,
    index_lock: Mutex<()>,
}

/// Builder-style constructor arguments for [`QaService`].
pub struct QaServiceParts {
    /// PDF text reader.
    pub reader: Arc<dyn DocumentReader>,
    /// Table extraction service.
    pub extractor: Arc<dyn TableExtractor>,
    /// Ordered reshaping strategies.
    pub normalizers: Arc<NormalizerSet>,
    /// Row and query embedder.
    pub embedder: Arc<dyn EmbeddingClient>,
    /// Vector collection backend.
    pub store: Arc<dyn VectorStore>,
    /// Causal language model.
    pub generator: Arc<dyn GenerationClient>,
}

impl QaService {
    /// Assemble a service from explicit collaborators.
    pub fn new(parts: QaServiceParts, options: PipelineOptions) -> Self {
        Self {
            reader: parts.reader,
            extractor: parts.extractor,
            normalizers: parts.normalizers,
            embedder: parts.embedder,
            store: parts.store,
            generator: parts.generator,
            options,
            metrics: QaMetrics::new(),
            index_lock: Mutex::new(()),
        }
    }

    /// Build the production service from configuration and ensure its collection exists.
    pub async fn bootstrap(config: &Config) -> Result<Self, BootstrapError> {
        let store = QdrantService::new(&config.qdrant_url, config.qdrant_api_key.clone())?;
        let service = Self::from_config(config, Arc::new(store));
        service.prepare().await?;
        Ok(service)
    }

    /// Wire the configured PDF reader, embedder, and language model around `store`.
    pub fn from_config(config: &Config, store: Arc<dyn VectorStore>) -> Self {
        tracing::info!(
            provider = ?config.embedding_provider,
            model = %config.embedding_model,
            "Initializing embedding client"
        );
        let embedder: Arc<dyn EmbeddingClient> = Arc::from(get_embedding_client(config));
        tracing::info!(
            model = %config.llm_model,
            device = ?config.device,
            "Initializing generation client"
        );
        let generator = OllamaGenerationClient::new(config.ollama_url.clone(), config.device);

        Self::new(
            QaServiceParts {
                reader: Arc::new(LopdfReader::new()),
                extractor: Arc::new(StreamTableExtractor::new()),
                normalizers: Arc::new(NormalizerSet::default()),
                embedder,
                store,
                generator: Arc::new(generator),
            },
            PipelineOptions::from_config(config),
        )
    }

    /// Create the configured collection when it is missing.
    pub async fn prepare(&self) -> Result<(), BootstrapError> {
        tracing::debug!(
            collection = %self.options.collection,
            vector_size = self.options.vector_size,
            "Ensuring primary collection"
        );
        self.store
            .ensure_collection(&self.options.collection, self.options.vector_size)
            .await?;
        tracing::debug!(collection = %self.options.collection, "Primary collection ready");
        Ok(())
    }

    /// Options the service was built with.
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Run the full pipeline for one request.
    pub async fn process(&self, request: QaRequest) -> QaResponse {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("qa_request", %request_id);
        async move {
            match self.run(request).await {
                Ok(response) => response,
                Err(error) => {
                    tracing::error!(error = %error, "Error processing PDF and queries");
                    self.metrics.record_failure();
                    QaResponse::failure()
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run(&self, request: QaRequest) -> Result<QaResponse, PipelineError> {
        let queries = request.resolve_queries();
        tracing::info!(
            queries = queries.len(),
            bytes = request.document.len(),
            "Processing request"
        );
        let document_hash = compute_document_hash(&request.document);
        let table = self.extract_table(request.document).await?;

        let (sets, rows_indexed) = {
            let _guard = self.index_lock.lock().await;
            let rows_indexed = match index_table(
                &table,
                self.embedder.as_ref(),
                self.store.as_ref(),
                &self.options.collection,
                &document_hash,
                self.options.clear_before_upsert,
            )
            .await
            {
                Ok(summary) => summary.upserted,
                Err(error) => {
                    tracing::error!(error = %error, "Error storing embeddings");
                    0
                }
            };
            let sets = retrieve_rows(
                &queries,
                &table,
                self.embedder.as_ref(),
                self.store.as_ref(),
                &self.options.collection,
                self.options.top_k,
            )
            .await?;
            (sets, rows_indexed)
        };

        let contexts = self.compose_contexts(&sets);
        let outcomes = answer_batch(
            &queries,
            &contexts,
            self.generator.as_ref(),
            &self.options.generation,
        )
        .await;
        let answers = outcomes
            .iter()
            .map(AnswerOutcome::text)
            .collect::<Vec<_>>()
            .join("\n");

        self.metrics
            .record_request(rows_indexed as u64, outcomes.len() as u64);
        tracing::info!(
            rows_indexed,
            answers = outcomes.len(),
            failed = outcomes.iter().filter(|outcome| outcome.is_failure()).count(),
            "Request completed"
        );
        Ok(QaResponse {
            rows: Some(sets),
            answers,
        })
    }

    /// Read the document and extract its statement table on the blocking pool.
    async fn extract_table(&self, bytes: Vec<u8>) -> Result<FinancialTable, PipelineError> {
        let reader = Arc::clone(&self.reader);
        let markers = self.options.markers.clone();
        let (document, page) =
            tokio::task::spawn_blocking(move || load_and_locate(reader.as_ref(), &bytes, &markers))
                .await?;

        let extractor = Arc::clone(&self.extractor);
        let normalizers = Arc::clone(&self.normalizers);
        let table = tokio::task::spawn_blocking(move || {
            extract_statement_table(
                extractor.as_ref(),
                &normalizers,
                &document,
                page.as_deref(),
            )
        })
        .await?;
        Ok(table)
    }

    fn compose_contexts(&self, sets: &[RelevantRowSet]) -> Vec<String> {
        match self.options.context_mode {
            ContextMode::PerQuery => sets.iter().map(|set| compose_context(&set.rows)).collect(),
            ContextMode::Shared => {
                let shared = compose_context(&merge_row_sets(sets));
                vec![shared; sets.len()]
            }
        }
    }
}

#[async_trait]
impl QaApi for QaService {
    async fn answer(&self, request: QaRequest) -> QaResponse {
        self.process(request).await
    }

    async fn health(&self) -> ServiceHealth {
        let store = self.store.health(&self.options.collection).await;
        ServiceHealth {
            status: if store.reachable { "ok" } else { "degraded" },
            collection: self.options.collection.clone(),
            store,
        }
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, DocumentError};
    use crate::embedding::HashEmbeddingClient;
    use crate::generation::{GenerationClientError, GenerationRequest};
    use crate::store::MemoryVectorStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const STATEMENT: &str = "Statement of Profit and Loss\nRevenue    Expenses\n100    40";

    struct TextReader(Vec<&'static str>);

    impl DocumentReader for TextReader {
        fn read(&self, _bytes: &[u8]) -> Result<Document, DocumentError> {
            Ok(Document::from_texts(self.0.clone()))
        }
    }

    struct BrokenReader;

    impl DocumentReader for BrokenReader {
        fn read(&self, _bytes: &[u8]) -> Result<Document, DocumentError> {
            Err(DocumentError::Parse("not a pdf".into()))
        }
    }

    #[derive(Default)]
    struct EchoGenerator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GenerationClient for EchoGenerator {
        async fn generate(
            &self,
            _request: GenerationRequest,
        ) -> Result<String, GenerationClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(" 40".into())
        }
    }

    fn service(
        reader: Arc<dyn DocumentReader>,
        embedder: Arc<dyn EmbeddingClient>,
        generator: Arc<EchoGenerator>,
        options: PipelineOptions,
    ) -> QaService {
        QaService::new(
            QaServiceParts {
                reader,
                extractor: Arc::new(StreamTableExtractor::new()),
                normalizers: Arc::new(NormalizerSet::default()),
                embedder,
                store: Arc::new(MemoryVectorStore::new()),
                generator,
            },
            options,
        )
    }

    fn request(custom: &str) -> QaRequest {
        QaRequest {
            document: b"%PDF-fake".to_vec(),
            selected_queries: Vec::new(),
            custom_queries: Some(custom.into()),
        }
    }

    #[tokio::test]
    async fn answers_from_the_second_statement_page() {
        let generator = Arc::new(EchoGenerator::default());
        let service = service(
            Arc::new(TextReader(vec!["Statement of Profit and Loss Revenue Expenses", STATEMENT])),
            Arc::new(HashEmbeddingClient::new(16)),
            Arc::clone(&generator),
            PipelineOptions::default(),
        );

        let response = service.process(request("What is the expense?")).await;

        let sets = response.rows.expect("rows");
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].rows[0].cells[1].column, "Expenses");
        assert_eq!(response.answers, "40");
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(service.metrics_snapshot().rows_indexed, 1);
    }

    #[tokio::test]
    async fn unreadable_document_answers_without_context() {
        let generator = Arc::new(EchoGenerator::default());
        let service = service(
            Arc::new(BrokenReader),
            Arc::new(HashEmbeddingClient::new(16)),
            Arc::clone(&generator),
            PipelineOptions::default(),
        );

        let response = service.process(request("a, b")).await;

        assert_eq!(
            response.answers,
            "No relevant context found.\nNo relevant context found."
        );
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn retrieval_failure_returns_generic_error() {
        let service = service(
            Arc::new(TextReader(vec![STATEMENT, STATEMENT])),
            Arc::new(HashEmbeddingClient::new(0)),
            Arc::new(EchoGenerator::default()),
            PipelineOptions::default(),
        );

        let response = service.process(request("What is the expense?")).await;

        assert_eq!(response, QaResponse::failure());
        assert_eq!(service.metrics_snapshot().requests_failed, 1);
    }

    #[test]
    fn shared_mode_gives_every_query_the_same_context() {
        let service = service(
            Arc::new(TextReader(vec![STATEMENT, STATEMENT])),
            Arc::new(HashEmbeddingClient::new(16)),
            Arc::new(EchoGenerator::default()),
            PipelineOptions {
                context_mode: ContextMode::Shared,
                ..PipelineOptions::default()
            },
        );
        let sets = vec![
            RelevantRowSet {
                query: "a".into(),
                rows: Vec::new(),
            },
            RelevantRowSet {
                query: "b".into(),
                rows: FinancialTable::new(vec!["A".into()], vec![vec!["1".into()]])
                    .row(0)
                    .into_iter()
                    .collect(),
            },
        ];

        let contexts = service.compose_contexts(&sets);
        assert_eq!(contexts, vec!["Row 0: A: 1".to_string(), "Row 0: A: 1".to_string()]);
    }

    #[tokio::test]
    async fn health_reports_store_state() {
        let service = service(
            Arc::new(BrokenReader),
            Arc::new(HashEmbeddingClient::new(4)),
            Arc::new(EchoGenerator::default()),
            PipelineOptions::default(),
        );
        service.prepare().await.expect("prepare");

        let health = service.health().await;
        assert_eq!(health.status, "ok");
        assert!(health.store.collection_present);
    }
}
