//! HTTP surface for the statement QA service.
//!
//! This module exposes a compact Axum router with a handful of endpoints:
//!
//! - `POST /qa` – Multipart upload with a `file` part (the PDF), zero or more `queries` parts
//!   (menu selections), and an optional `custom_queries` part (comma-separated free text that
//!   takes precedence). Returns `{ "rows": [...] | null, "answers": "..." }`.
//! - `GET /queries` – Sample questions offered by the query menu.
//! - `GET /health` – Vector store reachability and collection readiness.
//! - `GET /metrics` – Request, indexing, and answer counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.

use crate::pipeline::{QaApi, QaRequest, SAMPLE_QUERIES};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartError},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Build the HTTP router exposing the question-answering API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: QaApi + 'static,
{
    Router::new()
        .route("/qa", post(answer_queries::<S>))
        .route("/queries", get(get_sample_queries))
        .route("/health", get(get_health::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(service)
}

/// Answer the uploaded statement's queries.
///
/// Pipeline failures are not HTTP errors: they come back as `rows: null` with the generic error
/// message, matching what the interactive front end displays.
async fn answer_queries<S>(
    State(service): State<Arc<S>>,
    multipart: Multipart,
) -> Result<Response, AppError>
where
    S: QaApi,
{
    let request = read_request(multipart).await?;
    tracing::info!(
        bytes = request.document.len(),
        selected = request.selected_queries.len(),
        custom = request.custom_queries.is_some(),
        "QA request received"
    );
    let response = service.answer(request).await;
    Ok(Json(response).into_response())
}

async fn read_request(mut multipart: Multipart) -> Result<QaRequest, AppError> {
    let mut document = None;
    let mut selected_queries = Vec::new();
    let mut custom_queries = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => document = Some(field.bytes().await?.to_vec()),
            "queries" => selected_queries.push(field.text().await?),
            "custom_queries" => custom_queries = Some(field.text().await?),
            other => tracing::debug!(field = other, "Ignoring unknown multipart field"),
        }
    }

    let document = document
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| AppError::BadRequest("missing `file` part with the PDF".into()))?;
    Ok(QaRequest {
        document,
        selected_queries,
        custom_queries,
    })
}

/// Response body for `GET /queries`.
#[derive(Serialize)]
struct SampleQueriesResponse {
    queries: &'static [&'static str],
}

async fn get_sample_queries() -> Json<SampleQueriesResponse> {
    Json(SampleQueriesResponse {
        queries: &SAMPLE_QUERIES,
    })
}

async fn get_health<S>(State(service): State<Arc<S>>) -> Response
where
    S: QaApi,
{
    let health = service.health().await;
    let status = if health.store.reachable {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health)).into_response()
}

async fn get_metrics<S>(State(service): State<Arc<S>>) -> Response
where
    S: QaApi,
{
    Json(service.metrics_snapshot()).into_response()
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "qa",
                method: "POST",
                path: "/qa",
                description: "Upload a PDF statement as multipart `file` and ask `queries` or comma-separated `custom_queries`. Response returns { \"rows\": [...], \"answers\": string }.",
                request_example: Some(json!({
                    "file": "<statement.pdf>",
                    "queries": [SAMPLE_QUERIES[1]],
                    "custom_queries": "What is the total revenue?, What are the total expenses?"
                })),
            },
            CommandDescriptor {
                name: "sample_queries",
                method: "GET",
                path: "/queries",
                description: "Return the sample questions offered by the query menu.",
                request_example: None,
            },
            CommandDescriptor {
                name: "health",
                method: "GET",
                path: "/health",
                description: "Report vector store reachability and whether the collection exists.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return request, indexing, and answer counters.",
                request_example: None,
            },
        ],
    })
}

enum AppError {
    BadRequest(String),
    Multipart(MultipartError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message).into_response(),
            Self::Multipart(error) => error.into_response(),
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(inner: MultipartError) -> Self {
        Self::Multipart(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::{create_router, get_commands};
    use crate::metrics::MetricsSnapshot;
    use crate::pipeline::{QaApi, QaRequest, QaResponse, RelevantRowSet, ServiceHealth};
    use crate::store::StoreHealth;
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    const BOUNDARY: &str = "pnlqaboundary";

    #[tokio::test]
    async fn commands_catalog_exposes_qa_endpoint() {
        let response = get_commands().await;
        let commands = response.0.commands;
        let qa = commands
            .iter()
            .find(|cmd| cmd.name == "qa")
            .expect("qa command present");

        assert_eq!(qa.method, "POST");
        assert_eq!(qa.path, "/qa");
        assert!(qa.description.contains("multipart"));
        assert!(commands.len() >= 3);
    }

    #[tokio::test]
    async fn qa_route_forwards_multipart_fields() {
        let service = Arc::new(StubQaService::default());
        let app = create_router(service.clone());

        let body = multipart_body(&[
            ("file", Some("statement.pdf"), "%PDF-1.4 fake"),
            ("queries", None, "What is the net income for 2024?"),
            ("queries", None, "What are the total expenses for Q2 2023?"),
            ("custom_queries", None, "What is the expense?"),
        ]);
        let response = app.oneshot(multipart_request(body)).await.expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["answers"], "40");
        assert_eq!(json["rows"][0]["query"], "What is the expense?");

        let calls = service.calls.lock().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].document, b"%PDF-1.4 fake");
        assert_eq!(calls[0].selected_queries.len(), 2);
        assert_eq!(calls[0].custom_queries.as_deref(), Some("What is the expense?"));
    }

    #[tokio::test]
    async fn qa_route_rejects_missing_file() {
        let service = Arc::new(StubQaService::default());
        let app = create_router(service.clone());

        let body = multipart_body(&[("queries", None, "What is the net income for 2024?")]);
        let response = app.oneshot(multipart_request(body)).await.expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(service.calls.lock().await.is_empty());
    }

    #[tokio::test]
    async fn sample_queries_are_listed() {
        let app = create_router(Arc::new(StubQaService::default()));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/queries")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");

        let json = json_body(response).await;
        assert_eq!(json["queries"].as_array().map(Vec::len), Some(5));
        assert_eq!(json["queries"][0], "What is the gross profit for Q3 2024?");
    }

    #[tokio::test]
    async fn health_reports_unavailable_store() {
        let service = StubQaService {
            reachable: false,
            ..StubQaService::default()
        };
        let app = create_router(Arc::new(service));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = json_body(response).await;
        assert_eq!(json["status"], "degraded");
    }

    #[tokio::test]
    async fn metrics_route_returns_counters() {
        let app = create_router(Arc::new(StubQaService::default()));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");

        let json = json_body(response).await;
        assert_eq!(json["requests_processed"], 3);
        assert_eq!(json["requests_failed"], 1);
    }

    #[derive(Default)]
    struct StubQaService {
        calls: Mutex<Vec<QaRequest>>,
        reachable: bool,
    }

    #[async_trait]
    impl QaApi for StubQaService {
        async fn answer(&self, request: QaRequest) -> QaResponse {
            let query = request
                .resolve_queries()
                .into_iter()
                .next()
                .unwrap_or_default();
            self.calls.lock().await.push(request);
            QaResponse {
                rows: Some(vec![RelevantRowSet {
                    query,
                    rows: Vec::new(),
                }]),
                answers: "40".into(),
            }
        }

        async fn health(&self) -> ServiceHealth {
            ServiceHealth {
                status: if self.reachable { "ok" } else { "degraded" },
                collection: "financial_data".into(),
                store: StoreHealth {
                    reachable: self.reachable,
                    collection_present: self.reachable,
                    error: None,
                },
            }
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot {
                requests_processed: 3,
                requests_failed: 1,
                rows_indexed: 12,
                answers_generated: 6,
            }
        }
    }

    fn multipart_body(parts: &[(&str, Option<&str>, &str)]) -> String {
        let mut body = String::new();
        for (name, filename, value) in parts {
            body.push_str(&format!("--{BOUNDARY}\r\n"));
            match filename {
                Some(filename) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: application/pdf\r\n\r\n"
                )),
                None => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"
                )),
            }
            body.push_str(value);
            body.push_str("\r\n");
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        body
    }

    fn multipart_request(body: String) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/qa")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("request")
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&body).expect("json body")
    }
}
