//! HTTP client wrapper for interacting with Qdrant.

use crate::qdrant::{
    payload::{build_row_payload, current_timestamp_rfc3339, extract_row_text},
    types::{ListCollectionsResponse, PointId, QdrantError, QueryResponse, ScoredPoint},
};
use crate::store::{RowHit, RowPoint, StoreError, StoreHealth, VectorStore};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::json;

/// Lightweight HTTP client for Qdrant operations.
pub struct QdrantService {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
}

impl QdrantService {
    /// Construct a client for the Qdrant instance at `url`.
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self, QdrantError> {
        let client = Client::builder().user_agent("pnl-qa/0.1").build()?;

        let base_url = normalize_base_url(url).map_err(QdrantError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            has_api_key = %api_key
                .as_deref()
                .map(|value| !value.is_empty())
                .unwrap_or(false),
            "Initialized Qdrant HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// Create a collection only when it is missing from Qdrant.
    pub async fn create_collection_if_not_exists(
        &self,
        collection_name: &str,
        vector_size: u64,
    ) -> Result<(), QdrantError> {
        if self.collection_exists(collection_name).await? {
            return Ok(());
        }

        tracing::debug!(
            collection = collection_name,
            vector_size,
            "Creating collection"
        );
        self.create_collection(collection_name, vector_size).await
    }

    /// Create or update a collection with the specified vector size.
    pub async fn create_collection(
        &self,
        collection_name: &str,
        vector_size: u64,
    ) -> Result<(), QdrantError> {
        let body = json!({
            "vectors": {
                "size": vector_size,
                "distance": "Cosine"
            }
        });

        let response = self
            .request(Method::PUT, &format!("collections/{collection_name}"))?
            .json(&body)
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection = collection_name, "Collection ensured/created");
        })
        .await
    }

    /// Retrieve the names of all collections present in Qdrant.
    pub async fn list_collections(&self) -> Result<Vec<String>, QdrantError> {
        let response = self.request(Method::GET, "collections")?.send().await?;

        if response.status().is_success() {
            let payload: ListCollectionsResponse = response.json().await?;
            let names = payload
                .result
                .collections
                .into_iter()
                .map(|collection| collection.name)
                .collect();
            Ok(names)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Failed to list collections");
            Err(error)
        }
    }

    /// Write points with caller-chosen integer ids, overwriting existing ids.
    pub async fn upsert_points(
        &self,
        collection_name: &str,
        points: Vec<RowPoint>,
        document_hash: &str,
    ) -> Result<usize, QdrantError> {
        if points.is_empty() {
            return Ok(0);
        }

        let now = current_timestamp_rfc3339();
        let serialized: Vec<_> = points
            .into_iter()
            .map(|point| {
                json!({
                    "id": point.id,
                    "vector": point.vector,
                    "payload": build_row_payload(&point.row_text, document_hash, &now),
                })
            })
            .collect();

        let point_count = serialized.len();
        let response = self
            .request(
                Method::PUT,
                &format!("collections/{collection_name}/points"),
            )?
            .query(&[("wait", true)])
            .json(&json!({ "points": serialized }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(
                collection = collection_name,
                points = point_count,
                "Points upserted"
            );
        })
        .await?;

        Ok(point_count)
    }

    /// Delete every point in the collection, keeping the collection itself.
    pub async fn delete_all_points(&self, collection_name: &str) -> Result<(), QdrantError> {
        let response = self
            .request(
                Method::POST,
                &format!("collections/{collection_name}/points/delete"),
            )?
            .query(&[("wait", true)])
            .json(&json!({ "filter": { "must": [] } }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection = collection_name, "Collection cleared");
        })
        .await
    }

    /// Perform a similarity search against a collection, returning scored payloads.
    pub async fn search_points(
        &self,
        collection_name: &str,
        vector: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, QdrantError> {
        let body = json!({
            "query": vector,
            "limit": limit,
            "with_payload": true,
        });

        let response = self
            .request(
                Method::POST,
                &format!("collections/{collection_name}/points/query"),
            )?
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(collection = collection_name, error = %error, "Qdrant search failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        let results = payload
            .result
            .points
            .into_iter()
            .map(|point| ScoredPoint {
                id: point.id,
                score: point.score,
                row_text: point.payload.as_ref().and_then(extract_row_text),
            })
            .collect();

        Ok(results)
    }

    async fn collection_exists(&self, collection_name: &str) -> Result<bool, QdrantError> {
        let response = self
            .request(Method::GET, &format!("collections/{collection_name}"))?
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = QdrantError::UnexpectedStatus { status, body };
                tracing::error!(collection = collection_name, error = %error, "Collection existence check failed");
                Err(error)
            }
        }
    }

    fn request(&self, method: Method, path: &str) -> Result<reqwest::RequestBuilder, QdrantError> {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        Ok(req)
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), QdrantError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Qdrant request failed");
            Err(error)
        }
    }
}

#[async_trait]
impl VectorStore for QdrantService {
    async fn ensure_collection(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> Result<(), StoreError> {
        Ok(self
            .create_collection_if_not_exists(collection, vector_size)
            .await?)
    }

    async fn clear(&self, collection: &str) -> Result<(), StoreError> {
        Ok(self.delete_all_points(collection).await?)
    }

    async fn upsert_rows(
        &self,
        collection: &str,
        points: Vec<RowPoint>,
        document_hash: &str,
    ) -> Result<usize, StoreError> {
        Ok(self.upsert_points(collection, points, document_hash).await?)
    }

    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<RowHit>, StoreError> {
        self.search_points(collection, vector, limit)
            .await?
            .into_iter()
            .map(|point| match point.id {
                PointId::Index(id) => Ok(RowHit {
                    id,
                    score: point.score,
                    row_text: point.row_text,
                }),
                PointId::Uuid(uuid) => Err(StoreError::InvalidResponse(format!(
                    "non-numeric point id '{uuid}'"
                ))),
            })
            .collect()
    }

    async fn health(&self, collection: &str) -> StoreHealth {
        match self.list_collections().await {
            Ok(collections) => StoreHealth {
                reachable: true,
                collection_present: collections.iter().any(|name| name == collection),
                error: None,
            },
            Err(error) => {
                tracing::warn!(error = %error, "Qdrant health probe failed");
                StoreHealth {
                    reachable: false,
                    collection_present: false,
                    error: Some(error.to_string()),
                }
            }
        }
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}
