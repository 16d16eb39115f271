//! Vector collection seam used by the indexer and retriever.

use crate::qdrant::QdrantError;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Errors reported by vector store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Qdrant rejected or failed a request.
    #[error("Qdrant request failed: {0}")]
    Qdrant(#[from] QdrantError),
    /// The backend returned data the pipeline cannot interpret.
    #[error("Unexpected vector store response: {0}")]
    InvalidResponse(String),
}

/// One table row ready to be written: id is the row index.
#[derive(Debug, Clone, PartialEq)]
pub struct RowPoint {
    /// Row index within the current table.
    pub id: u64,
    /// Space-joined cell values.
    pub row_text: String,
    /// Embedding of `row_text`.
    pub vector: Vec<f32>,
}

/// Nearest-neighbour match returned by a search.
#[derive(Debug, Clone, PartialEq)]
pub struct RowHit {
    /// Row index stored as the point id.
    pub id: u64,
    /// Similarity score.
    pub score: f32,
    /// Stored row text, when the payload carried one.
    pub row_text: Option<String>,
}

/// Counters describing one upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexSummary {
    /// Points written by the request.
    pub upserted: usize,
    /// Whether the collection was emptied first.
    pub cleared: bool,
}

/// Reachability and readiness snapshot for the vector store.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct StoreHealth {
    /// Whether the backend answered.
    pub reachable: bool,
    /// Whether the configured collection exists.
    pub collection_present: bool,
    /// Diagnostic message captured when the backend is unreachable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Persistent collection supporting upsert and nearest-neighbour search.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create `collection` with `vector_size` dimensions when it is missing.
    async fn ensure_collection(&self, collection: &str, vector_size: u64)
    -> Result<(), StoreError>;

    /// Remove every point from `collection`.
    async fn clear(&self, collection: &str) -> Result<(), StoreError>;

    /// Insert or overwrite points by id; `document_hash` is stored alongside each row.
    async fn upsert_rows(
        &self,
        collection: &str,
        points: Vec<RowPoint>,
        document_hash: &str,
    ) -> Result<usize, StoreError>;

    /// Return up to `limit` points nearest to `vector`, best first.
    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<RowHit>, StoreError>;

    /// Probe the backend.
    async fn health(&self, collection: &str) -> StoreHealth;
}

/// Stored row as kept by [`MemoryVectorStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    /// Space-joined cell values.
    pub row_text: String,
    /// Embedding of the row.
    pub vector: Vec<f32>,
    /// Fingerprint of the document the row came from.
    pub document_hash: String,
}

/// Process-local store with cosine search, for runs without a Qdrant instance.
#[derive(Default)]
pub struct MemoryVectorStore {
    collections: Mutex<HashMap<String, BTreeMap<u64, StoredRow>>>,
    writes: AtomicUsize,
}

impl MemoryVectorStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of clear and upsert operations applied so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    /// Number of points in `collection`.
    pub fn len(&self, collection: &str) -> usize {
        self.lock().get(collection).map(BTreeMap::len).unwrap_or(0)
    }

    /// Returns true when `collection` holds no points.
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// Stored text of point `id`.
    pub fn row_text(&self, collection: &str, id: u64) -> Option<String> {
        self.lock()
            .get(collection)
            .and_then(|rows| rows.get(&id))
            .map(|row| row.row_text.clone())
    }

    /// Copy of every point in `collection`, ordered by id.
    pub fn snapshot(&self, collection: &str) -> BTreeMap<u64, StoredRow> {
        self.lock().get(collection).cloned().unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, BTreeMap<u64, StoredRow>>> {
        self.collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn ensure_collection(
        &self,
        collection: &str,
        _vector_size: u64,
    ) -> Result<(), StoreError> {
        self.lock().entry(collection.to_string()).or_default();
        Ok(())
    }

    async fn clear(&self, collection: &str) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        if let Some(rows) = self.lock().get_mut(collection) {
            rows.clear();
        }
        Ok(())
    }

    async fn upsert_rows(
        &self,
        collection: &str,
        points: Vec<RowPoint>,
        document_hash: &str,
    ) -> Result<usize, StoreError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let count = points.len();
        let mut collections = self.lock();
        let rows = collections.entry(collection.to_string()).or_default();
        for point in points {
            rows.insert(
                point.id,
                StoredRow {
                    row_text: point.row_text,
                    vector: point.vector,
                    document_hash: document_hash.to_string(),
                },
            );
        }
        Ok(count)
    }

    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<RowHit>, StoreError> {
        let collections = self.lock();
        let Some(rows) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<RowHit> = rows
            .iter()
            .map(|(id, row)| RowHit {
                id: *id,
                score: cosine_similarity(&vector, &row.vector),
                row_text: Some(row.row_text.clone()),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn health(&self, collection: &str) -> StoreHealth {
        StoreHealth {
            reachable: true,
            collection_present: self.lock().contains_key(collection),
            error: None,
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: u64, text: &str, vector: Vec<f32>) -> RowPoint {
        RowPoint {
            id,
            row_text: text.into(),
            vector,
        }
    }

    #[tokio::test]
    async fn search_ranks_by_cosine_similarity() {
        let store = MemoryVectorStore::new();
        store
            .upsert_rows(
                "c",
                vec![
                    point(0, "Revenue 100", vec![1.0, 0.0]),
                    point(1, "Expenses 40", vec![0.0, 1.0]),
                    point(2, "Profit 60", vec![0.5, 0.5]),
                ],
                "hash",
            )
            .await
            .expect("upsert");

        let hits = store.search("c", vec![0.0, 2.0], 2).await.expect("search");
        assert_eq!(hits.iter().map(|hit| hit.id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(hits[0].row_text.as_deref(), Some("Expenses 40"));
    }

    #[tokio::test]
    async fn upsert_overwrites_existing_ids() {
        let store = MemoryVectorStore::new();
        store
            .upsert_rows("c", vec![point(0, "old", vec![1.0])], "a")
            .await
            .expect("first");
        store
            .upsert_rows("c", vec![point(0, "new", vec![1.0])], "b")
            .await
            .expect("second");

        assert_eq!(store.len("c"), 1);
        assert_eq!(store.row_text("c", 0).as_deref(), Some("new"));
        assert_eq!(store.snapshot("c")[&0].document_hash, "b");
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn missing_collection_searches_empty() {
        let store = MemoryVectorStore::new();
        assert!(store.search("absent", vec![1.0], 3).await.expect("search").is_empty());
        assert!(!store.health("absent").await.collection_present);
    }
}
