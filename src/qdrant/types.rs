//! Shared types used by the Qdrant client and helpers.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Errors returned while interacting with Qdrant.
#[derive(Debug, Error)]
pub enum QdrantError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid Qdrant URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Qdrant responded with an unexpected status code.
    #[error("Unexpected Qdrant response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from Qdrant.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

/// Point identifier as Qdrant reports it. Rows are written with integer ids.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PointId {
    /// Unsigned integer id, the row index.
    Index(u64),
    /// UUID id written by some other client.
    Uuid(String),
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "{index}"),
            Self::Uuid(uuid) => f.write_str(uuid),
        }
    }
}

/// A row vector matched by a similarity query.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    /// Identifier of the matched point.
    pub id: PointId,
    /// Similarity score computed by Qdrant.
    pub score: f32,
    /// Row text stored in the point payload, when present.
    pub row_text: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct ListCollectionsResponse {
    pub(crate) result: ListCollectionsResult,
}

#[derive(Deserialize)]
pub(crate) struct ListCollectionsResult {
    pub(crate) collections: Vec<CollectionDescription>,
}

#[derive(Deserialize)]
pub(crate) struct CollectionDescription {
    pub(crate) name: String,
}

/// Body of a `points/query` response.
#[derive(Deserialize)]
pub(crate) struct QueryResponse {
    pub(crate) result: QueryResult,
}

#[derive(Deserialize)]
pub(crate) struct QueryResult {
    #[serde(default)]
    pub(crate) points: Vec<QueryPoint>,
}

#[derive(Deserialize)]
pub(crate) struct QueryPoint {
    pub(crate) id: PointId,
    pub(crate) score: f32,
    #[serde(default)]
    pub(crate) payload: Option<Map<String, Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_points_accept_integer_and_uuid_ids() {
        let response: QueryResponse = serde_json::from_value(serde_json::json!({
            "result": {
                "points": [
                    { "id": 2, "score": 0.9, "payload": { "row": "Total Expenses 40" } },
                    { "id": "5c56c793-69f3-4fbf-87e6-c4bf54c28c26", "score": 0.1 }
                ]
            }
        }))
        .expect("query response");

        let points = response.result.points;
        assert_eq!(points[0].id, PointId::Index(2));
        assert!(points[0].payload.is_some());
        assert_eq!(
            points[1].id.to_string(),
            "5c56c793-69f3-4fbf-87e6-c4bf54c28c26"
        );
        assert!(points[1].payload.is_none());
    }

    #[test]
    fn empty_query_result_has_no_points() {
        let response: QueryResponse =
            serde_json::from_value(serde_json::json!({ "result": {} })).expect("query response");
        assert!(response.result.points.is_empty());
    }
}
