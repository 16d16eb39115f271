//! Helpers for constructing row payloads and document fingerprints.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

/// Payload key holding the space-joined row text.
pub const ROW_KEY: &str = "row";

/// Build the payload stored alongside each indexed row.
pub(crate) fn build_row_payload(row_text: &str, document_hash: &str, indexed_at: &str) -> Value {
    let mut payload = Map::new();
    payload.insert(ROW_KEY.into(), Value::String(row_text.to_string()));
    payload.insert(
        "document_hash".into(),
        Value::String(document_hash.to_string()),
    );
    payload.insert("indexed_at".into(), Value::String(indexed_at.to_string()));
    Value::Object(payload)
}

/// Hex-encoded SHA-256 of the uploaded document bytes.
pub fn compute_document_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Current UTC timestamp formatted as RFC3339.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| OffsetDateTime::now_utc().unix_timestamp().to_string())
}

/// Read the row text back out of a stored payload.
pub(crate) fn extract_row_text(payload: &Map<String, Value>) -> Option<String> {
    payload
        .get(ROW_KEY)
        .and_then(Value::as_str)
        .map(str::to_string)
}
