//! Embeds table rows and writes them to the vector collection.

use super::types::IndexError;
use crate::{
    embedding::EmbeddingClient,
    store::{IndexSummary, RowPoint, VectorStore},
    table::FinancialTable,
};

/// Embed every row of `table` in one batch and upsert it with its row index as id.
///
/// An empty table is a no-op and never touches the store. With `clear_first` the collection is
/// emptied before the upsert so ids left over from a larger previous table do not survive.
pub async fn index_table(
    table: &FinancialTable,
    embedder: &dyn EmbeddingClient,
    store: &dyn VectorStore,
    collection: &str,
    document_hash: &str,
    clear_first: bool,
) -> Result<IndexSummary, IndexError> {
    if table.is_empty() {
        tracing::warn!("Empty table passed for embedding");
        return Ok(IndexSummary::default());
    }

    let rows_text = table.row_texts();
    let vectors = embedder.generate_embeddings(rows_text.clone()).await?;
    if vectors.len() != rows_text.len() {
        return Err(IndexError::CountMismatch {
            expected: rows_text.len(),
            actual: vectors.len(),
        });
    }

    let points: Vec<RowPoint> = rows_text
        .into_iter()
        .zip(vectors)
        .zip(0u64..)
        .map(|((row_text, vector), id)| RowPoint {
            id,
            row_text,
            vector,
        })
        .collect();

    if clear_first {
        store.clear(collection).await?;
    }
    let upserted = store.upsert_rows(collection, points, document_hash).await?;

    tracing::info!(
        collection,
        rows = upserted,
        cleared = clear_first,
        "Embeddings stored"
    );
    Ok(IndexSummary {
        upserted,
        cleared: clear_first,
    })
}
