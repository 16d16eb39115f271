//! Batch nearest-neighbour retrieval of table rows for free-text queries.

use super::types::{RelevantRowSet, RetrievalError};
use crate::{embedding::EmbeddingClient, store::VectorStore, table::FinancialTable};
use futures_util::future::try_join_all;
use std::collections::BTreeSet;

/// Return the rows relevant to each query, in query order.
///
/// Queries are embedded in one batch and searched concurrently. Hits are mapped back to table
/// rows by id; ids outside the current table are ignored, so an empty table or a collection
/// with no matches yields empty sets rather than an error.
pub async fn retrieve_rows(
    queries: &[String],
    table: &FinancialTable,
    embedder: &dyn EmbeddingClient,
    store: &dyn VectorStore,
    collection: &str,
    top_k: usize,
) -> Result<Vec<RelevantRowSet>, RetrievalError> {
    if queries.is_empty() {
        return Ok(Vec::new());
    }
    if table.is_empty() {
        tracing::warn!(queries = queries.len(), "Empty table; no rows to retrieve");
        return Ok(queries
            .iter()
            .map(|query| RelevantRowSet {
                query: query.clone(),
                rows: Vec::new(),
            })
            .collect());
    }

    let vectors = embedder.generate_embeddings(queries.to_vec()).await?;
    if vectors.len() != queries.len() {
        return Err(RetrievalError::CountMismatch {
            expected: queries.len(),
            actual: vectors.len(),
        });
    }

    let searches = vectors
        .into_iter()
        .map(|vector| store.search(collection, vector, top_k));
    let results = try_join_all(searches).await?;

    let sets = queries
        .iter()
        .zip(results)
        .map(|(query, hits)| {
            let indices: BTreeSet<usize> = hits
                .into_iter()
                .filter_map(|hit| usize::try_from(hit.id).ok())
                .filter(|index| *index < table.len())
                .collect();
            let rows = indices
                .into_iter()
                .filter_map(|index| table.row(index))
                .collect::<Vec<_>>();
            tracing::debug!(query = %query, rows = rows.len(), "Retrieved rows");
            RelevantRowSet {
                query: query.clone(),
                rows,
            }
        })
        .collect();

    Ok(sets)
}
