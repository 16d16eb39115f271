//! Statement table extraction: raw grids from a page, reshaped into a [`FinancialTable`].

pub mod normalize;
pub mod stream;

pub use normalize::{
    HeaderRowNormalizer, NormalizerSet, QuarterlyStatementNormalizer, TableNormalizer,
};
pub use stream::StreamTableExtractor;

use crate::document::Document;
use serde::Serialize;
use thiserror::Error;

/// Errors raised while extracting or reshaping a statement table.
#[derive(Debug, Error)]
pub enum TableError {
    /// The page identifier did not name a page of the document.
    #[error("Page not found: {0}")]
    PageNotFound(String),
    /// Reshaping expected a column the table does not have.
    #[error("Missing expected column: {0}")]
    MissingColumn(String),
    /// The table did not have the structure a normalizer requires.
    #[error("Unexpected table shape: {0}")]
    Shape(String),
}

/// Cell grid as produced by the extraction service, before any reshaping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Build a raw table, padding short rows so every row has the same width.
    pub fn new(mut rows: Vec<Vec<String>>) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        for row in &mut rows {
            row.resize(width, String::new());
        }
        Self { rows }
    }

    /// Rows in page order.
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Consume the table, returning its rows.
    pub fn into_rows(self) -> Vec<Vec<String>> {
        self.rows
    }

    /// Number of columns shared by every row.
    pub fn width(&self) -> usize {
        self.rows.first().map(Vec::len).unwrap_or(0)
    }

    /// Returns true when the grid has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Row/column table keyed by reporting period, rows indexed `0..len()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinancialTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl FinancialTable {
    /// Build a table; every row is padded or truncated to the column count.
    pub fn new(columns: Vec<String>, mut rows: Vec<Vec<String>>) -> Self {
        for row in &mut rows {
            row.resize(columns.len(), String::new());
        }
        Self { columns, rows }
    }

    /// A table with no columns and no rows.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Column names in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true when the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Materialize the row at `index` with its column names.
    pub fn row(&self, index: usize) -> Option<TableRow> {
        let values = self.rows.get(index)?;
        let cells = self
            .columns
            .iter()
            .zip(values)
            .map(|(column, value)| RowCell {
                column: column.clone(),
                value: value.clone(),
            })
            .collect();
        Some(TableRow { index, cells })
    }

    /// Space-joined cell values of the row at `index`.
    pub fn row_text(&self, index: usize) -> Option<String> {
        self.rows.get(index).map(|values| values.join(" "))
    }

    /// Space-joined cell values of every row, in index order.
    pub fn row_texts(&self) -> Vec<String> {
        self.rows.iter().map(|values| values.join(" ")).collect()
    }
}

/// One table row together with its index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableRow {
    /// Row index within the table.
    pub index: usize,
    /// Cells in column order.
    pub cells: Vec<RowCell>,
}

/// A single named cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowCell {
    /// Column name.
    pub column: String,
    /// Cell value as text.
    pub value: String,
}

/// Service that finds tables on a document page.
pub trait TableExtractor: Send + Sync {
    /// Extract every table found on `page`, in page order.
    fn extract_tables(&self, document: &Document, page: &str) -> Result<Vec<RawTable>, TableError>;
}

/// Extract the first table on `page` and reshape it with the first matching normalizer.
///
/// Never fails: a missing page, a page without tables, or a reshape error all produce an empty
/// table and a log entry.
pub fn extract_statement_table(
    extractor: &dyn TableExtractor,
    normalizers: &NormalizerSet,
    document: &Document,
    page: Option<&str>,
) -> FinancialTable {
    let Some(page) = page else {
        tracing::warn!("No statement page located; skipping table extraction");
        return FinancialTable::empty();
    };

    let raw = match extractor.extract_tables(document, page) {
        Ok(tables) => match tables.into_iter().next() {
            Some(table) => table,
            None => {
                tracing::warn!(page, "No tables found on the specified page");
                return FinancialTable::empty();
            }
        },
        Err(error) => {
            tracing::error!(page, error = %error, "Error extracting tables from PDF");
            return FinancialTable::empty();
        }
    };

    match normalizers.normalize(raw) {
        Ok(table) => {
            tracing::info!(
                page,
                rows = table.len(),
                columns = table.columns().len(),
                "Extracted statement table"
            );
            table
        }
        Err(error) => {
            tracing::error!(page, error = %error, "Error reshaping statement table");
            FinancialTable::empty()
        }
    }
}
