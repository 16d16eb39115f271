//! Finds the page that carries the full Profit & Loss statement.
//!
//! Statements usually repeat the heading for a summary and a detailed section, so the locator
//! returns the second page that carries every marker phrase.

use super::{Document, DocumentReader};

/// Marker phrases that must all appear on a candidate page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementMarkers {
    /// Statement-type heading.
    pub heading: String,
    /// Revenue section marker.
    pub revenue: String,
    /// Expense section marker.
    pub expense: String,
}

impl Default for StatementMarkers {
    fn default() -> Self {
        Self {
            heading: "Statement of Profit and Loss".into(),
            revenue: "Revenue".into(),
            expense: "Expenses".into(),
        }
    }
}

impl StatementMarkers {
    /// Whether `text` contains all three markers.
    pub fn matches(&self, text: &str) -> bool {
        text.contains(&self.heading) && text.contains(&self.revenue) && text.contains(&self.expense)
    }
}

/// Return the number of the second candidate page, or `None` with fewer than two candidates.
pub fn locate_statement_page(document: &Document, markers: &StatementMarkers) -> Option<String> {
    let page = document
        .pages()
        .iter()
        .filter(|page| markers.matches(&page.text))
        .nth(1)
        .map(|page| page.number.to_string());

    match &page {
        Some(number) => tracing::debug!(page = %number, "Located statement page"),
        None => tracing::warn!(
            heading = %markers.heading,
            "Fewer than two statement pages found"
        ),
    }
    page
}

/// Load `bytes` with `reader` and locate the statement page.
///
/// A document that fails to load is logged and treated as having no pages, so the caller
/// proceeds with no page rather than an error.
pub fn load_and_locate(
    reader: &dyn DocumentReader,
    bytes: &[u8],
    markers: &StatementMarkers,
) -> (Document, Option<String>) {
    let document = reader.read(bytes).unwrap_or_else(|error| {
        tracing::error!(error = %error, "Error extracting page number from PDF");
        Document::default()
    });
    let page = locate_statement_page(&document, markers);
    (document, page)
}
