//! PDF loading behind the [`DocumentReader`] seam.

use super::{Document, DocumentError, Page, layout};

/// Turns raw document bytes into pages of text.
pub trait DocumentReader: Send + Sync {
    /// Parse `bytes` and extract the text of every page.
    fn read(&self, bytes: &[u8]) -> Result<Document, DocumentError>;
}

/// Reader backed by `lopdf`, laying out page text from glyph positions.
///
/// Text drawn in separate columns comes out separated by two or more spaces, with cells aligned
/// across lines, which is the shape the stream table extractor expects.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfReader;

impl LopdfReader {
    /// Construct a reader.
    pub const fn new() -> Self {
        Self
    }
}

impl DocumentReader for LopdfReader {
    fn read(&self, bytes: &[u8]) -> Result<Document, DocumentError> {
        let pdf = lopdf::Document::load_mem(bytes)
            .map_err(|error| DocumentError::Parse(error.to_string()))?;

        let mut pages = Vec::new();
        for (number, page_id) in pdf.get_pages() {
            let text = layout::page_text(&pdf, page_id)
                .map_err(|error| DocumentError::PageText {
                    page: number,
                    message: error.to_string(),
                })?;
            pages.push(Page { number, text });
        }

        tracing::debug!(pages = pages.len(), "Loaded PDF document");
        Ok(Document::new(pages))
    }
}
