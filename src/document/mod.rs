//! Paginated documents and the page locator for the Profit & Loss section.

mod layout;
pub mod locator;
pub mod reader;

pub use locator::{StatementMarkers, load_and_locate, locate_statement_page};
pub use reader::{DocumentReader, LopdfReader};

use thiserror::Error;

/// Errors raised while loading a document or reading its pages.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The bytes could not be parsed as a PDF.
    #[error("Failed to parse PDF: {0}")]
    Parse(String),
    /// Text extraction failed for a specific page.
    #[error("Failed to extract text from page {page}: {message}")]
    PageText {
        /// 1-based page number.
        page: u32,
        /// Message reported by the PDF engine.
        message: String,
    },
}

/// One page of a document with its extracted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number.
    pub number: u32,
    /// Text extracted by the layout engine.
    pub text: String,
}

/// An ordered, read-only sequence of pages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pages: Vec<Page>,
}

impl Document {
    /// Build a document from pages already in reading order.
    pub fn new(pages: Vec<Page>) -> Self {
        Self { pages }
    }

    /// Build a document from page texts, numbering pages from 1.
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pages = texts
            .into_iter()
            .zip(1u32..)
            .map(|(text, number)| Page {
                number,
                text: text.into(),
            })
            .collect();
        Self { pages }
    }

    /// Pages in reading order.
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// Look up a page by its 1-based number.
    pub fn page(&self, number: u32) -> Option<&Page> {
        self.pages.iter().find(|page| page.number == number)
    }

    /// Number of pages.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Returns true when the document has no pages.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}
