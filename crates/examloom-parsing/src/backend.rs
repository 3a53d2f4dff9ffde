//! PDF text extraction backend trait.

use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("not a PDF file (missing %PDF header)")]
    NotAPdf,
    #[error("failed to open PDF: {0}")]
    Open(String),
    #[error("failed to extract text: {0}")]
    Extraction(String),
    #[error("document contains no extractable text")]
    EmptyText,
}

/// A PDF text extraction backend.
///
/// Implementations return the document's text in reading order with page
/// texts joined by newlines. Extraction is blocking; callers that care run
/// it on a blocking thread.
pub trait PdfBackend: Send + Sync {
    fn extract_text(&self, path: &Path) -> Result<String, ExtractError>;
}
