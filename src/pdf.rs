//! Per-page PDF text extraction
//!
//! Pages are read in document order and tagged with their 0-based index so
//! retrieval results can point back to the page they came from. Pages that
//! yield no text (scans, pure graphics) are skipped.

use crate::error::RetrievalError;
use std::path::Path;
use tracing::{debug, warn};

/// Extracted text of a single PDF page
#[derive(Debug, Clone)]
pub struct PdfPage {
    /// 0-based page index
    pub index: usize,
    pub text: String,
}

/// Extract the text of every page of the PDF at `path`.
///
/// Returns an error when the document cannot be opened at all; extraction
/// failures of individual pages are logged and the page is skipped.
pub fn read_pdf_pages(path: &Path) -> Result<Vec<PdfPage>, RetrievalError> {
    let document = lopdf::Document::load(path).map_err(|e| RetrievalError::Pdf {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let mut pages = Vec::new();
    for (index, page_number) in document.get_pages().keys().enumerate() {
        match document.extract_text(&[*page_number]) {
            Ok(text) if !text.trim().is_empty() => {
                pages.push(PdfPage { index, text });
            }
            Ok(_) => {
                debug!(path = %path.display(), page = index, "page has no extractable text");
            }
            Err(e) => {
                warn!(path = %path.display(), page = index, error = %e, "failed to extract page text");
            }
        }
    }

    debug!(path = %path.display(), pages = pages.len(), "extracted PDF pages");
    Ok(pages)
}
