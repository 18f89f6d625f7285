//! PDF text extraction

use crate::error::{ExtractError, ExtractResult};
use crate::Extractor;

/// Extractor for PDF uploads, backed by `pdf-extract`
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

impl Extractor for PdfExtractor {
    fn extract(&self, bytes: &[u8], filename: &str) -> ExtractResult<String> {
        // A PDF that fails to parse is corrupt; it will fail identically on
        // every retry.
        pdf_extract::extract_text_from_mem(bytes).map_err(|e| {
            ExtractError::CorruptDocument(format!("cannot extract text from {filename}: {e}"))
        })
    }
}
