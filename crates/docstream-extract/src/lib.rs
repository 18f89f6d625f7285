//! Text extraction capability for docstream
//!
//! Concrete parsers live behind the [`Extractor`] trait; the pipeline only
//! sees UTF-8 text or a transient/permanent error classification. Format
//! selection uses the file suffix with a content sniff as fallback.

pub mod error;
pub mod pdf;
pub mod plain;

pub use error::{ExtractError, ExtractResult};
pub use pdf::PdfExtractor;
pub use plain::PlainTextExtractor;

/// Capability turning raw upload bytes into a UTF-8 text stream
///
/// Implementations are synchronous and CPU-bound; the extract worker runs
/// them on the blocking pool.
pub trait Extractor: Send + Sync {
    /// Extract text from the raw bytes of `filename`
    ///
    /// # Errors
    ///
    /// Returns a transient error for decoder I/O failures and a permanent
    /// one for corrupt or unsupported content.
    fn extract(&self, bytes: &[u8], filename: &str) -> ExtractResult<String>;
}

/// Detected upload format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentKind {
    Pdf,
    PlainText,
}

impl DocumentKind {
    /// Select by file suffix, falling back to a magic-byte sniff
    fn detect(filename: &str, bytes: &[u8]) -> Self {
        let suffix = filename.rsplit('.').next().unwrap_or("");
        if suffix.eq_ignore_ascii_case("pdf") || bytes.starts_with(b"%PDF-") {
            Self::Pdf
        } else {
            Self::PlainText
        }
    }
}

/// Default extractor: dispatches to the PDF or plain-text parser
#[derive(Debug, Default, Clone, Copy)]
pub struct FormatDispatchExtractor {
    pdf: PdfExtractor,
    plain: PlainTextExtractor,
}

impl FormatDispatchExtractor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Extractor for FormatDispatchExtractor {
    fn extract(&self, bytes: &[u8], filename: &str) -> ExtractResult<String> {
        match DocumentKind::detect(filename, bytes) {
            DocumentKind::Pdf => self.pdf.extract(bytes, filename),
            DocumentKind::PlainText => self.plain.extract(bytes, filename),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn suffix_selects_pdf() {
        assert_eq!(DocumentKind::detect("report.PDF", b"x"), DocumentKind::Pdf);
        assert_eq!(
            DocumentKind::detect("notes.txt", b"hello"),
            DocumentKind::PlainText
        );
    }

    #[test]
    fn content_sniff_catches_mislabeled_pdf() {
        assert_eq!(
            DocumentKind::detect("data.txt", b"%PDF-1.7 ..."),
            DocumentKind::Pdf
        );
    }

    #[test]
    fn dispatch_extracts_plain_text() {
        let extractor = FormatDispatchExtractor::new();
        let text = extractor.extract(b"some words here", "a.txt").unwrap();
        assert_eq!(text, "some words here");
    }
}
