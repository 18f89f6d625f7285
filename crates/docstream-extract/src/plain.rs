//! Plain-text extraction with encoding detection

use crate::error::{ExtractError, ExtractResult};
use crate::Extractor;

/// Extractor for plain-text uploads
///
/// Accepts any text encoding `encoding_rs` can identify and converts to
/// UTF-8. Binary content is a permanent failure, not a retry candidate.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

impl Extractor for PlainTextExtractor {
    fn extract(&self, bytes: &[u8], _filename: &str) -> ExtractResult<String> {
        // NULL bytes mean binary, not text in an exotic encoding
        if bytes.contains(&0) {
            return Err(ExtractError::CorruptDocument(
                "file contains NULL bytes".to_string(),
            ));
        }

        // Fast path: already valid UTF-8
        if let Ok(text) = std::str::from_utf8(bytes) {
            return Ok(text.to_string());
        }

        let (encoding, _bom_length) =
            encoding_rs::Encoding::for_bom(bytes).unwrap_or((encoding_rs::UTF_8, 0));
        let (decoded, actual_encoding, malformed) = encoding.decode(bytes);

        if malformed {
            return Err(ExtractError::CorruptDocument(format!(
                "undecodable as {}",
                actual_encoding.name()
            )));
        }

        tracing::debug!(encoding = actual_encoding.name(), "converted upload to UTF-8");
        Ok(decoded.into_owned())
    }
}
