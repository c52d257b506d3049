//! Upload decoders.
//!
//! An upload arrives either as the raw bytes of a CSV file or as a browser
//! `data:` URI whose payload is base64. Each format has one [`UploadDecoder`];
//! [`decode_upload()`] picks the first one whose [`UploadDecoder::can_decode`]
//! accepts the bytes and returns the CSV text.

mod data_uri;
mod plain;

pub use data_uri::DataUriDecoder;
pub(crate) use data_uri::percent_decode;
pub use plain::PlainTextDecoder;

use crate::error::{AnalysisError, AnalysisResult};

/// Trait for turning uploaded bytes into CSV text.
///
/// # Example
/// ```ignore
/// pub struct GzipDecoder;
///
/// impl UploadDecoder for GzipDecoder {
///     fn format_name(&self) -> &str { "gzip" }
///     fn can_decode(&self, bytes: &[u8]) -> bool { bytes.starts_with(&[0x1f, 0x8b]) }
///     fn decode(&self, bytes: &[u8]) -> AnalysisResult<String> { /* ... */ }
/// }
/// ```
pub trait UploadDecoder {
    /// Human-readable name of the format (e.g., "data-uri")
    fn format_name(&self) -> &str;

    /// Check if this decoder handles the given bytes (peek at the prefix).
    fn can_decode(&self, bytes: &[u8]) -> bool;

    /// Decode the upload into UTF-8 text.
    fn decode(&self, bytes: &[u8]) -> AnalysisResult<String>;
}

/// Registered decoders, most specific first.
fn all_decoders() -> Vec<Box<dyn UploadDecoder>> {
    vec![Box::new(DataUriDecoder), Box::new(PlainTextDecoder)]
}

/// Try all registered decoders and return the text of the first match.
pub fn decode_upload(bytes: &[u8]) -> AnalysisResult<String> {
    for decoder in all_decoders() {
        if decoder.can_decode(bytes) {
            log::debug!("Detected upload format: {}", decoder.format_name());
            return decoder.decode(bytes);
        }
    }
    Err(AnalysisError::Parse("Unrecognised upload format".to_string()))
}

/// Interpret bytes as UTF-8, dropping a leading byte-order mark.
pub(crate) fn utf8_text(bytes: &[u8]) -> AnalysisResult<String> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8(bytes.to_vec()).map_err(|e| {
        AnalysisError::Parse(format!(
            "Upload is not valid UTF-8 text (invalid byte at offset {})",
            e.utf8_error().valid_up_to()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_plain() {
        let text = decode_upload(b"group,value\na,1\n").unwrap();
        assert_eq!(text, "group,value\na,1\n");
    }

    #[test]
    fn test_decode_data_uri() {
        // "group,value\na,1\n"
        let upload = b"data:text/csv;base64,Z3JvdXAsdmFsdWUKYSwxCg==";
        let text = decode_upload(upload).unwrap();
        assert_eq!(text, "group,value\na,1\n");
    }

    #[test]
    fn test_bom_is_stripped() {
        let text = decode_upload(b"\xEF\xBB\xBFgroup,value\n").unwrap();
        assert!(text.starts_with("group"));
    }

    #[test]
    fn test_invalid_utf8() {
        let err = decode_upload(b"group,value\n\xff\xfe,1\n").unwrap_err();
        assert!(matches!(err, AnalysisError::Parse(_)));
    }
}
