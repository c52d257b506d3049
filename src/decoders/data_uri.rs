//! Browser data URIs: `data:text/csv;base64,<payload>`.
//!
//! This is what a file `<input>` read with `FileReader.readAsDataURL` produces.
//! Non-base64 data URIs carry percent-encoded text, which is decoded too.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use super::{utf8_text, UploadDecoder};
use crate::error::{AnalysisError, AnalysisResult};

pub struct DataUriDecoder;

impl UploadDecoder for DataUriDecoder {
    fn format_name(&self) -> &str {
        "data-uri"
    }

    fn can_decode(&self, bytes: &[u8]) -> bool {
        let trimmed = trim_ascii_start(bytes);
        trimmed.len() >= 5 && trimmed[..5].eq_ignore_ascii_case(b"data:")
    }

    fn decode(&self, bytes: &[u8]) -> AnalysisResult<String> {
        let text = utf8_text(trim_ascii_start(bytes))?;
        let (header, payload) = text
            .split_once(',')
            .ok_or_else(|| AnalysisError::Parse("Malformed data URI: missing ','".to_string()))?;

        if header.to_ascii_lowercase().ends_with(";base64") {
            // Browsers never wrap, but pasted payloads often do
            let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
            let decoded = STANDARD
                .decode(compact.as_bytes())
                .map_err(|e| AnalysisError::Parse(format!("Invalid base64 payload: {}", e)))?;
            utf8_text(&decoded)
        } else {
            percent_decode(payload)
        }
    }
}

fn trim_ascii_start(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
    &bytes[start..]
}

/// Decode `%XX` escapes; the result must be UTF-8
pub(crate) fn percent_decode(payload: &str) -> AnalysisResult<String> {
    let raw = payload.as_bytes();
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'%' {
            let hex = raw
                .get(i + 1..i + 3)
                .and_then(|h| std::str::from_utf8(h).ok())
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| AnalysisError::Parse(format!("Invalid percent escape at offset {}", i)))?;
            out.push(hex);
            i += 3;
        } else {
            out.push(raw[i]);
            i += 1;
        }
    }
    utf8_text(&out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_decode() {
        assert!(DataUriDecoder.can_decode(b"data:text/csv;base64,AAAA"));
        assert!(DataUriDecoder.can_decode(b"  DATA:text/csv,a"));
        assert!(!DataUriDecoder.can_decode(b"group,value"));
    }

    #[test]
    fn test_bad_base64() {
        let err = DataUriDecoder.decode(b"data:text/csv;base64,@@@").unwrap_err();
        assert!(matches!(err, AnalysisError::Parse(_)));
    }

    #[test]
    fn test_missing_comma() {
        assert!(DataUriDecoder.decode(b"data:text/csv;base64").is_err());
    }

    #[test]
    fn test_percent_encoded() {
        let text = DataUriDecoder.decode(b"data:text/csv,group%2Cvalue%0Aa%2C1").unwrap();
        assert_eq!(text, "group,value\na,1");
    }
}
