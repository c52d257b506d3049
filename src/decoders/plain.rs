//! Raw CSV bytes, as sent by `curl --data-binary @file.csv` or read from disk.

use super::{utf8_text, UploadDecoder};
use crate::error::AnalysisResult;

pub struct PlainTextDecoder;

impl UploadDecoder for PlainTextDecoder {
    fn format_name(&self) -> &str {
        "plain"
    }

    fn can_decode(&self, _bytes: &[u8]) -> bool {
        true
    }

    fn decode(&self, bytes: &[u8]) -> AnalysisResult<String> {
        utf8_text(bytes)
    }
}
