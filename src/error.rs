//! Error taxonomy for the analysis pipeline
//!
//! Every failure the core can produce is one of four kinds. All of them are
//! deterministic for a given upload, so the only recovery is a corrected file.

use serde::{Deserialize, Serialize};

/// Failure raised while ingesting or analysing an upload
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalysisError {
    /// Bytes are not valid base64/UTF-8/CSV, or a value is not a number
    #[error("Parse error: {0}")]
    Parse(String),

    /// Required columns or cells are missing
    #[error("Validation error: {0}")]
    Validation(String),

    /// A cell taking part in a test has too few observations
    #[error("Insufficient data: {cell} has {count} observation(s), at least {required} required")]
    InsufficientData {
        cell: String,
        count: usize,
        required: usize,
    },

    /// The test statistic could not be computed (zero variance, non-finite result)
    #[error("Computation error: {0}")]
    Computation(String),
}

impl AnalysisError {
    /// Stable machine-readable kind, used in JSON outcomes
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalysisError::Parse(_) => ErrorKind::Parse,
            AnalysisError::Validation(_) => ErrorKind::Validation,
            AnalysisError::InsufficientData { .. } => ErrorKind::InsufficientData,
            AnalysisError::Computation(_) => ErrorKind::Computation,
        }
    }

    pub(crate) fn insufficient(cell: impl Into<String>, count: usize, required: usize) -> Self {
        AnalysisError::InsufficientData {
            cell: cell.into(),
            count,
            required,
        }
    }
}

/// Discriminant of [`AnalysisError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Parse,
    Validation,
    InsufficientData,
    Computation,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Parse => write!(f, "parse"),
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::InsufficientData => write!(f, "insufficient_data"),
            ErrorKind::Computation => write!(f, "computation"),
        }
    }
}

pub type AnalysisResult<T> = std::result::Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_strings() {
        let err = AnalysisError::insufficient("g1/s1", 1, 2);
        assert_eq!(err.kind(), ErrorKind::InsufficientData);
        assert_eq!(err.kind().to_string(), "insufficient_data");
        assert_eq!(
            serde_json::to_string(&ErrorKind::Validation).unwrap(),
            "\"validation\""
        );
    }

    #[test]
    fn test_insufficient_message() {
        let err = AnalysisError::insufficient("g1/s1", 1, 2);
        assert_eq!(
            err.to_string(),
            "Insufficient data: g1/s1 has 1 observation(s), at least 2 required"
        );
    }
}
