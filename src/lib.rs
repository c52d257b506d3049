//! sigdash: group/subgroup significance dashboard
//!
//! Turns an uploaded CSV of `group`, `subgroup`, `value` rows into summary
//! statistics, pairwise significance tests with letter labels, and a chart
//! description. The same pipeline backs the command line and the web server.

pub mod chart;
pub mod compare;
pub mod config;
pub mod dataset;
pub mod decoders;
pub mod error;
pub mod ingest;
pub mod labels;
pub mod output;
pub mod pipeline;
#[cfg(feature = "serve")]
pub mod serve;
pub mod stats;
pub mod svg;

pub use config::Config;
pub use error::{AnalysisError, AnalysisResult, ErrorKind};
pub use output::AnalysisReport;
pub use pipeline::{analyze_upload, AnalysisOutcome};
