//! Upload-to-report pipeline
//!
//! `analyze_upload` runs ingest, comparison and chart building for one upload
//! with a configuration owned by the caller. It has no side effects besides
//! logging, so the CLI and every HTTP request share it unchanged.

use serde::{Deserialize, Serialize};

use crate::chart::build_chart;
use crate::compare::compare_groups;
use crate::config::Config;
use crate::error::{AnalysisError, AnalysisResult, ErrorKind};
use crate::ingest::ingest;
use crate::output::{AnalysisReport, DatasetOverview};

/// Analyse raw upload bytes (CSV text or a data URI)
pub fn analyze_upload(bytes: &[u8], config: &Config) -> AnalysisResult<AnalysisReport> {
    config
        .validate()
        .map_err(|e| AnalysisError::Validation(format!("Invalid configuration: {:#}", e)))?;

    let dataset = ingest(bytes, &config.columns)?;
    log::info!(
        "Loaded {} observations in {} groups{}",
        dataset.len(),
        dataset.groups().len(),
        if dataset.has_subgroup { " with subgroups" } else { "" }
    );

    let comparison = compare_groups(&dataset, &config.analysis)?;
    let chart = build_chart(
        &comparison.summary,
        &comparison.comparisons,
        &comparison.letters,
        &config.chart,
    );
    let overview = DatasetOverview::of(&dataset, &config.columns);

    Ok(AnalysisReport::new(comparison, chart, &config.analysis, overview))
}

/// Serializable result of one analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Ok { report: Box<AnalysisReport> },
    Error { kind: ErrorKind, message: String },
}

impl AnalysisOutcome {
    pub fn from_result(result: AnalysisResult<AnalysisReport>) -> Self {
        match result {
            Ok(report) => AnalysisOutcome::Ok { report: Box::new(report) },
            Err(e) => AnalysisOutcome::from_error(&e),
        }
    }

    pub fn from_error(error: &AnalysisError) -> Self {
        AnalysisOutcome::Error {
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, AnalysisOutcome::Ok { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Method;

    const SCENARIO: &str = "group,subgroup,value\ng1,s1,10\ng1,s1,12\ng1,s2,30\ng1,s2,32\n";

    #[test]
    fn test_scenario() {
        let report = analyze_upload(SCENARIO.as_bytes(), &Config::default()).unwrap();
        assert_eq!(report.summary.len(), 2);
        assert_eq!(report.summary[0].mean, 11.0);
        assert_eq!(report.summary[1].mean, 31.0);
        assert_eq!(report.comparisons.len(), 1);

        let row = &report.comparisons[0];
        assert_eq!(row.group.as_deref(), Some("g1"));
        assert_eq!((row.subgroup1.as_str(), row.subgroup2.as_str()), ("s1", "s2"));
        assert!(row.p_value_corrected < 0.05);
        assert_eq!(row.significance, "a");

        assert_eq!(report.chart.series.len(), 2);
        assert_eq!(report.chart.annotations.len(), 1);
        assert_eq!(report.chart.annotations[0].text, "a");
    }

    #[test]
    fn test_missing_value_column() {
        let csv = "group,subgroup\ng1,s1\n";
        let err = analyze_upload(csv.as_bytes(), &Config::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("value"));
    }

    #[test]
    fn test_single_observation() {
        let csv = "group,subgroup,value\ng1,s1,10\ng1,s1,12\ng1,s2,30\n";
        let err = analyze_upload(csv.as_bytes(), &Config::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientData);
    }

    #[test]
    fn test_labels_restart_per_call() {
        let config = Config::default();
        let first = analyze_upload(SCENARIO.as_bytes(), &config).unwrap();
        let second = analyze_upload(SCENARIO.as_bytes(), &config).unwrap();
        assert_eq!(first.comparisons, second.comparisons);
        assert_eq!(second.comparisons[0].significance, "a");
    }

    #[test]
    fn test_anova_tukey() {
        let csv = "group,value\nA,20\nA,22\nA,24\nB,30\nB,32\nB,34\nC,40\nC,42\nC,44\n";
        let mut config = Config::default();
        config.columns.subgroup = None;
        config.analysis.method = Method::AnovaTukey;

        let report = analyze_upload(csv.as_bytes(), &config).unwrap();
        assert_eq!(report.anova.len(), 1);
        assert_eq!(report.comparisons.len(), 3);
        assert_eq!(report.letters.len(), 3);
        assert!(report.comparison_columns.iter().any(|c| c.id == "ci_lower"));
    }

    #[test]
    fn test_invalid_config_is_validation_error() {
        let mut config = Config::default();
        config.chart.palette.clear();
        let err = analyze_upload(SCENARIO.as_bytes(), &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("palette"));

        let mut config = Config::default();
        config.columns.delimiter = '\u{12d}';
        let csv = "group\u{12d}subgroup\u{12d}value\ng1\u{12d}s1\u{12d}1\n";
        let err = analyze_upload(csv.as_bytes(), &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_outcome_json() {
        let ok = AnalysisOutcome::from_result(analyze_upload(SCENARIO.as_bytes(), &Config::default()));
        assert!(ok.is_ok());
        let value = serde_json::to_value(&ok).unwrap();
        assert_eq!(value["status"], "ok");
        assert_eq!(value["report"]["comparisons"][0]["significance"], "a");

        let err = AnalysisOutcome::from_result(analyze_upload(b"group,value\n", &Config::default()));
        assert!(!err.is_ok());
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["kind"], "validation");
        assert!(value["message"].as_str().unwrap().starts_with("Validation error"));
    }
}
