//! Report generation and output

use crate::chart::ChartSpec;
use crate::compare::{AnovaTable, Comparison, ComparisonRow, SummaryRow};
use crate::config::{AnalysisOptions, ColumnConfig};
use crate::dataset::Dataset;
use crate::labels::LetterAssignment;
use crate::svg;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Column descriptor for a display table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableColumn {
    pub name: String,
    pub id: String,
}

impl TableColumn {
    fn new(id: &str) -> Self {
        TableColumn {
            name: id.to_string(),
            id: id.to_string(),
        }
    }
}

/// Shape of the uploaded data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetOverview {
    /// Number of observations
    pub rows: usize,
    pub groups: usize,
    /// Number of (group, subgroup) cells
    pub cells: usize,
    pub has_subgroup: bool,
    pub columns: ColumnConfig,
}

impl DatasetOverview {
    pub fn of(dataset: &Dataset, columns: &ColumnConfig) -> Self {
        DatasetOverview {
            rows: dataset.len(),
            groups: dataset.groups().len(),
            cells: dataset.cells().len(),
            has_subgroup: dataset.has_subgroup,
            columns: columns.clone(),
        }
    }
}

/// Complete analysis report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Version of the tool
    pub version: String,
    /// RFC 3339 generation time
    pub generated_at: String,
    pub options: AnalysisOptions,
    pub dataset: DatasetOverview,
    pub summary: Vec<SummaryRow>,
    pub comparisons: Vec<ComparisonRow>,
    #[serde(default)]
    pub anova: Vec<AnovaTable>,
    #[serde(default)]
    pub letters: Vec<LetterAssignment>,
    pub summary_columns: Vec<TableColumn>,
    pub comparison_columns: Vec<TableColumn>,
    pub chart: ChartSpec,
}

impl AnalysisReport {
    pub fn new(comparison: Comparison, chart: ChartSpec, options: &AnalysisOptions, dataset: DatasetOverview) -> Self {
        let summary_columns = ["group", "subgroup", "count", "mean", "std", "min", "q1", "median", "q3", "max"]
            .iter()
            .filter(|c| dataset.has_subgroup || **c != "subgroup")
            .map(|c| TableColumn::new(c))
            .collect();

        let mut comparison_ids = Vec::new();
        if dataset.has_subgroup {
            comparison_ids.push("group");
        }
        comparison_ids.extend([
            "subgroup1",
            "subgroup2",
            "mean_diff",
            "statistic",
            "p_value",
            "p_value_corrected",
            "significant",
            "significance",
        ]);
        if !comparison.anova.is_empty() {
            comparison_ids.extend(["ci_lower", "ci_upper"]);
        }

        AnalysisReport {
            version: env!("CARGO_PKG_VERSION").to_string(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            options: options.clone(),
            dataset,
            summary: comparison.summary,
            comparisons: comparison.comparisons,
            anova: comparison.anova,
            letters: comparison.letters,
            summary_columns,
            comparison_columns: comparison_ids.into_iter().map(TableColumn::new).collect(),
            chart,
        }
    }

    /// Number of significant comparisons
    pub fn significant_count(&self) -> usize {
        self.comparisons.iter().filter(|c| c.significant).count()
    }

    /// Save report to JSON file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json).with_context(|| format!("Failed to write {}", path.as_ref().display()))?;
        Ok(())
    }

    /// Save report to compact JSON (no pretty print)
    pub fn save_compact<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path.as_ref(), json).with_context(|| format!("Failed to write {}", path.as_ref().display()))?;
        Ok(())
    }

    /// Save report to gzipped JSON file
    pub fn save_gzip<P: AsRef<Path>>(&self, path: P, compact: bool) -> Result<()> {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let file = File::create(path.as_ref()).with_context(|| format!("Failed to create {}", path.as_ref().display()))?;
        let mut encoder = GzEncoder::new(file, Compression::default());

        let json = if compact {
            serde_json::to_string(self)?
        } else {
            serde_json::to_string_pretty(self)?
        };

        encoder.write_all(json.as_bytes())?;
        encoder.finish()?;
        Ok(())
    }
}

/// Write report to file (format determined by extension)
pub fn write_report(report: &AnalysisReport, path: &Path) -> Result<()> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match ext {
        "tsv" | "txt" => write_tsv(report, path),
        "html" | "htm" => write_html(report, path),
        _ => report.save(path),
    }
}

/// Write the chart as a standalone SVG file
pub fn write_svg(report: &AnalysisReport, path: &Path) -> Result<()> {
    std::fs::write(path, svg::render(&report.chart)).with_context(|| format!("Failed to write {}", path.display()))
}

fn write_tsv(report: &AnalysisReport, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    writeln!(writer, "# Summary")?;
    writeln!(writer, "group\tsubgroup\tcount\tmean\tstd\tmin\tq1\tmedian\tq3\tmax")?;
    for row in &report.summary {
        writeln!(
            writer,
            "{}\t{}\t{}\t{:.4}\t{}\t{:.4}\t{:.4}\t{:.4}\t{:.4}\t{:.4}",
            row.group,
            row.subgroup.as_deref().unwrap_or("-"),
            row.count,
            row.mean,
            number_or_dash(row.std),
            row.min,
            row.q1,
            row.median,
            row.q3,
            row.max,
        )?;
    }

    writeln!(writer)?;
    writeln!(writer, "# Comparisons")?;
    writeln!(
        writer,
        "group\tsubgroup1\tsubgroup2\tmean_diff\tstatistic\tp_value\tp_value_corrected\tsignificant\tsignificance"
    )?;
    for c in &report.comparisons {
        writeln!(
            writer,
            "{}\t{}\t{}\t{:.4}\t{:.4}\t{:.6}\t{:.6}\t{}\t{}",
            c.group.as_deref().unwrap_or("-"),
            c.subgroup1,
            c.subgroup2,
            c.mean_diff,
            c.statistic,
            c.p_value,
            c.p_value_corrected,
            c.significant,
            c.significance,
        )?;
    }

    if !report.anova.is_empty() {
        writeln!(writer)?;
        writeln!(writer, "# ANOVA")?;
        writeln!(writer, "family\tdf_between\tdf_within\tf_statistic\tp_value")?;
        for table in &report.anova {
            writeln!(
                writer,
                "{}\t{}\t{}\t{:.4}\t{:.6}",
                table.family.as_deref().unwrap_or("-"),
                table.anova.df_between,
                table.anova.df_within,
                table.anova.f_statistic,
                table.anova.p_value,
            )?;
        }
    }

    Ok(())
}

fn number_or_dash(v: f64) -> String {
    if v.is_finite() {
        format!("{:.4}", v)
    } else {
        "-".to_string()
    }
}

fn write_html(report: &AnalysisReport, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    write!(
        writer,
        r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>sigdash Report</title>
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; background: #f8f9fa; color: #212529; padding: 20px; }}
        .container {{ max-width: 1200px; margin: 0 auto; }}
        h1 {{ color: #2c3e50; margin-bottom: 4px; }}
        h2 {{ color: #34495e; margin: 24px 0 12px; border-bottom: 2px solid #dee2e6; padding-bottom: 5px; }}
        .subtitle {{ color: #6c757d; margin-bottom: 20px; }}
        .chart-container {{ background: #fff; border-radius: 8px; padding: 20px; box-shadow: 0 2px 4px rgba(0,0,0,0.1); overflow-x: auto; }}
        table {{ width: 100%; border-collapse: collapse; background: #fff; box-shadow: 0 2px 4px rgba(0,0,0,0.1); }}
        th, td {{ padding: 8px 12px; text-align: left; border-bottom: 1px solid #dee2e6; font-size: 0.9rem; }}
        th {{ background: #f1f3f4; }}
        .sig {{ font-weight: bold; color: #155724; }}
        footer {{ text-align: center; color: #6c757d; margin-top: 40px; }}
    </style>
</head>
<body>
<div class="container">
    <h1>sigdash Report</h1>
    <div class="subtitle">{} observations, {} groups, method {}, alpha {}. Generated {}</div>
    <h2>Chart</h2>
    <div class="chart-container">
{}
    </div>
"##,
        report.dataset.rows,
        report.dataset.groups,
        report.options.method,
        report.options.alpha,
        svg::escape(&report.generated_at),
        svg::render(&report.chart),
    )?;

    writeln!(writer, "    <h2>Summary</h2>")?;
    writeln!(writer, "    <table>")?;
    write_header_row(&mut writer, &report.summary_columns)?;
    for row in &report.summary {
        let cells = serde_json::to_value(row)?;
        write_value_row(&mut writer, &report.summary_columns, &cells, false)?;
    }
    writeln!(writer, "    </table>")?;

    writeln!(writer, "    <h2>Comparisons</h2>")?;
    if report.comparisons.is_empty() {
        writeln!(writer, "    <p>No groups with two or more members to compare.</p>")?;
    } else {
        writeln!(writer, "    <table>")?;
        write_header_row(&mut writer, &report.comparison_columns)?;
        for row in &report.comparisons {
            let cells = serde_json::to_value(row)?;
            write_value_row(&mut writer, &report.comparison_columns, &cells, row.significant)?;
        }
        writeln!(writer, "    </table>")?;
    }

    writeln!(
        writer,
        "    <footer>sigdash v{}</footer>\n</div>\n</body>\n</html>",
        svg::escape(&report.version)
    )?;
    Ok(())
}

fn write_header_row<W: Write>(writer: &mut W, columns: &[TableColumn]) -> Result<()> {
    write!(writer, "        <tr>")?;
    for column in columns {
        write!(writer, "<th>{}</th>", svg::escape(&column.name))?;
    }
    writeln!(writer, "</tr>")?;
    Ok(())
}

fn write_value_row<W: Write>(
    writer: &mut W,
    columns: &[TableColumn],
    row: &serde_json::Value,
    significant: bool,
) -> Result<()> {
    write!(writer, "        <tr{}>", if significant { " class=\"sig\"" } else { "" })?;
    for column in columns {
        write!(writer, "<td>{}</td>", svg::escape(&display_cell(row.get(&column.id))))?;
    }
    writeln!(writer, "</tr>")?;
    Ok(())
}

fn display_cell(value: Option<&serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::Number(n)) => match (n.as_u64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) => format!("{:.4}", f),
            _ => n.to_string(),
        },
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Bool(b)) => b.to_string(),
        _ => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::build_chart;
    use crate::compare::compare_groups;
    use crate::config::ChartOptions;
    use crate::dataset::Observation;
    use std::io::Read;

    fn report() -> AnalysisReport {
        let dataset = Dataset::new(
            vec![
                Observation::nested("g1", "s1", 10.0),
                Observation::nested("g1", "s1", 12.0),
                Observation::nested("g1", "s2", 30.0),
                Observation::nested("g1", "s2", 32.0),
            ],
            true,
        );
        let options = AnalysisOptions::default();
        let comparison = compare_groups(&dataset, &options).unwrap();
        let chart = build_chart(
            &comparison.summary,
            &comparison.comparisons,
            &comparison.letters,
            &ChartOptions::default(),
        );
        let overview = DatasetOverview::of(&dataset, &ColumnConfig::default());
        AnalysisReport::new(comparison, chart, &options, overview)
    }

    #[test]
    fn test_report_columns() {
        let report = report();
        assert_eq!(report.summary_columns.len(), 10);
        assert_eq!(report.summary_columns[1].id, "subgroup");
        assert_eq!(report.comparison_columns[0].id, "group");
        assert!(!report.comparison_columns.iter().any(|c| c.id == "ci_lower"));
        assert_eq!(report.dataset.rows, 4);
        assert_eq!(report.dataset.cells, 2);
        assert_eq!(report.significant_count(), 1);
    }

    #[test]
    fn test_json_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let report = report();
        write_report(&report, &path).unwrap();

        let loaded: AnalysisReport = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.summary, report.summary);
        assert_eq!(loaded.comparisons, report.comparisons);
        assert_eq!(loaded.chart, report.chart);
    }

    #[test]
    fn test_undefined_std_roundtrip() {
        let dataset = Dataset::new(
            vec![
                Observation::nested("g1", "s1", 10.0),
                Observation::nested("g1", "s1", 12.0),
                Observation::nested("g1", "s2", 30.0),
                Observation::nested("g1", "s2", 32.0),
                Observation::nested("g2", "s1", 5.0),
            ],
            true,
        );
        let options = AnalysisOptions::default();
        let comparison = compare_groups(&dataset, &options).unwrap();
        let chart = build_chart(&comparison.summary, &comparison.comparisons, &[], &ChartOptions::default());
        let overview = DatasetOverview::of(&dataset, &ColumnConfig::default());
        let report = AnalysisReport::new(comparison, chart, &options, overview);
        assert!(report.summary[2].std.is_nan());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        report.save(&path).unwrap();

        let json = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value["summary"][2]["std"].is_null());

        let loaded: AnalysisReport = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.summary.len(), 3);
        assert!(loaded.summary[2].std.is_nan());
        assert_eq!(loaded.summary[2].count, 1);
        assert_eq!(loaded.summary[0], report.summary[0]);
    }

    #[test]
    fn test_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json.gz");
        report().save_gzip(&path, true).unwrap();

        let file = File::open(&path).unwrap();
        let mut json = String::new();
        flate2::read::GzDecoder::new(file).read_to_string(&mut json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["comparisons"][0]["significance"], "a");
    }

    #[test]
    fn test_tsv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.tsv");
        write_report(&report(), &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("g1\ts1\t2\t11.0000\t1.4142"));
        assert!(text.contains("g1\ts1\ts2\t20.0000"));
        assert!(!text.contains("# ANOVA"));
    }

    #[test]
    fn test_html_embeds_chart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.html");
        write_report(&report(), &path).unwrap();

        let html = std::fs::read_to_string(&path).unwrap();
        assert!(html.contains("<svg"));
        assert!(html.contains("<th>p_value_corrected</th>"));
        assert!(html.contains("<tr class=\"sig\">"));
    }

    #[test]
    fn test_display_cell() {
        assert_eq!(display_cell(Some(&serde_json::json!(3))), "3");
        assert_eq!(display_cell(Some(&serde_json::json!(0.5))), "0.5000");
        assert_eq!(display_cell(Some(&serde_json::Value::Null)), "-");
        assert_eq!(display_cell(None), "-");
    }
}
