//! Configuration parsing for sigdash
//!
//! Column names, test settings, chart styling and server options are read from
//! an optional YAML file. Anything not given falls back to the defaults of the
//! group/subgroup/value dashboard.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Column layout of uploaded CSV files
    #[serde(default)]
    pub columns: ColumnConfig,

    /// Significance testing settings
    #[serde(default)]
    pub analysis: AnalysisOptions,

    /// Chart styling
    #[serde(default)]
    pub chart: ChartOptions,

    /// HTTP server settings
    #[serde(default)]
    pub server: ServerOptions,
}

/// Which CSV columns hold the group, subgroup and value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnConfig {
    #[serde(default = "default_group_column")]
    pub group: String,

    /// Subgroup column. `None` selects single-factor analysis.
    #[serde(default = "default_subgroup_column")]
    pub subgroup: Option<String>,

    #[serde(default = "default_value_column")]
    pub value: String,

    /// Field delimiter
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// Reject columns other than the configured ones
    #[serde(default)]
    pub strict: bool,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        ColumnConfig {
            group: default_group_column(),
            subgroup: default_subgroup_column(),
            value: default_value_column(),
            delimiter: default_delimiter(),
            strict: false,
        }
    }
}

/// Test family used for pairwise comparisons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Method {
    /// Two-sample t-tests with a multiple-comparison correction
    #[default]
    PairwiseT,
    /// One-way ANOVA followed by Tukey's HSD
    AnovaTukey,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::PairwiseT => write!(f, "pairwise-t"),
            Method::AnovaTukey => write!(f, "anova-tukey"),
        }
    }
}

/// Multiple-comparison correction applied within each comparison family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Correction {
    #[default]
    Bonferroni,
    Holm,
    None,
}

impl std::fmt::Display for Correction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Correction::Bonferroni => write!(f, "bonferroni"),
            Correction::Holm => write!(f, "holm"),
            Correction::None => write!(f, "none"),
        }
    }
}

/// Significance testing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOptions {
    #[serde(default)]
    pub method: Method,

    /// Significance level
    #[serde(default = "default_alpha")]
    pub alpha: f64,

    /// Ignored by `anova-tukey`, which controls the family-wise rate itself
    #[serde(default)]
    pub correction: Correction,

    /// Pooled-variance Student test when true, Welch test otherwise
    #[serde(default = "default_true")]
    pub equal_variance: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        AnalysisOptions {
            method: Method::default(),
            alpha: default_alpha(),
            correction: Correction::default(),
            equal_variance: true,
        }
    }
}

/// Chart drawing style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    #[default]
    Bar,
    Box,
}

/// Chart styling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartOptions {
    #[serde(default)]
    pub kind: ChartKind,

    #[serde(default = "default_title")]
    pub title: String,

    #[serde(default = "default_x_axis_title")]
    pub x_axis_title: String,

    #[serde(default = "default_y_axis_title")]
    pub y_axis_title: String,

    #[serde(default = "default_legend_title")]
    pub legend_title: String,

    /// Bar colors, cycled
    #[serde(default = "default_palette")]
    pub palette: Vec<String>,
}

impl Default for ChartOptions {
    fn default() -> Self {
        ChartOptions {
            kind: ChartKind::default(),
            title: default_title(),
            x_axis_title: default_x_axis_title(),
            y_axis_title: default_y_axis_title(),
            legend_title: default_legend_title(),
            palette: default_palette(),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerOptions {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Uploads larger than this are refused with 413
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        ServerOptions {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_group_column() -> String {
    "group".to_string()
}

fn default_subgroup_column() -> Option<String> {
    Some("subgroup".to_string())
}

fn default_value_column() -> String {
    "value".to_string()
}

fn default_delimiter() -> char {
    ','
}

fn default_alpha() -> f64 {
    0.05
}

fn default_true() -> bool {
    true
}

fn default_title() -> String {
    "Group and Subgroup Mean Values with Significance Labels".to_string()
}

fn default_x_axis_title() -> String {
    "Groups".to_string()
}

fn default_y_axis_title() -> String {
    "Mean Value".to_string()
}

fn default_legend_title() -> String {
    "Groups and Subgroups".to_string()
}

fn default_palette() -> Vec<String> {
    vec!["#4d4d4d".to_string(), "#7f7f7f".to_string(), "#a6a6a6".to_string()]
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_upload_bytes() -> usize {
    16 * 1024 * 1024
}

impl Config {
    /// Load configuration from YAML file
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let cols = &self.columns;
        if cols.group.trim().is_empty() || cols.value.trim().is_empty() {
            anyhow::bail!("Group and value column names must not be empty");
        }
        if cols.group == cols.value {
            anyhow::bail!("Group and value columns must differ (both are '{}')", cols.group);
        }
        if let Some(subgroup) = &cols.subgroup {
            if subgroup.trim().is_empty() {
                anyhow::bail!("Subgroup column name must not be empty (omit it for single-factor analysis)");
            }
            if subgroup == &cols.group || subgroup == &cols.value {
                anyhow::bail!("Subgroup column '{}' collides with another column", subgroup);
            }
        }
        if !cols.delimiter.is_ascii() || cols.delimiter == '"' || cols.delimiter == '\n' {
            anyhow::bail!("Unsupported delimiter: {:?}", cols.delimiter);
        }

        let alpha = self.analysis.alpha;
        if !(alpha > 0.0 && alpha < 1.0) {
            anyhow::bail!("Significance level must be in (0, 1), got {}", alpha);
        }

        if self.chart.palette.is_empty() {
            anyhow::bail!("Chart palette must contain at least one color");
        }

        if self.server.max_upload_bytes == 0 {
            anyhow::bail!("max_upload_bytes must be positive");
        }

        Ok(())
    }

    /// Copy of this configuration with per-request overrides applied.
    ///
    /// Recognised keys: `method`, `alpha`, `correction`, `welch`, `group`,
    /// `subgroup` (empty string disables it), `value`, `chart`.
    pub fn with_overrides(&self, params: &HashMap<String, String>) -> Result<Self> {
        let mut config = self.clone();

        for (key, value) in params {
            match key.as_str() {
                "method" => {
                    config.analysis.method = <Method as clap::ValueEnum>::from_str(value, true)
                        .map_err(|_| anyhow::anyhow!("Unknown method: {}", value))?;
                }
                "alpha" => {
                    config.analysis.alpha = value
                        .parse()
                        .with_context(|| format!("Invalid alpha: {}", value))?;
                }
                "correction" => {
                    config.analysis.correction = <Correction as clap::ValueEnum>::from_str(value, true)
                        .map_err(|_| anyhow::anyhow!("Unknown correction: {}", value))?;
                }
                "welch" => {
                    config.analysis.equal_variance = !matches!(value.as_str(), "1" | "true" | "yes");
                }
                "group" => config.columns.group = value.clone(),
                "subgroup" => {
                    config.columns.subgroup = if value.is_empty() { None } else { Some(value.clone()) };
                }
                "value" => config.columns.value = value.clone(),
                "chart" => {
                    config.chart.kind = <ChartKind as clap::ValueEnum>::from_str(value, true)
                        .map_err(|_| anyhow::anyhow!("Unknown chart kind: {}", value))?;
                }
                other => log::debug!("Ignoring unknown parameter '{}'", other),
            }
        }

        config.validate()?;
        Ok(config)
    }
}
