//! sigdash: significance labels for grouped measurements
//!
//! `analyze` runs one CSV through the pipeline and writes a report;
//! `serve` starts the upload dashboard.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::path::{Path, PathBuf};

use sigdash::config::{ChartKind, Config, Correction, Method};
use sigdash::output::{write_report, write_svg};
use sigdash::{analyze_upload, AnalysisReport};

/// Group/subgroup significance testing with letter labels
#[derive(Parser, Debug)]
#[command(name = "sigdash")]
#[command(version)]
#[command(about = "Summary statistics, pairwise significance tests and labelled charts for grouped CSV data")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyse a CSV file and write a report
    Analyze(AnalyzeArgs),

    /// Start the upload dashboard
    #[cfg(feature = "serve")]
    Serve(ServeArgs),
}

/// Arguments for the analyze subcommand
#[derive(Parser, Debug)]
struct AnalyzeArgs {
    /// CSV file (or a file holding a data URI)
    #[arg(short, long)]
    input: PathBuf,

    /// Output report (.json, .json.gz, .tsv, .txt, .html)
    #[arg(short, long, default_value = "report.json")]
    output: PathBuf,

    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Comparison method
    #[arg(long, value_enum)]
    method: Option<Method>,

    /// Significance level
    #[arg(long)]
    alpha: Option<f64>,

    /// Multiple-comparison correction for pairwise t-tests
    #[arg(long, value_enum)]
    correction: Option<Correction>,

    /// Use Welch's unequal-variance t-test
    #[arg(long)]
    welch: bool,

    /// Ignore the subgroup column (single-factor analysis)
    #[arg(long)]
    no_subgroup: bool,

    /// Name of the group column
    #[arg(long)]
    group_column: Option<String>,

    /// Name of the subgroup column
    #[arg(long, conflicts_with = "no_subgroup")]
    subgroup_column: Option<String>,

    /// Name of the value column
    #[arg(long)]
    value_column: Option<String>,

    /// Chart kind
    #[arg(long, value_enum)]
    chart: Option<ChartKind>,

    /// Also write the chart as SVG
    #[arg(long)]
    svg: Option<PathBuf>,

    /// Use compact JSON (no pretty-printing)
    #[arg(long)]
    compact: bool,

    /// Compress output with gzip (.json.gz)
    #[arg(long)]
    gzip: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Arguments for the serve subcommand
#[cfg(feature = "serve")]
#[derive(Parser, Debug)]
struct ServeArgs {
    /// Port for web server (default from config: 8000)
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind (default from config: 0.0.0.0)
    #[arg(long)]
    host: Option<String>,

    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Open the dashboard in a browser
    #[arg(long)]
    open: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze(args) => run_analyze(args),
        #[cfg(feature = "serve")]
        Commands::Serve(args) => run_serve(args),
    }
}

fn init_logging(verbose: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => {
            info!("Loading configuration: {}", path.display());
            Config::from_yaml(path)
        }
        None => Ok(Config::default()),
    }
}

/// Run the analyze subcommand: CSV → report file
fn run_analyze(args: AnalyzeArgs) -> Result<()> {
    init_logging(args.verbose);
    info!("sigdash analyze v{}", env!("CARGO_PKG_VERSION"));

    let mut config = load_config(args.config.as_deref())?;
    apply_cli_overrides(&mut config, &args);
    config.validate()?;

    let bytes = std::fs::read(&args.input).with_context(|| format!("Failed to read {}", args.input.display()))?;
    info!("Analysing {} ({} bytes, method {})", args.input.display(), bytes.len(), config.analysis.method);

    let report = analyze_upload(&bytes, &config).with_context(|| format!("Analysis of {} failed", args.input.display()))?;
    log_summary(&report);

    save_report(&report, &args)?;

    if let Some(svg_path) = &args.svg {
        write_svg(&report, svg_path)?;
        info!("Chart saved to: {}", svg_path.display());
    }

    info!(
        "Done! {} cells, {} comparisons, {} significant",
        report.summary.len(),
        report.comparisons.len(),
        report.significant_count()
    );
    Ok(())
}

fn apply_cli_overrides(config: &mut Config, args: &AnalyzeArgs) {
    if let Some(method) = args.method {
        config.analysis.method = method;
    }
    if let Some(alpha) = args.alpha {
        config.analysis.alpha = alpha;
    }
    if let Some(correction) = args.correction {
        config.analysis.correction = correction;
    }
    if args.welch {
        config.analysis.equal_variance = false;
    }
    if let Some(group) = &args.group_column {
        config.columns.group = group.clone();
    }
    if let Some(subgroup) = &args.subgroup_column {
        config.columns.subgroup = Some(subgroup.clone());
    }
    if args.no_subgroup {
        config.columns.subgroup = None;
    }
    if let Some(value) = &args.value_column {
        config.columns.value = value.clone();
    }
    if let Some(kind) = args.chart {
        config.chart.kind = kind;
    }
}

fn save_report(report: &AnalysisReport, args: &AnalyzeArgs) -> Result<()> {
    let ext = args.output.extension().and_then(|e| e.to_str()).unwrap_or("json");
    let is_json = matches!(ext, "json" | "gz");

    // Auto-detect gzip from output extension
    let use_gzip = args.gzip || ext == "gz";

    if use_gzip && !is_json {
        warn!("--gzip only applies to JSON reports, writing {} uncompressed", args.output.display());
    }

    if use_gzip && is_json {
        // Add .gz extension if not present
        let output_path = if ext == "gz" {
            args.output.clone()
        } else {
            args.output.with_extension("json.gz")
        };
        report.save_gzip(&output_path, args.compact)?;
        info!("Gzipped report saved to: {}", output_path.display());
    } else if args.compact && is_json {
        report.save_compact(&args.output)?;
        info!("Compact report saved to: {}", args.output.display());
    } else {
        write_report(report, &args.output)?;
        info!("Report saved to: {}", args.output.display());
    }
    Ok(())
}

fn log_summary(report: &AnalysisReport) {
    info!("{:<24} {:>6} {:>12} {:>12}", "cell", "n", "mean", "std");
    for row in &report.summary {
        let cell = match &row.subgroup {
            Some(sub) => format!("{}/{}", row.group, sub),
            None => row.group.clone(),
        };
        info!("{:<24} {:>6} {:>12.4} {:>12.4}", cell, row.count, row.mean, row.std);
    }

    for c in &report.comparisons {
        let family = c.group.as_deref().unwrap_or("-");
        info!(
            "{} {} vs {}: p = {:.4} (corrected {:.4}) {}",
            family, c.subgroup1, c.subgroup2, c.p_value, c.p_value_corrected, c.significance
        );
    }

    for table in &report.anova {
        info!(
            "ANOVA {}: F({}, {}) = {:.4}, p = {:.4}",
            table.family.as_deref().unwrap_or("all groups"),
            table.anova.df_between,
            table.anova.df_within,
            table.anova.f_statistic,
            table.anova.p_value
        );
    }
}

/// Run the serve subcommand
#[cfg(feature = "serve")]
fn run_serve(args: ServeArgs) -> Result<()> {
    init_logging(args.verbose);
    info!("sigdash serve v{}", env!("CARGO_PKG_VERSION"));

    let mut config = load_config(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }
    config.validate()?;

    sigdash::serve::start_server(&config, args.open)
}
