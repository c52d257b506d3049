//! Declarative chart specification
//!
//! One series per summary row: the bar height is the mean, the error bar is the
//! standard deviation, and series of the same top-level group share an offset
//! group so they are drawn side by side. Significance text sits just above
//! each error-bar cap.

use serde::{Deserialize, Serialize};

use crate::compare::{ComparisonRow, SummaryRow};
use crate::config::{ChartKind, ChartOptions};
use crate::labels::{LetterAssignment, NOT_SIGNIFICANT};

/// Fraction of the chart height between an error-bar cap and its label
const ANNOTATION_OFFSET: f64 = 0.05;
/// Series color when the palette is empty
const FALLBACK_COLOR: &str = "#4d4d4d";

/// Five-number summary drawn by box charts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxStats {
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

/// One bar or box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    /// Legend entry, e.g. "g1 - s1"
    pub name: String,
    /// Category-axis position, e.g. "g1-s1"
    pub x: String,
    /// Top-level group the series belongs to
    pub category: String,
    pub offset_group: usize,
    pub mean: f64,
    /// Error-bar half height (0 when the std is undefined)
    pub error: f64,
    pub color: String,
    pub box_stats: BoxStats,
}

/// Text drawn above a series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Index into [`ChartSpec::series`]
    pub series: usize,
    pub x: String,
    pub y: f64,
    pub text: String,
}

/// Chart description consumable by any plotting front end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub title: String,
    pub x_axis_title: String,
    pub y_axis_title: String,
    pub legend_title: String,
    /// Top-level groups in display order
    pub categories: Vec<String>,
    pub series: Vec<Series>,
    pub annotations: Vec<Annotation>,
    /// Highest point drawn by any series
    pub y_max: f64,
}

impl Series {
    /// Point the annotation is placed above: error-bar cap or box whisker
    pub fn top(&self, kind: ChartKind) -> f64 {
        match kind {
            ChartKind::Bar => self.mean + self.error,
            ChartKind::Box => self.box_stats.max,
        }
    }
}

/// Build the chart for a set of summary rows.
///
/// When `letters` is non-empty each series is annotated with its letter;
/// otherwise with the label of the first significant comparison in which it
/// is the first member.
pub fn build_chart(
    summary: &[SummaryRow],
    comparisons: &[ComparisonRow],
    letters: &[LetterAssignment],
    options: &ChartOptions,
) -> ChartSpec {
    let mut categories: Vec<String> = Vec::new();
    for row in summary {
        if !categories.contains(&row.group) {
            categories.push(row.group.clone());
        }
    }

    let mut position_in_category = vec![0usize; categories.len()];
    let series: Vec<Series> = summary
        .iter()
        .map(|row| {
            let offset_group = categories.iter().position(|c| c == &row.group).unwrap_or(0);
            let color_index = match row.subgroup {
                Some(_) => {
                    let j = position_in_category[offset_group];
                    position_in_category[offset_group] += 1;
                    j
                }
                None => offset_group,
            };
            let (name, x) = match &row.subgroup {
                Some(sub) => (format!("{} - {}", row.group, sub), format!("{}-{}", row.group, sub)),
                None => (row.group.clone(), row.group.clone()),
            };

            Series {
                name,
                x,
                category: row.group.clone(),
                offset_group,
                mean: row.mean,
                error: if row.std.is_finite() { row.std } else { 0.0 },
                color: options
                    .palette
                    .get(color_index % options.palette.len().max(1))
                    .cloned()
                    .unwrap_or_else(|| FALLBACK_COLOR.to_string()),
                box_stats: BoxStats {
                    min: row.min,
                    q1: row.q1,
                    median: row.median,
                    q3: row.q3,
                    max: row.max,
                },
            }
        })
        .collect();

    let y_max = series
        .iter()
        .map(|s| s.top(options.kind).max(s.mean + s.error))
        .filter(|y| y.is_finite())
        .fold(0.0_f64, f64::max);

    let annotations = summary
        .iter()
        .zip(series.iter())
        .enumerate()
        .filter_map(|(index, (row, s))| {
            let text = annotation_text(row, comparisons, letters)?;
            Some(Annotation {
                series: index,
                x: s.x.clone(),
                y: s.top(options.kind) + ANNOTATION_OFFSET * y_max,
                text,
            })
        })
        .collect();

    ChartSpec {
        kind: options.kind,
        title: options.title.clone(),
        x_axis_title: options.x_axis_title.clone(),
        y_axis_title: options.y_axis_title.clone(),
        legend_title: options.legend_title.clone(),
        categories,
        series,
        annotations,
        y_max,
    }
}

fn annotation_text(row: &SummaryRow, comparisons: &[ComparisonRow], letters: &[LetterAssignment]) -> Option<String> {
    if !letters.is_empty() {
        return letters
            .iter()
            .find(|l| l.group == row.group && l.subgroup == row.subgroup)
            .map(|l| l.letter.clone());
    }

    // In single-factor rows the group itself is the family member
    let (family, member) = match &row.subgroup {
        Some(sub) => (Some(row.group.as_str()), sub.as_str()),
        None => (None, row.group.as_str()),
    };
    comparisons
        .iter()
        .find(|c| c.group.as_deref() == family && c.subgroup1 == member && c.significance != NOT_SIGNIFICANT)
        .map(|c| c.significance.clone())
}
