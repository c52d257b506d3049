//! Group comparison: summary statistics and pairwise significance tests
//!
//! Cells are compared within families (see [`Family`]): the subgroups of each
//! group in a nested design, or all groups in a single-factor design. Pairs
//! are enumerated in first-seen order, `i < j`, and that order also decides
//! which significance letter each comparison receives.

use serde::{Deserialize, Serialize};

use crate::config::{AnalysisOptions, Correction, Method};
use crate::dataset::{Dataset, Family};
use crate::error::{AnalysisError, AnalysisResult};
use crate::labels::{connected_letters, label_comparisons, LetterAssignment};
use crate::stats::{self, Describe, OneWayAnova};

/// Minimum observations per cell for any two-sample statistic
const MIN_OBSERVATIONS: usize = 2;

/// Descriptive statistics of one cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub group: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subgroup: Option<String>,
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; NaN (null in JSON) below two observations
    #[serde(with = "nan_as_null")]
    pub std: f64,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

/// Non-finite values are written as `null` and read back as NaN
mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}

/// One pairwise comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    /// Enclosing group (nested designs only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// First member: a subgroup, or a group in single-factor designs
    pub subgroup1: String,
    pub subgroup2: String,
    /// `mean(subgroup2) - mean(subgroup1)`
    pub mean_diff: f64,
    /// t statistic (`subgroup1 - subgroup2`) or studentized range q
    pub statistic: f64,
    pub p_value: f64,
    pub p_value_corrected: f64,
    pub significant: bool,
    /// Letter from the label sequence, or "ns"
    pub significance: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ci_lower: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ci_upper: Option<f64>,
}

/// ANOVA table for one comparison family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnovaTable {
    /// Enclosing group, `None` for a single-factor design
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(flatten)]
    pub anova: OneWayAnova,
}

/// Everything the comparator produces for one dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub summary: Vec<SummaryRow>,
    pub comparisons: Vec<ComparisonRow>,
    /// Present for `anova-tukey` only
    #[serde(default)]
    pub anova: Vec<AnovaTable>,
    /// Connectivity letters, `anova-tukey` only
    #[serde(default)]
    pub letters: Vec<LetterAssignment>,
}

/// Per-cell summary rows in first-seen order
pub fn summarize(dataset: &Dataset) -> Vec<SummaryRow> {
    dataset
        .cells()
        .into_iter()
        .map(|cell| {
            let d = Describe::of(&cell.values);
            SummaryRow {
                group: cell.key.group,
                subgroup: cell.key.subgroup,
                count: d.count,
                mean: d.mean,
                std: d.std,
                min: d.min,
                q1: d.q1,
                median: d.median,
                q3: d.q3,
                max: d.max,
            }
        })
        .collect()
}

/// Summarise the dataset and run all pairwise comparisons
pub fn compare_groups(dataset: &Dataset, options: &AnalysisOptions) -> AnalysisResult<Comparison> {
    if dataset.is_empty() {
        return Err(AnalysisError::insufficient("dataset", 0, MIN_OBSERVATIONS));
    }

    let summary = summarize(dataset);
    let mut comparisons = Vec::new();
    let mut anova = Vec::new();
    let mut letters = Vec::new();

    for family in dataset.families() {
        if family.cells.len() < 2 {
            log::debug!("{}: fewer than two members, no comparisons", family.label());
            continue;
        }
        for cell in &family.cells {
            if cell.values.len() < MIN_OBSERVATIONS {
                return Err(AnalysisError::insufficient(cell.key.to_string(), cell.values.len(), MIN_OBSERVATIONS));
            }
        }

        match options.method {
            Method::PairwiseT => comparisons.extend(pairwise_t(&family, options)?),
            Method::AnovaTukey => {
                let (table, rows) = anova_tukey(&family, options.alpha)?;
                letters.extend(family_letters(&family, &rows));
                anova.push(table);
                comparisons.extend(rows);
            }
        }
    }

    let flags: Vec<bool> = comparisons.iter().map(|c| c.significant).collect();
    for (row, label) in comparisons.iter_mut().zip(label_comparisons(&flags)) {
        row.significance = label;
    }

    log::info!(
        "Compared {} cells: {} comparisons, {} significant at alpha={}",
        summary.len(),
        comparisons.len(),
        flags.iter().filter(|&&s| s).count(),
        options.alpha
    );

    Ok(Comparison {
        summary,
        comparisons,
        anova,
        letters,
    })
}

fn pairwise_t(family: &Family, options: &AnalysisOptions) -> AnalysisResult<Vec<ComparisonRow>> {
    let mut rows = Vec::new();
    for i in 0..family.cells.len() {
        for j in (i + 1)..family.cells.len() {
            let (a, b) = (&family.cells[i], &family.cells[j]);
            let test = if options.equal_variance {
                stats::student_t_test(&a.values, &b.values)
            } else {
                stats::welch_t_test(&a.values, &b.values)
            }
            .map_err(|e| in_pair(e, family, a.key.member(), b.key.member()))?;

            rows.push(ComparisonRow {
                group: family.group.clone(),
                subgroup1: a.key.member().to_string(),
                subgroup2: b.key.member().to_string(),
                mean_diff: stats::mean(&b.values) - stats::mean(&a.values),
                statistic: test.statistic,
                p_value: test.p_value,
                p_value_corrected: test.p_value,
                significant: false,
                significance: String::new(),
                ci_lower: None,
                ci_upper: None,
            });
        }
    }

    let raw: Vec<f64> = rows.iter().map(|r| r.p_value).collect();
    let corrected = match options.correction {
        Correction::Bonferroni => stats::bonferroni(&raw),
        Correction::Holm => stats::holm(&raw),
        Correction::None => raw,
    };
    for (row, p) in rows.iter_mut().zip(corrected) {
        row.p_value_corrected = p;
        row.significant = p < options.alpha;
    }
    Ok(rows)
}

fn anova_tukey(family: &Family, alpha: f64) -> AnalysisResult<(AnovaTable, Vec<ComparisonRow>)> {
    let samples: Vec<&[f64]> = family.cells.iter().map(|c| c.values.as_slice()).collect();
    let context = |e: AnalysisError| match e {
        AnalysisError::Computation(msg) => AnalysisError::Computation(format!("{}: {}", family.label(), msg)),
        other => other,
    };

    let table = stats::one_way_anova(&samples).map_err(context)?;
    log::debug!(
        "{}: F({}, {}) = {:.4}, p = {:.4e}",
        family.label(),
        table.df_between,
        table.df_within,
        table.f_statistic,
        table.p_value
    );

    let rows = stats::tukey_hsd(&samples, &table, alpha)
        .map_err(context)?
        .into_iter()
        .map(|pair| {
            let (a, b) = (&family.cells[pair.first], &family.cells[pair.second]);
            ComparisonRow {
                group: family.group.clone(),
                subgroup1: a.key.member().to_string(),
                subgroup2: b.key.member().to_string(),
                mean_diff: pair.mean_diff,
                statistic: pair.q,
                p_value: pair.p_value,
                p_value_corrected: pair.p_value,
                significant: pair.p_value < alpha,
                significance: String::new(),
                ci_lower: Some(pair.ci_lower),
                ci_upper: Some(pair.ci_upper),
            }
        })
        .collect();

    Ok((
        AnovaTable {
            family: family.group.clone(),
            anova: table,
        },
        rows,
    ))
}

/// Connectivity letters for one family, from its Tukey rows
fn family_letters(family: &Family, rows: &[ComparisonRow]) -> Vec<LetterAssignment> {
    let index_of = |member: &str| family.cells.iter().position(|c| c.key.member() == member);
    let not_different: Vec<(usize, usize)> = rows
        .iter()
        .filter(|r| !r.significant)
        .filter_map(|r| Some((index_of(&r.subgroup1)?, index_of(&r.subgroup2)?)))
        .collect();

    family
        .cells
        .iter()
        .zip(connected_letters(family.cells.len(), &not_different))
        .map(|(cell, letter)| LetterAssignment {
            group: cell.key.group.clone(),
            subgroup: cell.key.subgroup.clone(),
            letter,
        })
        .collect()
}

fn in_pair(err: AnalysisError, family: &Family, a: &str, b: &str) -> AnalysisError {
    match err {
        AnalysisError::Computation(msg) => {
            AnalysisError::Computation(format!("{}: {} vs {}: {}", family.label(), a, b, msg))
        }
        other => other,
    }
}
