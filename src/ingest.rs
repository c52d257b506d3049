//! CSV ingestion: upload bytes → typed [`Dataset`]
//!
//! Column presence is checked against the header before any row is read, so
//! a file missing a required column never reaches the statistics.

use csv::{ReaderBuilder, StringRecord, Trim};

use crate::config::ColumnConfig;
use crate::dataset::{Dataset, Observation};
use crate::decoders::decode_upload;
use crate::error::{AnalysisError, AnalysisResult};

/// Positions of the configured columns in the header row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ColumnIndex {
    group: usize,
    subgroup: Option<usize>,
    value: usize,
}

/// Decode an upload (raw CSV or data URI) and parse it
pub fn ingest(bytes: &[u8], columns: &ColumnConfig) -> AnalysisResult<Dataset> {
    let text = decode_upload(bytes)?;
    parse_csv(&text, columns)
}

/// Parse CSV text into a dataset using the configured column names
pub fn parse_csv(text: &str, columns: &ColumnConfig) -> AnalysisResult<Dataset> {
    let delimiter = u8::try_from(columns.delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| AnalysisError::Validation(format!("Unsupported delimiter: {:?}", columns.delimiter)))?;
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| AnalysisError::Parse(format!("Failed to read CSV header: {}", e)))?
        .clone();
    let index = locate_columns(&headers, columns)?;

    let mut observations = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| AnalysisError::Parse(format!("Malformed CSV: {}", e)))?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        // Blank trailing lines come through as a single empty field
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }

        observations.push(parse_row(&record, index, columns, line)?);
    }

    if observations.is_empty() {
        return Err(AnalysisError::Validation("Upload contains no data rows".to_string()));
    }

    log::debug!(
        "Parsed {} observations ({})",
        observations.len(),
        if index.subgroup.is_some() { "nested" } else { "single-factor" }
    );

    Ok(Dataset::new(observations, index.subgroup.is_some()))
}

fn locate_columns(headers: &StringRecord, columns: &ColumnConfig) -> AnalysisResult<ColumnIndex> {
    let find = |name: &str| -> AnalysisResult<Option<usize>> {
        let hits: Vec<usize> = headers
            .iter()
            .enumerate()
            .filter(|(_, h)| *h == name)
            .map(|(i, _)| i)
            .collect();
        if hits.len() > 1 {
            return Err(AnalysisError::Validation(format!("Column '{}' appears more than once", name)));
        }
        Ok(hits.first().copied())
    };

    let group = find(&columns.group)?;
    let value = find(&columns.value)?;
    let subgroup = match &columns.subgroup {
        Some(name) => Some(find(name)?),
        None => None,
    };

    let mut missing = Vec::new();
    if group.is_none() {
        missing.push(columns.group.as_str());
    }
    if let (Some(None), Some(name)) = (subgroup, &columns.subgroup) {
        missing.push(name.as_str());
    }
    if value.is_none() {
        missing.push(columns.value.as_str());
    }
    if !missing.is_empty() {
        return Err(AnalysisError::Validation(format!(
            "Missing required column(s): {}",
            missing.join(", ")
        )));
    }

    if columns.strict {
        let expected: Vec<&str> = [Some(columns.group.as_str()), columns.subgroup.as_deref(), Some(columns.value.as_str())]
            .into_iter()
            .flatten()
            .collect();
        let unknown: Vec<&str> = headers.iter().filter(|h| !expected.contains(h)).collect();
        if !unknown.is_empty() {
            return Err(AnalysisError::Validation(format!("Unexpected column(s): {}", unknown.join(", "))));
        }
    }

    // Both are Some after the missing-column check
    Ok(ColumnIndex {
        group: group.unwrap_or_default(),
        subgroup: subgroup.flatten(),
        value: value.unwrap_or_default(),
    })
}

fn parse_row(record: &StringRecord, index: ColumnIndex, columns: &ColumnConfig, line: u64) -> AnalysisResult<Observation> {
    let field = |i: usize, name: &str| -> AnalysisResult<&str> {
        match record.get(i) {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(AnalysisError::Validation(format!("Line {}: empty '{}' cell", line, name))),
        }
    };

    let group = field(index.group, &columns.group)?.to_string();
    let subgroup = match (index.subgroup, &columns.subgroup) {
        (Some(i), Some(name)) => Some(field(i, name)?.to_string()),
        _ => None,
    };

    let raw = field(index.value, &columns.value)?;
    let value: f64 = raw
        .parse()
        .map_err(|_| AnalysisError::Parse(format!("Line {}: '{}' is not a number", line, raw)))?;
    if !value.is_finite() {
        return Err(AnalysisError::Parse(format!("Line {}: value '{}' is not finite", line, raw)));
    }

    Ok(Observation { group, subgroup, value })
}
