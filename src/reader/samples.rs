//! Parsing of `fingerprint_results_<id>.csv` sample files.
//!
//! The header names `i` plus a `<function>_value` / `<function>_elapsed`
//! pair per tracked function. Cells are kept as text.

use crate::error::{FormatError, FormatErrorKind};
use crate::models::{FunctionSet, HostId, Measure, Reading, SampleRecord, TrackedField};
use csv::StringRecord;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Column positions of one tracked function.
#[derive(Debug, Clone, Copy)]
struct FunctionColumns {
    function: &'static str,
    value: usize,
    elapsed: usize,
}

/// Resolved header: where the index lives and which functions are present.
#[derive(Debug)]
struct Layout {
    width: usize,
    index: usize,
    present: Vec<FunctionColumns>,
    absent: Vec<&'static str>,
}

/// Parse one host's sample CSV.
///
/// Functions of `function_set` without columns are recorded as
/// [`Reading::NotSampled`]; columns for other functions are ignored.
pub fn parse_samples(
    name: &str,
    content: &str,
    host_id: &HostId,
    function_set: FunctionSet,
) -> Result<Vec<SampleRecord>, FormatError> {
    let fail = |kind| FormatError::new(name, kind);

    if content.trim().is_empty() {
        return Err(fail(FormatErrorKind::Empty));
    }

    // Column counts are checked per row below so the error names the row.
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let header = reader.headers().map_err(|e| fail(malformed(&e)))?.clone();
    let layout = resolve_layout(&header, function_set).map_err(fail)?;

    if !layout.absent.is_empty() {
        debug!(
            "{}: functions not sampled by this host: {}",
            name,
            layout.absent.join(", ")
        );
    }

    let mut samples = Vec::new();
    let mut seen = HashSet::new();

    for result in reader.records() {
        let record = result.map_err(|e| fail(malformed(&e)))?;
        let row = record.position().map(|p| p.line() as usize).unwrap_or(0);

        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }

        if record.len() != layout.width {
            return Err(fail(FormatErrorKind::ColumnCount {
                row,
                expected: layout.width,
                found: record.len(),
            }));
        }

        let raw_index = record[layout.index].trim();
        let index: u64 = raw_index.parse().map_err(|_| {
            fail(FormatErrorKind::InvalidIndex {
                row,
                value: raw_index.to_string(),
            })
        })?;

        if !seen.insert(index) {
            return Err(fail(FormatErrorKind::DuplicateIndex { row, index }));
        }

        let mut readings = BTreeMap::new();
        for cols in &layout.present {
            readings.insert(
                cols.function.to_string(),
                Reading::sampled(&record[cols.value], &record[cols.elapsed]),
            );
        }
        for function in &layout.absent {
            readings.insert(function.to_string(), Reading::NotSampled);
        }

        samples.push(SampleRecord {
            host_id: host_id.clone(),
            index,
            readings,
        });
    }

    if samples.is_empty() {
        return Err(fail(FormatErrorKind::NoSamples));
    }

    samples.sort_by_key(|s| s.index);
    Ok(samples)
}

fn malformed(err: &csv::Error) -> FormatErrorKind {
    FormatErrorKind::Malformed {
        row: err.position().map(|p| p.line() as usize).unwrap_or(0),
        message: err.to_string(),
    }
}

fn resolve_layout(
    header: &StringRecord,
    function_set: FunctionSet,
) -> Result<Layout, FormatErrorKind> {
    let position = |col: &str| header.iter().position(|h| h.trim() == col);

    let index = position("i").ok_or(FormatErrorKind::MissingIndexColumn)?;

    let mut present = Vec::new();
    let mut absent = Vec::new();

    for &function in function_set.functions() {
        let value_col = TrackedField::new(function, Measure::Value).to_string();
        let elapsed_col = TrackedField::new(function, Measure::Elapsed).to_string();

        match (position(&value_col), position(&elapsed_col)) {
            (Some(value), Some(elapsed)) => present.push(FunctionColumns {
                function,
                value,
                elapsed,
            }),
            (None, None) => absent.push(function),
            (Some(_), None) => {
                return Err(FormatErrorKind::UnpairedColumn {
                    column: value_col,
                    partner: elapsed_col,
                })
            }
            (None, Some(_)) => {
                return Err(FormatErrorKind::UnpairedColumn {
                    column: elapsed_col,
                    partner: value_col,
                })
            }
        }
    }

    if present.is_empty() {
        return Err(FormatErrorKind::NoTrackedFunctions(
            function_set.functions().join(", "),
        ));
    }

    let known: HashSet<usize> = present
        .iter()
        .flat_map(|c| [c.value, c.elapsed])
        .chain([index])
        .collect();
    for (pos, col) in header.iter().enumerate() {
        if !known.contains(&pos) {
            debug!("Ignoring untracked column `{}`", col);
        }
    }

    Ok(Layout {
        width: header.len(),
        index,
        present,
        absent,
    })
}
