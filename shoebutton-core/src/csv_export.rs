//! CSV export for catalog listings and match reports.
//!
//! Accepts the three data shapes the surrounding tooling produces, as a
//! [`serde_json::Value`]:
//!
//! - an array of records (objects with uniform keys): one row per record,
//!   header taken from the first record's key order;
//! - a mapping from column name to equal-length arrays: written transposed,
//!   one row per index across all columns;
//! - a single flat mapping: header row plus one data row.
//!
//! Anything else is rejected with [`PipelineError::UnsupportedShape`] before
//! a single byte is written. Output is UTF-8, comma-delimited, CRLF rows;
//! fields containing the delimiter, quotes or line breaks are quoted with
//! doubled quotes. Object key order is preserved end to end (serde_json's
//! `preserve_order` feature), so headers come out in first-encountered
//! order.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::PipelineError;

/// Serialize `data` to a CSV file at `path`.
///
/// The destination is created (truncating any previous file); failure to
/// open or write it is [`PipelineError::IoFailure`].
pub fn write_csv(data: &Value, path: &Path) -> Result<(), PipelineError> {
    let rows = render_rows(data)?;

    let file = File::create(path).map_err(|source| PipelineError::IoFailure {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = BufWriter::new(file);

    for row in &rows {
        let line: Vec<String> = row.iter().map(|field| escape_field(field)).collect();
        writer
            .write_all(line.join(",").as_bytes())
            .and_then(|_| writer.write_all(b"\r\n"))
            .map_err(|source| PipelineError::IoFailure {
                path: path.to_path_buf(),
                source,
            })?;
    }
    writer.flush().map_err(|source| PipelineError::IoFailure {
        path: path.to_path_buf(),
        source,
    })?;

    debug!(path = %path.display(), rows = rows.len(), "Wrote CSV export");
    Ok(())
}

fn render_rows(data: &Value) -> Result<Vec<Vec<String>>, PipelineError> {
    match data {
        Value::Array(records) if !records.is_empty() => rows_from_records(records),
        Value::Object(map) if !map.is_empty() => {
            if map.values().all(Value::is_array) {
                rows_from_columns(map)
            } else if map.values().all(is_scalar) {
                rows_from_flat(map)
            } else {
                Err(unsupported(
                    "mapping mixes array and scalar values; use one or the other",
                ))
            }
        }
        Value::Array(_) => Err(unsupported("empty sequence has no rows or header")),
        Value::Object(_) => Err(unsupported("empty mapping has no columns")),
        other => Err(unsupported(&format!(
            "expected records, columns or a flat mapping, got {}",
            kind_of(other)
        ))),
    }
}

/// Shape (a): ordered sequence of uniform-keyed records.
fn rows_from_records(records: &[Value]) -> Result<Vec<Vec<String>>, PipelineError> {
    let first = records[0]
        .as_object()
        .ok_or_else(|| unsupported("sequence elements must be records"))?;
    let header: Vec<String> = first.keys().cloned().collect();

    let mut rows = Vec::with_capacity(records.len() + 1);
    rows.push(header.clone());

    for record in records {
        let fields = record
            .as_object()
            .ok_or_else(|| unsupported("sequence elements must be records"))?;
        for key in fields.keys() {
            if !header.iter().any(|h| h == key) {
                return Err(unsupported(&format!(
                    "record key {key:?} is not in the header row"
                )));
            }
        }
        let mut row = Vec::with_capacity(header.len());
        for column in &header {
            match fields.get(column) {
                Some(value) => row.push(render_cell(value)?),
                None => row.push(String::new()),
            }
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Shape (b): mapping from column name to equal-length value sequences,
/// written transposed.
fn rows_from_columns(map: &Map<String, Value>) -> Result<Vec<Vec<String>>, PipelineError> {
    let columns: Vec<(&String, &Vec<Value>)> = map
        .iter()
        .map(|(name, value)| {
            (
                name,
                value.as_array().expect("pre-checked: all values are arrays"),
            )
        })
        .collect();

    let expected = columns[0].1.len();
    for (name, values) in &columns {
        if values.len() != expected {
            return Err(unsupported(&format!(
                "column {name:?} has {} values, expected {expected}",
                values.len()
            )));
        }
    }

    let mut rows = Vec::with_capacity(expected + 1);
    rows.push(columns.iter().map(|(name, _)| (*name).clone()).collect());
    for index in 0..expected {
        let mut row = Vec::with_capacity(columns.len());
        for (_, values) in &columns {
            row.push(render_cell(&values[index])?);
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Shape (c): one flat mapping, one data row.
fn rows_from_flat(map: &Map<String, Value>) -> Result<Vec<Vec<String>>, PipelineError> {
    let header: Vec<String> = map.keys().cloned().collect();
    let mut row = Vec::with_capacity(header.len());
    for value in map.values() {
        row.push(render_cell(value)?);
    }
    Ok(vec![header, row])
}

fn is_scalar(value: &Value) -> bool {
    !value.is_array() && !value.is_object()
}

fn render_cell(value: &Value) -> Result<String, PipelineError> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Number(number) => Ok(number.to_string()),
        Value::Bool(flag) => Ok(flag.to_string()),
        Value::Null => Ok(String::new()),
        Value::Array(_) | Value::Object(_) => Err(unsupported(
            "nested arrays or objects cannot be rendered into a cell",
        )),
    }
}

fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn unsupported(reason: &str) -> PipelineError {
    PipelineError::UnsupportedShape {
        reason: reason.to_string(),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
