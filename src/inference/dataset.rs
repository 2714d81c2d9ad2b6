//! JSON-lines dataset loading and column checks.

use crate::models::{QaError, QaRecord, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::info;

/// Columns produced by the tokenizer; dataset text columns may not reuse them.
pub const TOKENIZER_OUTPUT_COLUMNS: [&str; 3] = ["input_ids", "attention_mask", "token_type_ids"];

/// Load a dataset from a JSON-lines file.
///
/// Blank lines are skipped. Every other line must be a JSON object.
pub fn load_jsonl_dataset(path: &Path) -> Result<Vec<QaRecord>> {
    let file = File::open(path)
        .map_err(|e| QaError::io(format!("opening dataset {}", path.display()), e))?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();

    for (line_num, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| QaError::io("reading dataset", e))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: QaRecord = serde_json::from_str(&line)
            .map_err(|e| QaError::ParseError(format!("Line {}: {}", line_num + 1, e)))?;
        records.push(record);
    }

    info!(count = records.len(), path = %path.display(), "Loaded dataset");
    Ok(records)
}

/// Check text column names before tokenization.
///
/// Rejects names that collide with tokenizer outputs and anything other
/// than one (single) or two (pair) columns.
pub fn validate_text_columns(columns: &[String]) -> Result<()> {
    let invalid = |reason: String| QaError::InvalidColumns {
        columns: columns.to_vec(),
        reason,
    };

    if columns.is_empty() || columns.len() > 2 {
        return Err(invalid(format!(
            "expected 1 or 2 text columns, got {}",
            columns.len()
        )));
    }
    if let Some(clash) = columns
        .iter()
        .find(|c| TOKENIZER_OUTPUT_COLUMNS.contains(&c.as_str()))
    {
        return Err(invalid(format!("'{clash}' is a tokenizer output column")));
    }
    Ok(())
}

/// Pull the text columns out of one record, in column order.
///
/// `row` is the 0-based row index, used for error messages.
pub fn text_fields<'a>(record: &'a QaRecord, columns: &[String], row: usize) -> Result<Vec<&'a str>> {
    columns
        .iter()
        .map(|column| match record.get(column) {
            Some(serde_json::Value::String(text)) => Ok(text.as_str()),
            Some(other) => Err(QaError::InvalidInput(format!(
                "Row {}: column '{}' is not a string (found {})",
                row + 1,
                column,
                json_kind(other)
            ))),
            None => Err(QaError::InvalidInput(format!(
                "Row {}: missing column '{}'",
                row + 1,
                column
            ))),
        })
        .collect()
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
