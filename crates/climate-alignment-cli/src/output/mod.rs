pub mod csv_out;
pub mod json;
pub mod minimal;
pub mod table;

use crate::OutputFormat;
use serde_json::Value;

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => json::print_json(value),
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
}

/// Pull the tabular rows out of a computation envelope: either the result
/// itself is an array of rows, or it is a result set carrying a `rows`
/// array.
pub fn result_rows(value: &Value) -> Option<&Vec<Value>> {
    let result = value.get("result").unwrap_or(value);
    match result {
        Value::Array(rows) => Some(rows),
        Value::Object(map) => match map.get("rows") {
            Some(Value::Array(rows)) => Some(rows),
            _ => None,
        },
        _ => None,
    }
}

/// Flatten one result row for tabular rendering: facet values become
/// facet_1..facet_n columns, everything else renders as text.
pub fn flatten_row(row: &Value) -> Vec<(String, String)> {
    let mut columns = Vec::new();
    if let Value::Object(map) = row {
        for (key, value) in map {
            match value {
                Value::Array(values) if key == "facet_values" => {
                    for (i, facet) in values.iter().enumerate() {
                        columns.push((format!("facet_{}", i + 1), scalar_to_string(facet)));
                    }
                }
                other => columns.push((key.clone(), scalar_to_string(other))),
            }
        }
    }
    columns
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
