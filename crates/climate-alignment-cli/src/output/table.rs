use serde_json::Value;
use tabled::{builder::Builder, Table};

use super::{flatten_row, result_rows};

/// Format the computation envelope as a table using the tabled crate.
pub fn print_table(value: &Value) {
    match result_rows(value) {
        Some(rows) if !rows.is_empty() => print_row_table(rows),
        Some(_) => println!("(no rows)"),
        None => print_flat(value),
    }

    if let Some(Value::Array(warnings)) = value.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for warning in warnings {
                if let Value::String(s) = warning {
                    println!("  - {}", s);
                }
            }
        }
    }

    if let Some(Value::String(methodology)) = value.get("methodology") {
        println!("\nMethodology: {}", methodology);
    }
}

fn print_row_table(rows: &[Value]) {
    // Headers come from the widest row so short rows still line up.
    let mut headers: Vec<String> = Vec::new();
    let flattened: Vec<Vec<(String, String)>> = rows.iter().map(flatten_row).collect();
    for row in &flattened {
        for (key, _) in row {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
        }
    }

    let mut builder = Builder::default();
    builder.push_record(&headers);
    for row in &flattened {
        let record: Vec<String> = headers
            .iter()
            .map(|header| {
                row.iter()
                    .find(|(key, _)| key == header)
                    .map(|(_, value)| value.clone())
                    .unwrap_or_default()
            })
            .collect();
        builder.push_record(record);
    }
    println!("{}", Table::from(builder));
}

fn print_flat(value: &Value) {
    if let Value::Object(map) = value {
        let mut builder = Builder::default();
        builder.push_record(["Field", "Value"]);
        for (key, val) in map {
            builder.push_record([key.as_str(), &val.to_string()]);
        }
        println!("{}", Table::from(builder));
    } else {
        println!("{}", value);
    }
}
