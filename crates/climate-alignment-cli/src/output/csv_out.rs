use serde_json::Value;
use std::io;

use super::{flatten_row, result_rows};

/// Write the result rows as CSV to stdout.
pub fn print_csv(value: &Value) {
    let Some(rows) = result_rows(value) else {
        println!("{}", value);
        return;
    };
    if rows.is_empty() {
        return;
    }

    let flattened: Vec<Vec<(String, String)>> = rows.iter().map(flatten_row).collect();
    let mut headers: Vec<String> = Vec::new();
    for row in &flattened {
        for (key, _) in row {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
        }
    }

    let mut writer = csv::Writer::from_writer(io::stdout());
    if writer.write_record(&headers).is_err() {
        return;
    }
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
        if writer.write_record(&record).is_err() {
            return;
        }
    }
    let _ = writer.flush();
}
