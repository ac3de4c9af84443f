use serde_json::Value;

use super::result_rows;

/// One line per row: identifying columns and the score.
pub fn print_minimal(value: &Value) {
    let Some(rows) = result_rows(value) else {
        println!("{}", value);
        return;
    };
    for row in rows {
        let Value::Object(map) = row else { continue };
        let portfolio = text(map.get("portfolio_id"));
        let date = text(map.get("portfolio_date"));
        let score = map
            .get("score")
            .map(|s| text(Some(s)))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "undefined".to_string());
        println!("{} {} {}", portfolio, date, score);
    }
}

fn text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}
