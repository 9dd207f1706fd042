use crate::db::{Database, now_timestamp};
use crate::error::Result;
use serde_json::Value;

/// Extract `current_page` from a raw JSON request body.
///
/// Integers are taken as-is, floats are truncated toward zero, booleans count
/// as 1 and 0 and strings holding an integer are parsed. The error text is returned to the client.
pub fn parse_current_page(body: &[u8]) -> std::result::Result<i64, String> {
    let data: Value = serde_json::from_slice(body).map_err(|e| e.to_string())?;

    let object = data
        .as_object()
        .ok_or_else(|| "request body must be a JSON object".to_string())?;

    match object.get("current_page") {
        None | Some(Value::Null) => Err("current_page is required".to_string()),
        Some(value) => page_from_value(value),
    }
}

fn page_from_value(value: &Value) -> std::result::Result<i64, String> {
    match value {
        Value::Number(n) => {
            if let Some(page) = n.as_i64() {
                return Ok(page);
            }
            match n.as_f64() {
                Some(f) if f.is_finite() && f >= i64::MIN as f64 && f <= i64::MAX as f64 => {
                    Ok(f.trunc() as i64)
                }
                _ => Err(format!("current_page out of range: {}", n)),
            }
        }
        Value::Bool(b) => Ok(i64::from(*b)),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("invalid literal for current_page: '{}'", s)),
        other => Err(format!(
            "current_page must be a number, got {}",
            json_type_name(other)
        )),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Move the reading cursor of a rental owned by `user_id`.
///
/// Another user's rental matches no row; the affected row count is returned
/// and zero is not an error.
pub fn update_progress(
    db: &Database,
    rental_id: &str,
    user_id: &str,
    current_page: i64,
) -> Result<usize> {
    let rows = db.update_progress(rental_id, user_id, current_page, now_timestamp())?;
    tracing::debug!(rental_id, user_id, current_page, rows, "Progress updated");
    Ok(rows)
}
