// Lenient serde helpers for property bags exported by GIS tools and
// spreadsheets: numbers show up as strings, strings as numbers, and
// missing values as null, "" or the "—" placeholder.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

fn is_placeholder(s: &str) -> bool {
    matches!(s.trim(), "" | "—" | "-")
}

fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if !is_placeholder(s) => s.trim().replace(',', ".").parse().ok(),
        _ => None,
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !is_placeholder(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Optional number from a number, numeric string, or null
pub fn opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_to_f64))
}

/// Required number that may arrive as a string
pub fn f64_or_string<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    value_to_f64(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("expected a number, got {}", value)))
}

/// Optional text; numbers are stringified and placeholders become None
pub fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_to_string))
}
