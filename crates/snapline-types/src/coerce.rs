//! Lenient id coercion for client-supplied identifiers.
//!
//! Browser clients send ids as JSON numbers or as numeric strings (query
//! parameters, form fields). Both are accepted; anything that does not
//! coerce to a positive integer is treated as absent.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

/// A reference id was supplied but does not name a positive integer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid id: {0}")]
pub struct InvalidId(pub Value);

/// Parse a raw query/body string into a positive id.
pub fn parse_id(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let id = match raw.parse::<i64>() {
        Ok(id) => id,
        Err(_) => integral(raw.parse::<f64>().ok()?)?,
    };
    (id > 0).then_some(id)
}

/// Coerce a JSON value into a positive id.
pub fn coerce_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => {
            let id = match n.as_i64() {
                Some(id) => id,
                None => integral(n.as_f64()?)?,
            };
            (id > 0).then_some(id)
        }
        Value::String(s) => parse_id(s),
        _ => None,
    }
}

/// Coerce an optional reference. Absent, `null`, `0` and `""` mean "no
/// reference"; any other value must coerce or it is an error.
pub fn optional_id(value: Option<&Value>) -> Result<Option<i64>, InvalidId> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::Number(n)) if n.as_f64() == Some(0.0) => Ok(None),
        Some(other) => coerce_id(other).map(Some).ok_or_else(|| InvalidId(other.clone())),
    }
}

/// Serde adapter: `#[serde(default, deserialize_with = "loose_id")]`.
pub fn loose_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(coerce_id))
}

fn integral(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}
