//! Value coercion and best-effort parsing helpers.
//!
//! [`to_float`] is strict and reports the offending feature. The `lenient_*`
//! helpers and [`timestamp_month`] never fail; callers apply the documented
//! default when they return nothing usable.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use super::FeatureError;

const TRUE_WORDS: [&str; 3] = ["true", "yes", "on"];
const FALSE_WORDS: [&str; 3] = ["false", "no", "off"];

/// Convert a required feature value to `f64`.
///
/// Booleans map to 1.0/0.0; strings are trimmed and lower-cased and matched
/// against boolean words before being parsed as numbers.
pub fn to_float(feature: &str, value: &Value) -> Result<f64, FeatureError> {
    let invalid = |reason: String| FeatureError::InvalidFeatureValue {
        feature: feature.to_string(),
        reason,
    };

    match value {
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Null => Err(invalid("cannot be null".to_string())),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| invalid(format!("is not numeric-convertible: {n}"))),
        Value::String(s) => {
            let normalized = s.trim().to_lowercase();
            if TRUE_WORDS.contains(&normalized.as_str()) {
                Ok(1.0)
            } else if FALSE_WORDS.contains(&normalized.as_str()) {
                Ok(0.0)
            } else {
                normalized
                    .parse::<f64>()
                    .map_err(|_| invalid(format!("is not numeric-convertible: {value}")))
            }
        }
        Value::Array(_) | Value::Object(_) => {
            Err(invalid(format!("is not numeric-convertible: {value}")))
        }
    }
}

/// Numeric reading of an optional value where absent, null, empty or
/// unparseable all read as 0.0.
pub fn lenient_float(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Bool(b)) => f64::from(u8::from(*b)),
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Integer reading of an optional value: integers as-is, floats truncated,
/// integer strings parsed; anything else is `None`.
pub fn lenient_int(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// UTC month of an epoch-seconds number or an ISO-8601 string.
///
/// Strings without an offset are read as UTC.
pub fn timestamp_month(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => epoch_month(n.as_f64()?),
        Value::String(s) => iso_month(s),
        _ => None,
    }
}

fn epoch_month(secs: f64) -> Option<u32> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9) as u32;
    DateTime::<Utc>::from_timestamp(whole as i64, nanos).map(|dt| dt.month())
}

fn iso_month(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc).month());
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.with_timezone(&Utc).month());
    }
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.month());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|d| d.month())
}
