//! Payload Normalizer
//!
//! Events arrive in several JSON shapes. [`detect`] classifies an event into
//! exactly one [`Shape`] by structural checks in a fixed priority order; the
//! two parse entry points then accept the subset of shapes their handlers
//! support.

use serde_json::{Map, Value};

use super::coerce::to_float;
use super::{is_known_feature, FeatureError, FeatureRecord};

const NAMED_USAGE: &str =
    "use {\"features\": {...}}, {\"records\": [{...}]} or a flat JSON object of features";
const POSITIONAL_USAGE: &str =
    "use {\"features\": [...]}, {\"records\": [{...}]} or a flat array";

/// Structural variants of an incoming event, in detection priority order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape<'a> {
    /// Gateway envelope whose `body` is a JSON-encoded string.
    Envelope(&'a str),
    /// The event itself is a JSON-encoded string.
    Encoded(&'a str),
    /// `{"features": {...}}`
    FeatureObject(&'a Map<String, Value>),
    /// `{"features": [...]}`
    FeatureArray(&'a [Value]),
    /// `{"records": [...]}`
    Records(&'a [Value]),
    /// An object keyed by at least one known feature or alias name.
    FlatRecord(&'a Map<String, Value>),
    /// A bare JSON array.
    BareArray(&'a [Value]),
}

/// Classify `event`. With `allow_envelope` unset the `body` field is ignored,
/// which is how an envelope whose body fails to decode is re-examined.
pub fn detect(event: &Value, allow_envelope: bool) -> Option<Shape<'_>> {
    match event {
        Value::String(raw) => Some(Shape::Encoded(raw)),
        Value::Array(items) => Some(Shape::BareArray(items)),
        Value::Object(map) => {
            if allow_envelope {
                if let Some(Value::String(body)) = map.get("body") {
                    return Some(Shape::Envelope(body));
                }
            }
            match map.get("features") {
                Some(Value::Object(features)) => return Some(Shape::FeatureObject(features)),
                Some(Value::Array(features)) => return Some(Shape::FeatureArray(features)),
                _ => {}
            }
            if let Some(Value::Array(records)) = map.get("records") {
                return Some(Shape::Records(records));
            }
            if map.keys().any(|k| is_known_feature(k)) {
                return Some(Shape::FlatRecord(map));
            }
            None
        }
        _ => None,
    }
}

fn decode(raw: &str) -> Result<Value, FeatureError> {
    serde_json::from_str(raw)
        .map_err(|e| FeatureError::InvalidInputShape(format!("malformed JSON: {e}")))
}

/// Normalize an event into named feature records.
///
/// Accepts a gateway envelope, a JSON string, `{"features": {...}}`,
/// `{"records": [...]}` (every element must be an object) or a flat record.
pub fn parse_named(event: &Value) -> Result<Vec<FeatureRecord>, FeatureError> {
    parse_named_inner(event, true)
}

fn parse_named_inner(event: &Value, allow_envelope: bool) -> Result<Vec<FeatureRecord>, FeatureError> {
    match detect(event, allow_envelope) {
        // An envelope whose body is unusable is re-read as a plain event; the
        // body's own error wins when that also fails.
        Some(Shape::Envelope(body)) => decode(body)
            .and_then(|inner| parse_named(&inner))
            .or_else(|body_err| parse_named_inner(event, false).map_err(|_| body_err)),
        Some(Shape::Encoded(raw)) => parse_named(&decode(raw)?),
        Some(Shape::FeatureObject(features)) => Ok(vec![features.clone()]),
        Some(Shape::Records(records)) => {
            if records.is_empty() {
                return Err(FeatureError::InvalidInputShape("'records' is empty".to_string()));
            }
            records
                .iter()
                .map(|r| match r {
                    Value::Object(record) => Ok(record.clone()),
                    _ => Err(FeatureError::InvalidInputShape(
                        "every element of 'records' must be an object of features".to_string(),
                    )),
                })
                .collect()
        }
        Some(Shape::FlatRecord(record)) => Ok(vec![record.clone()]),
        Some(Shape::FeatureArray(_)) => match event.as_object() {
            Some(map) if map.keys().any(|k| is_known_feature(k)) => Ok(vec![map.clone()]),
            _ => Err(FeatureError::InvalidInputShape(format!("invalid format, {NAMED_USAGE}"))),
        },
        Some(Shape::BareArray(_)) | None => {
            Err(FeatureError::InvalidInputShape(format!("invalid format, {NAMED_USAGE}")))
        }
    }
}

/// Normalize an event into one positional feature vector, matched to the
/// model's columns by position only.
///
/// Accepts a JSON string, `{"features": [...]}` or a bare array. With
/// `accept_records`, `{"records": [...]}` is also accepted and the values of
/// its first record are taken in document order.
pub fn parse_positional(event: &Value, accept_records: bool) -> Result<Vec<f64>, FeatureError> {
    match detect(event, false) {
        Some(Shape::Encoded(raw)) => parse_positional(&decode(raw)?, accept_records),
        Some(Shape::FeatureArray(values)) | Some(Shape::BareArray(values)) => values
            .iter()
            .enumerate()
            .map(|(i, v)| to_float(&format!("features[{i}]"), v))
            .collect(),
        Some(Shape::Records(records)) if accept_records => match records.first() {
            None => Err(FeatureError::InvalidInputShape("'records' is empty".to_string())),
            Some(Value::Object(first)) => first.iter().map(|(k, v)| to_float(k, v)).collect(),
            Some(_) => Err(FeatureError::InvalidInputShape(
                "'records' must contain objects of features".to_string(),
            )),
        },
        _ => Err(FeatureError::InvalidInputShape(format!(
            "invalid format, {POSITIONAL_USAGE}"
        ))),
    }
}
