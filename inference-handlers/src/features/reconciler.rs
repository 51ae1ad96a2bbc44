//! Feature Reconciler
//!
//! Turns normalized records into the exact ordered numeric rows a model was
//! fitted on: resolve aliases, derive absent expected columns, check
//! completeness, then coerce in column order.

use chrono::{DateTime, Datelike, Utc};
use ndarray::Array2;
use serde_json::Value;
use tracing::debug;

use super::coerce::{lenient_float, lenient_int, timestamp_month, to_float};
use super::{ExpectedColumns, FeatureError, FeatureRecord, FEATURES, FEATURE_ALIASES};

const AREA_GROUP: [&str; 3] = ["area_1", "area_2", "area_3"];
const DEVICE_TYPE_GROUP: [&str; 8] = [
    "device_type_1",
    "device_type_2",
    "device_type_3",
    "device_type_4",
    "device_type_5",
    "device_type_6",
    "device_type_7",
    "device_type_8",
];

/// Reconciles records against an expected column list, or against
/// [`FEATURES`] when the model carries no column metadata.
#[derive(Debug, Clone, Copy)]
pub struct FeatureReconciler<'a> {
    expected: Option<&'a ExpectedColumns>,
    clock: fn() -> DateTime<Utc>,
}

impl<'a> FeatureReconciler<'a> {
    pub fn new(expected: Option<&'a ExpectedColumns>) -> Self {
        Self {
            expected,
            clock: Utc::now,
        }
    }

    /// Override the clock used for the `Month` fallback.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    /// Number of columns every reconciled row will have.
    pub fn width(&self) -> usize {
        self.expected.map_or(FEATURES.len(), ExpectedColumns::len)
    }

    /// Reconcile one record into an ordered row.
    pub fn reconcile(&self, record: &FeatureRecord) -> Result<Vec<f64>, FeatureError> {
        let mut resolved = resolve_aliases(record);

        match self.expected {
            Some(expected) => {
                self.derive_missing(&mut resolved, record, expected);
                check_complete(&resolved, expected.columns().iter().map(String::as_str))?;
                expected
                    .columns()
                    .iter()
                    .map(|column| to_float(column, &resolved[column.as_str()]))
                    .collect()
            }
            None => {
                check_complete(&resolved, FEATURES.iter().copied())?;
                FEATURES
                    .iter()
                    .map(|column| to_float(column, &resolved[*column]))
                    .collect()
            }
        }
    }

    /// Reconcile a batch into a `rows x width` matrix.
    pub fn reconcile_all(&self, records: &[FeatureRecord]) -> Result<Array2<f64>, FeatureError> {
        let width = self.width();
        let mut flat = Vec::with_capacity(records.len() * width);
        for record in records {
            flat.extend(self.reconcile(record)?);
        }
        Array2::from_shape_vec((records.len(), width), flat)
            .map_err(|e| FeatureError::InvalidInputShape(e.to_string()))
    }

    fn derive_missing(&self, resolved: &mut FeatureRecord, original: &FeatureRecord, expected: &ExpectedColumns) {
        for column in expected.columns() {
            if resolved.contains_key(column) {
                continue;
            }
            let derived = match column.as_str() {
                "Month" => Value::from(record_month(original).unwrap_or_else(|| (self.clock)().month())),
                "area" => Value::from(onehot_index(resolved, &AREA_GROUP)),
                "device_type" => Value::from(onehot_index(resolved, &DEVICE_TYPE_GROUP)),
                "illuminance_lux" => Value::from(0.0),
                "is_110v" => voltage_flag(resolved, 100.0..130.0),
                "is_220v" => voltage_flag(resolved, 200.0..250.0),
                "is_weekend" => {
                    let weekday = lenient_int(resolved.get("weekday")).unwrap_or(0);
                    Value::from(u8::from(weekday >= 5))
                }
                "outlet_id" => Value::from(0),
                _ => continue,
            };
            debug!(column = %column, value = %derived, "Derived missing column");
            resolved.insert(column.clone(), derived);
        }
    }
}

/// Copy `record` with each alias also stored under its canonical name.
/// A canonical value already present is never overwritten.
fn resolve_aliases(record: &FeatureRecord) -> FeatureRecord {
    let mut resolved = record.clone();
    for (alias, canonical) in FEATURE_ALIASES {
        if resolved.contains_key(canonical) {
            continue;
        }
        if let Some(value) = record.get(alias) {
            resolved.insert(canonical.to_string(), value.clone());
        }
    }
    resolved
}

fn check_complete<'c>(
    record: &FeatureRecord,
    columns: impl Iterator<Item = &'c str>,
) -> Result<(), FeatureError> {
    let mut missing: Vec<String> = columns
        .filter(|c| !record.contains_key(*c))
        .map(str::to_string)
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    missing.sort();
    missing.dedup();
    Err(FeatureError::MissingFeatures { missing })
}

/// Month of the record's own `timestamp`, or of the `timestamp` inside a
/// JSON-encoded `body`, which takes precedence when present.
fn record_month(record: &FeatureRecord) -> Option<u32> {
    let from_body = match record.get("body") {
        Some(Value::String(body)) => serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|b| b.get("timestamp").cloned()),
        _ => None,
    };
    from_body
        .as_ref()
        .or_else(|| record.get("timestamp"))
        .and_then(timestamp_month)
}

/// 1-based position of the strictly greatest member of a one-hot group,
/// first wins on ties; 0 when no member is positive.
fn onehot_index(record: &FeatureRecord, group: &[&str]) -> usize {
    let mut best = f64::NEG_INFINITY;
    let mut index = 0;
    for (i, key) in group.iter().enumerate() {
        let value = lenient_float(record.get(*key));
        if value > best {
            best = value;
            index = i + 1;
        }
    }
    if best > 0.0 {
        index
    } else {
        0
    }
}

fn voltage_flag(record: &FeatureRecord, range: std::ops::Range<f64>) -> Value {
    let volts = lenient_float(record.get("voltage_v"));
    Value::from(u8::from(range.contains(&volts)))
}
