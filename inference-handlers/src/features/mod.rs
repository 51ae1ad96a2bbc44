//! Feature Normalization and Reconciliation
//!
//! Incoming events are normalized into flat [`FeatureRecord`]s (or, for the
//! legacy predictors, a single positional vector) and then reconciled against
//! the column list the scaler and classifier were fitted on.

pub mod coerce;
pub mod normalizer;
pub mod reconciler;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

pub use normalizer::{parse_named, parse_positional};
pub use reconciler::FeatureReconciler;

/// One entity to classify: feature name to scalar value.
pub type FeatureRecord = Map<String, Value>;

/// Column order used when no feature list or model metadata is available.
pub const FEATURES: [&str; 26] = [
    "power_w",
    "voltage_v",
    "current_a",
    "relay_on",
    "energy_wh_acc",
    "presence",
    "presence_confidence",
    "temp_c_avg",
    "Bracker_amp",
    "max_watts",
    "power_rate",
    "hour",
    "is_daytime",
    "weekday",
    "voltage_type",
    "area_1",
    "area_2",
    "area_3",
    "device_type_1",
    "device_type_2",
    "device_type_3",
    "device_type_4",
    "device_type_5",
    "device_type_6",
    "device_type_7",
    "device_type_8",
];

/// `(alias, canonical)` spellings accepted for the same column.
pub const FEATURE_ALIASES: [(&str, &str); 2] = [
    ("Breaker_amp", "Bracker_amp"),
    ("breaker_amp", "Bracker_amp"),
];

/// True for any canonical feature name or alias.
pub fn is_known_feature(name: &str) -> bool {
    FEATURES.contains(&name) || FEATURE_ALIASES.iter().any(|(alias, _)| *alias == name)
}

/// Where the expected column list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnSource {
    FeatureList,
    ScalerMetadata,
    ClassifierMetadata,
}

/// Exact ordered columns a scaler/classifier was fitted against.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectedColumns {
    columns: Vec<String>,
    pub source: ColumnSource,
}

impl ExpectedColumns {
    pub fn new(columns: Vec<String>, source: ColumnSource) -> Self {
        Self { columns, source }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }
}

/// Caller-side failures while shaping a payload into features.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FeatureError {
    #[error("Invalid input shape: {0}")]
    InvalidInputShape(String),

    #[error("The scaler/model expects columns that were not provided: {missing:?}")]
    MissingFeatures { missing: Vec<String> },

    #[error("Feature '{feature}' {reason}")]
    InvalidFeatureValue { feature: String, reason: String },
}
