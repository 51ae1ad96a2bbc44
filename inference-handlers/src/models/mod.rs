//! Model Collaborators
//!
//! The scaler and classifier are opaque numeric transforms as far as the
//! handlers are concerned: they are reached through the [`Scaler`] and
//! [`Classifier`] traits only. Production objects are deserialized from JSON
//! artifacts ([`ScalerArtifact`], [`ClassifierArtifact`]); tests plug in fakes.

pub mod forest;
pub mod linear;
pub mod scaler;

use std::fmt;

use ndarray::{Array2, ArrayView2};
use serde::Deserialize;
use thiserror::Error;

pub use forest::{DecisionTree, RandomForest};
pub use linear::{LinearSvc, LogisticRegression};
pub use scaler::{MinMaxScaler, StandardScaler};

/// Errors reported by a scaler or classifier.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelError {
    #[error("X has {actual} features, but {model} is expecting {expected} features as input")]
    ShapeMismatch {
        model: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Input contains NaN or infinity at row {row}, column {column}")]
    NonFiniteInput { row: usize, column: usize },

    #[error("{model} produced a non-finite value")]
    NonFiniteOutput { model: &'static str },

    #[error("Invalid {model} parameters: {message}")]
    InvalidParameters { model: &'static str, message: String },

    #[error("{model} does not expose class probabilities")]
    ProbabilitiesUnsupported { model: &'static str },
}

impl ModelError {
    /// True when the failure was caused by the shape or content of the input
    /// matrix rather than by the model itself.
    pub fn is_input_fault(&self) -> bool {
        matches!(
            self,
            ModelError::ShapeMismatch { .. } | ModelError::NonFiniteInput { .. }
        )
    }

    pub(crate) fn invalid(model: &'static str, message: impl Into<String>) -> Self {
        ModelError::InvalidParameters {
            model,
            message: message.into(),
        }
    }
}

/// A fitted feature transform applied to the whole matrix in one call.
pub trait Scaler: Send + Sync {
    /// Number of columns the scaler was fitted on.
    fn n_features_in(&self) -> usize;

    /// Column names the scaler was fitted on, when recorded.
    fn feature_names_in(&self) -> Option<&[String]> {
        None
    }

    fn transform(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, ModelError>;
}

/// A fitted classifier.
pub trait Classifier: Send + Sync {
    /// Class labels in column order of [`Classifier::predict_proba`].
    fn classes(&self) -> &[i64];

    fn n_features_in(&self) -> usize;

    fn feature_names_in(&self) -> Option<&[String]> {
        None
    }

    /// Discrete prediction per row.
    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Vec<i64>, ModelError>;

    /// Whether [`Classifier::predict_proba`] is available at all.
    fn supports_probabilities(&self) -> bool {
        true
    }

    /// One row per input row, one column per entry of [`Classifier::classes`].
    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, ModelError>;
}

/// `major.minor` version stamped on every artifact.
///
/// Unparseable strings compare as `0.0` so they fail any minimum requirement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(from = "String")]
pub struct FormatVersion {
    pub major: u32,
    pub minor: u32,
}

impl FormatVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    pub fn parse(raw: &str) -> Self {
        let mut parts = raw.trim().split('.');
        let major = parts.next().and_then(|p| p.parse().ok());
        let minor = parts.next().and_then(|p| p.parse().ok());
        match (major, minor) {
            (Some(major), Some(minor)) => Self { major, minor },
            _ => Self::default(),
        }
    }
}

impl From<String> for FormatVersion {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Serialized scaler as stored in the artifact bucket.
#[derive(Debug, Clone, Deserialize)]
pub struct ScalerArtifact {
    pub format_version: FormatVersion,

    #[serde(default)]
    pub feature_names_in: Option<Vec<String>>,

    #[serde(flatten)]
    pub model: ScalerKind,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScalerKind {
    Standard(StandardScaler),
    MinMax(MinMaxScaler),
}

impl ScalerArtifact {
    /// Check internal consistency after deserialization.
    pub fn validate(&self) -> Result<(), ModelError> {
        match &self.model {
            ScalerKind::Standard(s) => s.validate()?,
            ScalerKind::MinMax(s) => s.validate()?,
        }
        check_feature_names("scaler", self.feature_names_in.as_deref(), self.n_features_in())
    }
}

impl Scaler for ScalerArtifact {
    fn n_features_in(&self) -> usize {
        match &self.model {
            ScalerKind::Standard(s) => s.n_features_in(),
            ScalerKind::MinMax(s) => s.n_features_in(),
        }
    }

    fn feature_names_in(&self) -> Option<&[String]> {
        self.feature_names_in.as_deref()
    }

    fn transform(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, ModelError> {
        match &self.model {
            ScalerKind::Standard(s) => s.transform(x),
            ScalerKind::MinMax(s) => s.transform(x),
        }
    }
}

/// Serialized classifier as stored in the artifact bucket.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierArtifact {
    pub format_version: FormatVersion,

    #[serde(default)]
    pub feature_names_in: Option<Vec<String>>,

    #[serde(flatten)]
    pub model: ClassifierKind,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierKind {
    RandomForest(RandomForest),
    LogisticRegression(LogisticRegression),
    LinearSvc(LinearSvc),
}

impl ClassifierArtifact {
    pub fn validate(&self) -> Result<(), ModelError> {
        match &self.model {
            ClassifierKind::RandomForest(m) => m.validate()?,
            ClassifierKind::LogisticRegression(m) => m.validate()?,
            ClassifierKind::LinearSvc(m) => m.validate()?,
        }
        check_feature_names("classifier", self.feature_names_in.as_deref(), self.n_features_in())
    }

    fn inner(&self) -> &dyn Classifier {
        match &self.model {
            ClassifierKind::RandomForest(m) => m,
            ClassifierKind::LogisticRegression(m) => m,
            ClassifierKind::LinearSvc(m) => m,
        }
    }
}

impl Classifier for ClassifierArtifact {
    fn classes(&self) -> &[i64] {
        self.inner().classes()
    }

    fn n_features_in(&self) -> usize {
        self.inner().n_features_in()
    }

    fn feature_names_in(&self) -> Option<&[String]> {
        self.feature_names_in.as_deref()
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Vec<i64>, ModelError> {
        self.inner().predict(x)
    }

    fn supports_probabilities(&self) -> bool {
        self.inner().supports_probabilities()
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, ModelError> {
        self.inner().predict_proba(x)
    }
}

fn check_feature_names(
    model: &'static str,
    names: Option<&[String]>,
    n_features: usize,
) -> Result<(), ModelError> {
    match names {
        Some(names) if names.len() != n_features => Err(ModelError::invalid(
            model,
            format!(
                "feature_names_in has {} entries for {} fitted features",
                names.len(),
                n_features
            ),
        )),
        _ => Ok(()),
    }
}

/// Reject matrices with the wrong column count or non-finite cells.
pub(crate) fn check_input(
    model: &'static str,
    x: ArrayView2<'_, f64>,
    expected: usize,
) -> Result<(), ModelError> {
    if x.ncols() != expected {
        return Err(ModelError::ShapeMismatch {
            model,
            expected,
            actual: x.ncols(),
        });
    }
    if let Some(((row, column), _)) = x.indexed_iter().find(|(_, v)| !v.is_finite()) {
        return Err(ModelError::NonFiniteInput { row, column });
    }
    Ok(())
}

/// Map each probability row to the class with the highest probability.
/// The first maximum wins on ties.
pub(crate) fn argmax_classes(proba: &Array2<f64>, classes: &[i64]) -> Vec<i64> {
    proba
        .rows()
        .into_iter()
        .map(|row| {
            let mut best = 0;
            for (idx, p) in row.iter().enumerate() {
                if *p > row[best] {
                    best = idx;
                }
            }
            classes[best]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_format_version_parse() {
        assert_eq!(FormatVersion::parse("1.2"), FormatVersion::new(1, 2));
        assert_eq!(FormatVersion::parse("2.0.7"), FormatVersion::new(2, 0));
        assert_eq!(FormatVersion::parse("garbage"), FormatVersion::new(0, 0));
        assert_eq!(FormatVersion::parse("3"), FormatVersion::new(0, 0));
        assert!(FormatVersion::new(1, 10) > FormatVersion::new(1, 9));
    }

    #[test]
    fn test_scaler_artifact_deserializes_tagged_kind() {
        let raw = r#"{
            "format_version": "1.0",
            "kind": "standard",
            "feature_names_in": ["a", "b"],
            "mean": [1.0, 2.0],
            "scale": [2.0, 4.0]
        }"#;
        let artifact: ScalerArtifact = serde_json::from_str(raw).unwrap();
        artifact.validate().unwrap();
        assert_eq!(artifact.n_features_in(), 2);
        assert_eq!(artifact.feature_names_in().unwrap(), ["a", "b"]);

        let out = artifact.transform(array![[3.0, 6.0]].view()).unwrap();
        assert_eq!(out, array![[1.0, 1.0]]);
    }

    #[test]
    fn test_feature_names_length_is_checked() {
        let raw = r#"{
            "format_version": "1.0",
            "kind": "standard",
            "feature_names_in": ["a"],
            "mean": [1.0, 2.0],
            "scale": [2.0, 4.0]
        }"#;
        let artifact: ScalerArtifact = serde_json::from_str(raw).unwrap();
        assert!(artifact.validate().is_err());
    }

    #[test]
    fn test_check_input_rejects_nan() {
        let x = array![[1.0, f64::NAN]];
        let err = check_input("scaler", x.view(), 2).unwrap_err();
        assert_eq!(err, ModelError::NonFiniteInput { row: 0, column: 1 });
        assert!(err.is_input_fault());
    }

    #[test]
    fn test_argmax_first_wins_on_tie() {
        let proba = array![[0.5, 0.5], [0.2, 0.8]];
        assert_eq!(argmax_classes(&proba, &[0, 1]), vec![0, 1]);
    }
}
