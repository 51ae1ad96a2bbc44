//! Prediction Dispatcher
//!
//! Scales a reconciled matrix, runs the classifier and shapes each row into a
//! [`Prediction`] with a label name and, for binary probability-capable
//! models, both class probabilities.

use ndarray::{Array2, ArrayView2, CowArray};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::error::HandlerError;
use crate::models::{Classifier, Scaler};

/// Class index treated as the positive class of a binary model.
const POSITIVE_CLASS: i64 = 1;

/// Fixed label to name lookup.
#[derive(Debug, Clone, Copy)]
pub struct LabelTable(&'static [(i64, &'static str)]);

impl LabelTable {
    pub const ANOMALY: LabelTable = LabelTable(&[(0, "normal"), (1, "anormal")]);
    pub const OCCUPANCY: LabelTable = LabelTable(&[(0, "Unoccupied"), (1, "Occupied")]);
    pub const EMPTY: LabelTable = LabelTable(&[]);

    pub const fn new(entries: &'static [(i64, &'static str)]) -> Self {
        Self(entries)
    }

    /// Name for `label`, or the label itself rendered as a string.
    pub fn name(&self, label: i64) -> String {
        self.0
            .iter()
            .find(|(l, _)| *l == label)
            .map_or_else(|| label.to_string(), |(_, name)| (*name).to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BinaryProbabilities {
    /// Probability of class 0
    pub negative: f64,
    /// Probability of class 1
    pub positive: f64,
}

/// Result for one input row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub label: i64,
    pub label_name: String,
    pub probabilities: Option<BinaryProbabilities>,
}

/// Applies an optional scaler and a classifier to whole matrices.
pub struct PredictionDispatcher<'a> {
    scaler: Option<&'a dyn Scaler>,
    classifier: &'a dyn Classifier,
    labels: LabelTable,
}

impl<'a> PredictionDispatcher<'a> {
    pub fn new(classifier: &'a dyn Classifier, scaler: Option<&'a dyn Scaler>, labels: LabelTable) -> Self {
        Self {
            scaler,
            classifier,
            labels,
        }
    }

    /// Predict every row of `x`. Scaling and discrete prediction failures are
    /// fatal; a probability failure degrades to label-only results.
    #[instrument(skip(self, x), fields(rows = x.nrows(), cols = x.ncols()))]
    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Vec<Prediction>, HandlerError> {
        let matrix: CowArray<'_, f64, _> = match self.scaler {
            Some(scaler) => CowArray::from(scaler.transform(x).map_err(HandlerError::Scaling)?),
            None => CowArray::from(x),
        };
        let scaled = matrix.view();

        let labels = self.classifier.predict(scaled).map_err(HandlerError::Prediction)?;
        let probabilities = self.binary_probabilities(scaled);
        debug!(with_probabilities = probabilities.is_some(), "Prediction complete");

        Ok(labels
            .into_iter()
            .enumerate()
            .map(|(row, label)| Prediction {
                label,
                label_name: self.labels.name(label),
                probabilities: probabilities.as_ref().map(|p| p[row]),
            })
            .collect())
    }

    /// Per-row probabilities when the classifier is binary, exposes
    /// probabilities, and includes the positive class.
    fn binary_probabilities(&self, x: ArrayView2<'_, f64>) -> Option<Vec<BinaryProbabilities>> {
        if !self.classifier.supports_probabilities() {
            return None;
        }
        let classes = self.classifier.classes();
        if classes.len() != 2 {
            return None;
        }
        let positive = classes.iter().position(|c| *c == POSITIVE_CLASS)?;

        let proba: Array2<f64> = match self.classifier.predict_proba(x) {
            Ok(proba) => proba,
            Err(e) => {
                warn!(error = %e, "predict_proba failed, returning labels only");
                return None;
            }
        };

        Some(
            proba
                .column(positive)
                .iter()
                .map(|p1| BinaryProbabilities {
                    negative: 1.0 - p1,
                    positive: *p1,
                })
                .collect(),
        )
    }
}
