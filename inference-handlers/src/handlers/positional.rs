//! Shared core of the single-vector predictors.
//!
//! These load their artifacts before looking at the event, then classify one
//! positional feature vector matched to the model's columns by position only.

use ndarray::Array2;
use serde_json::{json, Value};
use tracing::instrument;

use crate::artifacts::ModelLoader;
use crate::error::HandlerError;
use crate::features::{parse_positional, FeatureError};
use crate::predictor::{LabelTable, Prediction, PredictionDispatcher};
use crate::response::LambdaResponse;

pub struct PositionalPredictor {
    loader: ModelLoader,
    labels: LabelTable,
    accept_records: bool,
}

impl PositionalPredictor {
    pub fn new(loader: ModelLoader, labels: LabelTable, accept_records: bool) -> Self {
        Self {
            loader,
            labels,
            accept_records,
        }
    }

    pub fn loader(&self) -> &ModelLoader {
        &self.loader
    }

    #[instrument(skip(self, event))]
    pub async fn predict(&self, event: &Value) -> Result<Prediction, HandlerError> {
        let models = self.loader.get().await?;

        let row = parse_positional(event, self.accept_records)?;
        let width = row.len();
        let x = Array2::from_shape_vec((1, width), row)
            .map_err(|e| FeatureError::InvalidInputShape(e.to_string()))?;

        let dispatcher = PredictionDispatcher::new(models.classifier.as_ref(), models.scaler.as_deref(), self.labels);
        dispatcher
            .predict(x.view())?
            .into_iter()
            .next()
            .ok_or_else(|| FeatureError::InvalidInputShape("no prediction produced".to_string()).into())
    }
}

/// `{ok: false, error, error_code}` with the error's status.
pub(crate) fn render_failure(error: &HandlerError) -> LambdaResponse {
    LambdaResponse::json(
        error.status_code(),
        &json!({
            "ok": false,
            "error": error.to_string(),
            "error_code": error.code(),
        }),
    )
}
