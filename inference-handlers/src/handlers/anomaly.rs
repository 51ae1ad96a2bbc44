//! Anomaly predictor handler.
//!
//! Full pipeline: normalize named records, reconcile them against the model's
//! expected columns, scale, classify, and return one result per record.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use super::{Handler, HandlerKind};
use crate::artifacts::{ArtifactCache, ModelLoader, S3ArtifactStore};
use crate::config::AnomalyConfig;
use crate::error::HandlerError;
use crate::features::{parse_named, FeatureReconciler};
use crate::predictor::{LabelTable, Prediction, PredictionDispatcher};
use crate::response::LambdaResponse;

/// One entry of the success `results` array.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyResult {
    pub label: i64,
    pub label_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prob_normal: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prob_anormal: Option<f64>,
}

impl From<Prediction> for AnomalyResult {
    fn from(p: Prediction) -> Self {
        Self {
            label: p.label,
            label_name: p.label_name,
            prob_normal: p.probabilities.map(|pr| pr.negative),
            prob_anormal: p.probabilities.map(|pr| pr.positive),
        }
    }
}

pub struct AnomalyHandler {
    loader: ModelLoader,
    clock: fn() -> DateTime<Utc>,
}

impl AnomalyHandler {
    pub fn new(loader: ModelLoader) -> Self {
        Self {
            loader,
            clock: Utc::now,
        }
    }

    /// Handler backed by the object store described by `config`.
    pub async fn from_config(config: &AnomalyConfig) -> Self {
        let store = S3ArtifactStore::for_region(config.region.clone()).await;
        let cache = ArtifactCache::new(Arc::new(store), config.artifacts.cache_dir.clone());
        Self::new(ModelLoader::new(
            cache,
            config.model_artifacts(),
            config.artifacts.min_version,
        ))
    }

    /// Clock used when a `Month` column has to be derived without a timestamp.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn loader(&self) -> &ModelLoader {
        &self.loader
    }

    #[instrument(skip(self, event))]
    pub async fn predict(&self, event: &Value) -> Result<Vec<AnomalyResult>, HandlerError> {
        let records = parse_named(event)?;
        let models = self.loader.get().await?;

        let reconciler = FeatureReconciler::new(models.expected_columns.as_ref()).with_clock(self.clock);
        let matrix = reconciler.reconcile_all(&records)?;
        debug!(
            records = records.len(),
            columns = matrix.ncols(),
            column_source = ?models.expected_columns.as_ref().map(|c| c.source),
            "Reconciled records"
        );

        let dispatcher = PredictionDispatcher::new(
            models.classifier.as_ref(),
            models.scaler.as_deref(),
            LabelTable::ANOMALY,
        );
        Ok(dispatcher
            .predict(matrix.view())?
            .into_iter()
            .map(AnomalyResult::from)
            .collect())
    }
}

#[async_trait]
impl Handler for AnomalyHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Anomaly
    }

    async fn execute(&self, event: &Value) -> Result<LambdaResponse, HandlerError> {
        let results = self.predict(event).await?;
        Ok(LambdaResponse::ok(&json!({
            "ok": true,
            "count": results.len(),
            "results": results,
        })))
    }

    fn render_error(&self, error: &HandlerError) -> LambdaResponse {
        LambdaResponse::json(
            error.status_code(),
            &json!({
                "ok": false,
                "error": error.to_string(),
                "error_code": error.code(),
                "error_chain": error.chain(),
                "runtime": {
                    "service": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
        )
    }
}
