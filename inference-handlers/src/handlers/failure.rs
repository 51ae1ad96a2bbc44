//! Legacy failure predictor handler.
//!
//! Artifacts come from plain HTTPS URLs. The first record of a `records`
//! batch is read positionally, in document order.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use super::positional::{render_failure, PositionalPredictor};
use super::{Handler, HandlerKind};
use crate::artifacts::{ArtifactCache, HttpArtifactStore, ModelLoader};
use crate::config::FailureConfig;
use crate::error::HandlerError;
use crate::predictor::{LabelTable, Prediction};
use crate::response::LambdaResponse;

/// Probabilities are `null` when the classifier exposes none.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureResult {
    pub label: i64,
    pub prob_normal: Option<f64>,
    pub prob_anormal: Option<f64>,
}

impl From<Prediction> for FailureResult {
    fn from(p: Prediction) -> Self {
        Self {
            label: p.label,
            prob_normal: p.probabilities.map(|pr| pr.negative),
            prob_anormal: p.probabilities.map(|pr| pr.positive),
        }
    }
}

pub struct FailureHandler {
    predictor: PositionalPredictor,
}

impl FailureHandler {
    pub fn new(loader: ModelLoader) -> Self {
        Self {
            predictor: PositionalPredictor::new(loader, LabelTable::ANOMALY, true),
        }
    }

    pub fn from_config(config: &FailureConfig) -> Result<Self, HandlerError> {
        let store = HttpArtifactStore::new(config.timeout)
            .map_err(|e| HandlerError::Configuration(e.to_string()))?;
        let cache = ArtifactCache::new(Arc::new(store), config.artifacts.cache_dir.clone());
        Ok(Self::new(ModelLoader::new(
            cache,
            config.model_artifacts(),
            config.artifacts.min_version,
        )))
    }

    pub fn loader(&self) -> &ModelLoader {
        self.predictor.loader()
    }
}

#[async_trait]
impl Handler for FailureHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Failure
    }

    async fn execute(&self, event: &Value) -> Result<LambdaResponse, HandlerError> {
        let result = FailureResult::from(self.predictor.predict(event).await?);
        Ok(LambdaResponse::ok(&json!({"ok": true, "results": [result]})))
    }

    fn render_error(&self, error: &HandlerError) -> LambdaResponse {
        render_failure(error)
    }
}
