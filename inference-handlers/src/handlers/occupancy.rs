//! Occupancy predictor handler.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use super::positional::{render_failure, PositionalPredictor};
use super::{Handler, HandlerKind};
use crate::artifacts::{ArtifactCache, ModelLoader, S3ArtifactStore};
use crate::config::OccupancyConfig;
use crate::error::HandlerError;
use crate::predictor::{LabelTable, Prediction};
use crate::response::LambdaResponse;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OccupancyResult {
    pub label: i64,
    pub label_name: String,
    pub prob_unoccupied: Option<f64>,
    pub prob_occupied: Option<f64>,
}

impl From<Prediction> for OccupancyResult {
    fn from(p: Prediction) -> Self {
        Self {
            label: p.label,
            label_name: p.label_name,
            prob_unoccupied: p.probabilities.map(|pr| pr.negative),
            prob_occupied: p.probabilities.map(|pr| pr.positive),
        }
    }
}

pub struct OccupancyHandler {
    predictor: PositionalPredictor,
}

impl OccupancyHandler {
    pub fn new(loader: ModelLoader) -> Self {
        Self {
            predictor: PositionalPredictor::new(loader, LabelTable::OCCUPANCY, false),
        }
    }

    pub async fn from_config(config: &OccupancyConfig) -> Self {
        let store = S3ArtifactStore::for_region(config.region.clone()).await;
        let cache = ArtifactCache::new(Arc::new(store), config.artifacts.cache_dir.clone());
        Self::new(ModelLoader::new(
            cache,
            config.model_artifacts(),
            config.artifacts.min_version,
        ))
    }

    pub fn loader(&self) -> &ModelLoader {
        self.predictor.loader()
    }
}

#[async_trait]
impl Handler for OccupancyHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Occupancy
    }

    async fn execute(&self, event: &Value) -> Result<LambdaResponse, HandlerError> {
        let result = OccupancyResult::from(self.predictor.predict(event).await?);
        Ok(LambdaResponse::ok(&json!({"ok": true, "results": [result]})))
    }

    fn render_error(&self, error: &HandlerError) -> LambdaResponse {
        render_failure(error)
    }
}
