//! Load-once model registry.
//!
//! The classifier, scaler and expected-column list are loaded on the first
//! request a process serves and reused by every later request. Hosts run one
//! request per process at a time; the cell still serializes concurrent first
//! callers if the crate is driven from a multi-threaded host, and the first
//! successful load wins. A failed load leaves the cell empty so the next
//! request starts over.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;
use tracing::{info, instrument, warn};

use super::{ArtifactCache, ArtifactError, ArtifactSpec};
use crate::features::{ColumnSource, ExpectedColumns};
use crate::models::{
    Classifier, ClassifierArtifact, FormatVersion, ModelError, Scaler, ScalerArtifact,
};

/// Remote artifacts backing one predictor.
#[derive(Debug, Clone)]
pub struct ModelArtifacts {
    pub classifier: ArtifactSpec,
    pub scaler: Option<ArtifactSpec>,
    pub feature_list: Option<ArtifactSpec>,
}

impl ModelArtifacts {
    fn all(&self) -> impl Iterator<Item = &ArtifactSpec> {
        std::iter::once(&self.classifier)
            .chain(self.scaler.as_ref())
            .chain(self.feature_list.as_ref())
    }
}

/// In-memory objects shared by every request of the process.
pub struct LoadedModels {
    pub classifier: Arc<dyn Classifier>,
    pub scaler: Option<Arc<dyn Scaler>>,
    /// `None` when neither a feature list nor model metadata names the columns.
    pub expected_columns: Option<ExpectedColumns>,
}

impl LoadedModels {
    /// Resolve the expected columns: explicit feature list first, then the
    /// scaler's fitted names, then the classifier's.
    pub fn new(
        classifier: Arc<dyn Classifier>,
        scaler: Option<Arc<dyn Scaler>>,
        feature_list: Option<Vec<String>>,
    ) -> Self {
        let expected_columns = feature_list
            .map(|columns| ExpectedColumns::new(columns, ColumnSource::FeatureList))
            .or_else(|| {
                scaler
                    .as_ref()
                    .and_then(|s| s.feature_names_in())
                    .map(|names| ExpectedColumns::new(names.to_vec(), ColumnSource::ScalerMetadata))
            })
            .or_else(|| {
                classifier
                    .feature_names_in()
                    .map(|names| ExpectedColumns::new(names.to_vec(), ColumnSource::ClassifierMetadata))
            });

        Self {
            classifier,
            scaler,
            expected_columns,
        }
    }
}

trait VersionedArtifact: DeserializeOwned {
    fn format_version(&self) -> FormatVersion;
    fn validate(&self) -> Result<(), ModelError>;
}

impl VersionedArtifact for ScalerArtifact {
    fn format_version(&self) -> FormatVersion {
        self.format_version
    }

    fn validate(&self) -> Result<(), ModelError> {
        ScalerArtifact::validate(self)
    }
}

impl VersionedArtifact for ClassifierArtifact {
    fn format_version(&self) -> FormatVersion {
        self.format_version
    }

    fn validate(&self) -> Result<(), ModelError> {
        ClassifierArtifact::validate(self)
    }
}

/// Fetches, deserializes and memoizes a predictor's artifacts.
pub struct ModelLoader {
    cache: ArtifactCache,
    artifacts: ModelArtifacts,
    min_version: FormatVersion,
    loaded: OnceCell<Arc<LoadedModels>>,
}

impl ModelLoader {
    pub fn new(cache: ArtifactCache, artifacts: ModelArtifacts, min_version: FormatVersion) -> Self {
        Self {
            cache,
            artifacts,
            min_version,
            loaded: OnceCell::new(),
        }
    }

    /// Loader whose models are already in memory; nothing is fetched.
    pub fn preloaded(cache: ArtifactCache, artifacts: ModelArtifacts, models: LoadedModels) -> Self {
        Self {
            cache,
            artifacts,
            min_version: FormatVersion::default(),
            loaded: OnceCell::new_with(Some(Arc::new(models))),
        }
    }

    pub fn artifacts(&self) -> &ModelArtifacts {
        &self.artifacts
    }

    /// The process-wide loaded models, loading them on first call.
    pub async fn get(&self) -> Result<Arc<LoadedModels>, ArtifactError> {
        self.loaded
            .get_or_try_init(|| self.load())
            .await
            .map(Arc::clone)
    }

    /// Ensure every artifact is in the local cache without deserializing it.
    pub async fn prefetch(&self) -> Result<Vec<PathBuf>, ArtifactError> {
        let mut paths = Vec::new();
        for spec in self.artifacts.all() {
            paths.push(self.cache.ensure_local(spec).await?);
        }
        Ok(paths)
    }

    #[instrument(skip(self), fields(classifier = %self.artifacts.classifier.name))]
    async fn load(&self) -> Result<Arc<LoadedModels>, ArtifactError> {
        let classifier: ClassifierArtifact = self.load_artifact(&self.artifacts.classifier).await?;

        let scaler = match &self.artifacts.scaler {
            Some(spec) => Some(self.load_artifact::<ScalerArtifact>(spec).await?),
            None => None,
        };

        let feature_list = match &self.artifacts.feature_list {
            Some(spec) => {
                let path = self.cache.ensure_local(spec).await?;
                read_feature_list(&spec.name, &path).await
            }
            None => None,
        };

        let models = LoadedModels::new(
            Arc::new(classifier),
            scaler.map(|s| Arc::new(s) as Arc<dyn Scaler>),
            feature_list,
        );

        info!(
            has_scaler = models.scaler.is_some(),
            expected_columns = models.expected_columns.as_ref().map(|c| c.len()),
            column_source = ?models.expected_columns.as_ref().map(|c| c.source),
            "Model artifacts loaded"
        );

        Ok(Arc::new(models))
    }

    async fn load_artifact<T: VersionedArtifact>(&self, spec: &ArtifactSpec) -> Result<T, ArtifactError> {
        let path = self.cache.ensure_local(spec).await?;
        let corrupt = |message: String| ArtifactError::Corrupt {
            name: spec.name.clone(),
            message,
        };

        let bytes = tokio::fs::read(&path).await.map_err(|source| ArtifactError::Io {
            name: spec.name.clone(),
            path: path.clone(),
            source,
        })?;
        let artifact: T = serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;

        if artifact.format_version() < self.min_version {
            return Err(ArtifactError::Incompatible {
                name: spec.name.clone(),
                found: artifact.format_version(),
                required: self.min_version,
            });
        }
        artifact.validate().map_err(|e| corrupt(e.to_string()))?;
        Ok(artifact)
    }
}

/// A feature list that cannot be read or parsed is ignored so the metadata
/// fallbacks apply.
async fn read_feature_list(name: &str, path: &Path) -> Option<Vec<String>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) if !bytes.is_empty() => bytes,
        Ok(_) => return None,
        Err(e) => {
            warn!(artifact = name, error = %e, "Feature list unreadable, falling back to model metadata");
            return None;
        }
    };
    match serde_json::from_slice::<Vec<String>>(&bytes) {
        Ok(columns) => Some(columns),
        Err(e) => {
            warn!(artifact = name, error = %e, "Feature list is not a list of names, falling back to model metadata");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{ArtifactLocation, ArtifactStore, StoreError};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MapStore {
        objects: HashMap<String, Vec<u8>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ArtifactStore for MapStore {
        async fn fetch(&self, location: &ArtifactLocation) -> Result<Vec<u8>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let ArtifactLocation::Object { key, .. } = location else {
                return Err(StoreError::UnsupportedLocation(location.to_string()));
            };
            self.objects
                .get(key)
                .cloned()
                .ok_or_else(|| StoreError::Request(format!("NoSuchKey: {key}")))
        }
    }

    fn classifier_json(version: &str, names: Option<Vec<&str>>) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "format_version": version,
            "kind": "logistic_regression",
            "feature_names_in": names,
            "classes": [0, 1],
            "coef": [[1.0, -1.0]],
            "intercept": [0.0]
        }))
        .unwrap()
    }

    fn scaler_json(names: Option<Vec<&str>>) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "format_version": "1.0",
            "kind": "standard",
            "feature_names_in": names,
            "mean": [0.0, 0.0],
            "scale": [1.0, 1.0]
        }))
        .unwrap()
    }

    fn build_loader(objects: Vec<(&str, Vec<u8>)>, with_features: bool) -> (ModelLoader, Arc<MapStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MapStore {
            objects: objects.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            calls: AtomicUsize::new(0),
        });
        let cache = ArtifactCache::new(store.clone(), dir.path());
        let artifacts = ModelArtifacts {
            classifier: ArtifactSpec::object("model", "bucket", "model.json"),
            scaler: Some(ArtifactSpec::object("scaler", "bucket", "scaler.json")),
            feature_list: with_features.then(|| ArtifactSpec::object("features", "bucket", "features.json")),
        };
        (ModelLoader::new(cache, artifacts, FormatVersion::new(1, 0)), store, dir)
    }

    #[tokio::test]
    async fn test_feature_list_wins_over_metadata() {
        let (loader, _, _dir) = build_loader(
            vec![
                ("model.json", classifier_json("1.0", Some(vec!["m1", "m2"]))),
                ("scaler.json", scaler_json(Some(vec!["s1", "s2"]))),
                ("features.json", br#"["f1", "f2"]"#.to_vec()),
            ],
            true,
        );
        let models = loader.get().await.unwrap();
        let expected = models.expected_columns.as_ref().unwrap();
        assert_eq!(expected.source, ColumnSource::FeatureList);
        assert_eq!(expected.columns(), ["f1", "f2"]);
    }

    #[tokio::test]
    async fn test_malformed_feature_list_falls_back_to_scaler() {
        let (loader, _, _dir) = build_loader(
            vec![
                ("model.json", classifier_json("1.0", Some(vec!["m1", "m2"]))),
                ("scaler.json", scaler_json(Some(vec!["s1", "s2"]))),
                ("features.json", br#"{"not": "a list"}"#.to_vec()),
            ],
            true,
        );
        let models = loader.get().await.unwrap();
        let expected = models.expected_columns.as_ref().unwrap();
        assert_eq!(expected.source, ColumnSource::ScalerMetadata);
        assert_eq!(expected.columns(), ["s1", "s2"]);
    }

    #[tokio::test]
    async fn test_classifier_metadata_then_none() {
        let (loader, _, _dir) = build_loader(
            vec![
                ("model.json", classifier_json("1.0", Some(vec!["m1", "m2"]))),
                ("scaler.json", scaler_json(None)),
            ],
            false,
        );
        let models = loader.get().await.unwrap();
        assert_eq!(
            models.expected_columns.as_ref().unwrap().source,
            ColumnSource::ClassifierMetadata
        );

        let (loader, _, _dir) = build_loader(
            vec![
                ("model.json", classifier_json("1.0", None)),
                ("scaler.json", scaler_json(None)),
            ],
            false,
        );
        assert!(loader.get().await.unwrap().expected_columns.is_none());
    }

    #[tokio::test]
    async fn test_models_are_memoized() {
        let (loader, store, _dir) = build_loader(
            vec![
                ("model.json", classifier_json("1.0", None)),
                ("scaler.json", scaler_json(None)),
            ],
            false,
        );
        let first = loader.get().await.unwrap();
        let second = loader.get().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_old_format_version_is_incompatible() {
        let (loader, _, _dir) = build_loader(
            vec![
                ("model.json", classifier_json("0.9", None)),
                ("scaler.json", scaler_json(None)),
            ],
            false,
        );
        let err = loader.get().await.err().unwrap();
        assert!(matches!(err, ArtifactError::Incompatible { .. }));
    }

    #[tokio::test]
    async fn test_missing_remote_object_fails_then_retries_next_call() {
        let (loader, store, _dir) = build_loader(vec![("model.json", classifier_json("1.0", None))], false);
        assert!(matches!(loader.get().await.err().unwrap(), ArtifactError::Fetch { .. }));
        assert!(loader.get().await.is_err());
        // Classifier is cached after the first attempt; the scaler is fetched each time.
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_prefetch_caches_every_artifact() {
        let (loader, _, dir) = build_loader(
            vec![
                ("model.json", classifier_json("1.0", None)),
                ("scaler.json", scaler_json(None)),
                ("features.json", br#"["a"]"#.to_vec()),
            ],
            true,
        );
        let paths = loader.prefetch().await.unwrap();
        assert_eq!(paths.len(), 3);
        assert!(dir.path().join("features.json").exists());
    }
}
