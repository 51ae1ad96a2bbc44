//! Local artifact cache directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, instrument};

use super::{ArtifactError, ArtifactSpec, ArtifactStore};

/// Ensures artifacts exist on local storage, fetching them on first use.
#[derive(Clone)]
pub struct ArtifactCache {
    store: Arc<dyn ArtifactStore>,
    cache_dir: PathBuf,
}

impl ArtifactCache {
    pub fn new(store: Arc<dyn ArtifactStore>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Local path the artifact is (or will be) cached at.
    pub fn local_path(&self, spec: &ArtifactSpec) -> PathBuf {
        self.cache_dir.join(&spec.file_name)
    }

    /// Return the local path of `spec`, fetching the remote object first when
    /// the local copy is absent or empty.
    ///
    /// The download lands in a sibling temp file and is renamed into place,
    /// so a failed fetch never leaves a truncated artifact behind.
    #[instrument(skip(self, spec), fields(artifact = %spec.name, location = %spec.location))]
    pub async fn ensure_local(&self, spec: &ArtifactSpec) -> Result<PathBuf, ArtifactError> {
        let path = self.local_path(spec);
        if is_non_empty_file(&path).await {
            return Ok(path);
        }

        let bytes = self
            .store
            .fetch(&spec.location)
            .await
            .map_err(|source| ArtifactError::Fetch {
                name: spec.name.clone(),
                location: spec.location.to_string(),
                source,
            })?;

        let io_err = |source| ArtifactError::Io {
            name: spec.name.clone(),
            path: path.clone(),
            source,
        };

        tokio::fs::create_dir_all(&self.cache_dir).await.map_err(io_err)?;
        let partial = path.with_file_name(format!("{}.partial", spec.file_name));
        let written = match tokio::fs::write(&partial, &bytes).await {
            Ok(()) => tokio::fs::rename(&partial, &path).await,
            Err(e) => Err(e),
        };
        if let Err(source) = written {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(io_err(source));
        }

        info!(bytes = bytes.len(), path = %path.display(), "Artifact cached");
        Ok(path)
    }
}

async fn is_non_empty_file(path: &Path) -> bool {
    matches!(tokio::fs::metadata(path).await, Ok(meta) if meta.is_file() && meta.len() > 0)
}
