//! Artifact Cache
//!
//! Model, scaler and feature-list artifacts live in remote storage and are
//! copied into a local cache directory on first use. A non-empty local copy
//! is trusted as-is: there is no freshness or checksum check against the
//! remote object.
//!
//! - [`ArtifactStore`]: narrow fetch contract over the remote backing store
//! - [`ArtifactCache`]: `ensure_local` over a cache directory
//! - [`ModelLoader`]: deserializes and memoizes the loaded objects for the
//!   lifetime of the process

pub mod cache;
pub mod loader;
pub mod store;

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;
use url::Url;

use crate::models::FormatVersion;

pub use cache::ArtifactCache;
pub use loader::{LoadedModels, ModelArtifacts, ModelLoader};
pub use store::{ArtifactStore, HttpArtifactStore, S3ArtifactStore, StoreError};

/// Where an artifact lives remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactLocation {
    /// Bucket and object key in the object store.
    Object { bucket: String, key: String },
    /// Plain HTTPS URL (public or pre-signed).
    Url(Url),
}

impl fmt::Display for ArtifactLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactLocation::Object { bucket, key } => write!(f, "s3://{bucket}/{key}"),
            ArtifactLocation::Url(url) => write!(f, "{url}"),
        }
    }
}

/// A named artifact: remote location plus the file name used in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSpec {
    pub name: String,
    pub location: ArtifactLocation,
    pub file_name: String,
}

impl ArtifactSpec {
    /// Object-store artifact cached under the key's last path segment.
    pub fn object(name: impl Into<String>, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        let key = key.into();
        let file_name = file_name_of(&key);
        Self {
            name: name.into(),
            location: ArtifactLocation::Object {
                bucket: bucket.into(),
                key,
            },
            file_name,
        }
    }

    /// URL artifact cached under the URL path's last segment.
    pub fn url(name: impl Into<String>, url: Url) -> Self {
        let file_name = file_name_of(url.path());
        Self {
            name: name.into(),
            location: ArtifactLocation::Url(url),
            file_name,
        }
    }
}

fn file_name_of(path: &str) -> String {
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or("artifact")
        .to_string()
}

/// Errors raised while making an artifact available locally or loading it.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Failed to fetch artifact '{name}' from {location}: {source}")]
    Fetch {
        name: String,
        location: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to cache artifact '{name}' at {path}: {source}")]
    Io {
        name: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Artifact '{name}' is corrupt: {message}")]
    Corrupt { name: String, message: String },

    #[error("Artifact '{name}' has format version {found}, but at least {required} is required")]
    Incompatible {
        name: String,
        found: FormatVersion,
        required: FormatVersion,
    },
}
