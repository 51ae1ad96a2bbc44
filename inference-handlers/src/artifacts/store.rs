//! Remote artifact stores.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

use super::ArtifactLocation;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Request error: {0}")]
    Request(String),

    #[error("Response error: status={status}")]
    Status { status: u16 },

    #[error("Unsupported location for this store: {0}")]
    UnsupportedLocation(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => StoreError::Status {
                status: status.as_u16(),
            },
            None => StoreError::Request(err.to_string()),
        }
    }
}

/// Read-only access to the remote backing store.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Fetch the complete remote object.
    async fn fetch(&self, location: &ArtifactLocation) -> Result<Vec<u8>, StoreError>;
}

/// Object-store backend.
#[derive(Clone)]
pub struct S3ArtifactStore {
    client: aws_sdk_s3::Client,
}

impl S3ArtifactStore {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }

    /// Build a client from the ambient credential chain for `region`.
    pub async fn for_region(region: impl Into<String>) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.into()))
            .load()
            .await;
        Self::new(aws_sdk_s3::Client::new(&config))
    }
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    #[instrument(skip(self), fields(location = %location))]
    async fn fetch(&self, location: &ArtifactLocation) -> Result<Vec<u8>, StoreError> {
        let ArtifactLocation::Object { bucket, key } = location else {
            return Err(StoreError::UnsupportedLocation(location.to_string()));
        };

        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StoreError::Request(DisplayErrorContext(&e).to_string()))?;

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?
            .into_bytes();

        debug!(bytes = bytes.len(), "Fetched object");
        Ok(bytes.to_vec())
    }
}

/// Plain HTTPS backend for public or pre-signed URLs.
#[derive(Clone)]
pub struct HttpArtifactStore {
    client: Client,
}

impl HttpArtifactStore {
    pub fn new(timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Request(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ArtifactStore for HttpArtifactStore {
    #[instrument(skip(self), fields(location = %location))]
    async fn fetch(&self, location: &ArtifactLocation) -> Result<Vec<u8>, StoreError> {
        let ArtifactLocation::Url(url) = location else {
            return Err(StoreError::UnsupportedLocation(location.to_string()));
        };

        let response = self.client.get(url.clone()).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;

        debug!(bytes = bytes.len(), "Fetched URL");
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_http_store_rejects_object_location() {
        let store = HttpArtifactStore::new(Duration::from_secs(1)).unwrap();
        let location = ArtifactLocation::Object {
            bucket: "b".into(),
            key: "k".into(),
        };
        let err = store.fetch(&location).await.unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedLocation(_)));
    }
}
