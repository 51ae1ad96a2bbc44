//! Secrets Provider
//!
//! Resolves database credentials from a named secret.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_secretsmanager::error::DisplayErrorContext;
use serde::Deserialize;
use std::fmt;
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Debug, Error)]
pub enum SecretsError {
    #[error("Secret lookup failed for '{name}': {message}")]
    Lookup { name: String, message: String },

    #[error("Secret '{name}' has no string value")]
    MissingValue { name: String },

    #[error("Secret '{name}' is not valid credentials JSON: {source}")]
    Malformed {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Connection credentials stored as a JSON secret.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct DbCredentials {
    pub host: String,
    pub username: String,
    pub password: String,
    pub dbname: String,
    #[serde(default)]
    pub port: Option<u16>,
}

impl fmt::Debug for DbCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbCredentials")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"***")
            .field("dbname", &self.dbname)
            .field("port", &self.port)
            .finish()
    }
}

impl DbCredentials {
    /// Parse the JSON-encoded secret string.
    pub fn from_secret_string(name: &str, raw: &str) -> Result<Self, SecretsError> {
        serde_json::from_str(raw).map_err(|source| SecretsError::Malformed {
            name: name.to_string(),
            source,
        })
    }
}

#[async_trait]
pub trait SecretsProvider: Send + Sync {
    async fn database_credentials(&self, secret_name: &str) -> Result<DbCredentials, SecretsError>;
}

/// AWS Secrets Manager backend.
#[derive(Clone)]
pub struct AwsSecretsProvider {
    client: aws_sdk_secretsmanager::Client,
}

impl AwsSecretsProvider {
    pub fn new(client: aws_sdk_secretsmanager::Client) -> Self {
        Self { client }
    }

    pub async fn for_region(region: impl Into<String>) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.into()))
            .load()
            .await;
        Self::new(aws_sdk_secretsmanager::Client::new(&config))
    }
}

#[async_trait]
impl SecretsProvider for AwsSecretsProvider {
    #[instrument(skip(self))]
    async fn database_credentials(&self, secret_name: &str) -> Result<DbCredentials, SecretsError> {
        let output = self
            .client
            .get_secret_value()
            .secret_id(secret_name)
            .send()
            .await
            .map_err(|e| SecretsError::Lookup {
                name: secret_name.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        let raw = output.secret_string().ok_or_else(|| SecretsError::MissingValue {
            name: secret_name.to_string(),
        })?;

        let credentials = DbCredentials::from_secret_string(secret_name, raw)?;
        info!(host = %credentials.host, dbname = %credentials.dbname, "Resolved database credentials");
        Ok(credentials)
    }
}
