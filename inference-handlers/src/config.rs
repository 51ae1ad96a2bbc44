//! Handler Configuration
//!
//! Each handler resolves its settings once, at construction, from
//! environment variables with fixed defaults. Values are read through a
//! lookup function so tests can supply a map instead of the process
//! environment.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::artifacts::{ArtifactSpec, ModelArtifacts};
use crate::clients::LlmConfig;
use crate::error::HandlerError;
use crate::models::FormatVersion;

pub const DEFAULT_BUCKET: &str = "sireieiplus";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_CACHE_DIR: &str = "/tmp";
pub const DEFAULT_MIN_VERSION: &str = "1.0";

/// Reads one variable; `None` when unset.
pub trait EnvSource {
    fn get(&self, name: &str) -> Option<String>;
}

/// The process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl<F> EnvSource for F
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<String> {
        self(name)
    }
}

fn var_or(env: &impl EnvSource, name: &str, default: &str) -> String {
    env.get(name).unwrap_or_else(|| default.to_string())
}

/// Unset falls back to `default`; an explicit empty value disables the
/// artifact.
fn optional_key(env: &impl EnvSource, name: &str, default: &str) -> Option<String> {
    match env.get(name) {
        Some(value) if value.trim().is_empty() => None,
        Some(value) => Some(value),
        None => Some(default.to_string()),
    }
}

fn required(env: &impl EnvSource, name: &str) -> Result<String, HandlerError> {
    env.get(name)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| HandlerError::Configuration(format!("{name} is not set")))
}

fn parse_url(name: &str, raw: &str) -> Result<Url, HandlerError> {
    Url::parse(raw).map_err(|e| HandlerError::Configuration(format!("{name} is not a valid URL: {e}")))
}

/// Settings shared by every model-backed handler.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactSettings {
    pub cache_dir: PathBuf,
    pub min_version: FormatVersion,
}

impl ArtifactSettings {
    pub fn from_source(env: &impl EnvSource) -> Self {
        Self {
            cache_dir: PathBuf::from(var_or(env, "ARTIFACT_CACHE_DIR", DEFAULT_CACHE_DIR)),
            min_version: FormatVersion::parse(&var_or(env, "MODEL_FORMAT_MIN_VERSION", DEFAULT_MIN_VERSION)),
        }
    }
}

/// Anomaly predictor: classifier, scaler and feature list in the object store.
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyConfig {
    pub bucket: String,
    pub region: String,
    pub model_key: String,
    pub scaler_key: Option<String>,
    pub features_key: Option<String>,
    pub artifacts: ArtifactSettings,
}

impl AnomalyConfig {
    pub fn from_env() -> Self {
        Self::from_source(&ProcessEnv)
    }

    pub fn from_source(env: &impl EnvSource) -> Self {
        Self {
            bucket: var_or(env, "MODEL_S3_BUCKET", DEFAULT_BUCKET),
            region: var_or(env, "MODEL_S3_REGION", DEFAULT_REGION),
            model_key: var_or(env, "MODEL_S3_KEY", "failure_predictor_rf.json"),
            scaler_key: optional_key(env, "SCALER_S3_KEY", "failure_predictor_scaler.json"),
            features_key: optional_key(env, "FEATURES_S3_KEY", "final_features.json"),
            artifacts: ArtifactSettings::from_source(env),
        }
    }

    pub fn model_artifacts(&self) -> ModelArtifacts {
        ModelArtifacts {
            classifier: ArtifactSpec::object("model", &self.bucket, &self.model_key),
            scaler: self
                .scaler_key
                .as_ref()
                .map(|key| ArtifactSpec::object("scaler", &self.bucket, key)),
            feature_list: self
                .features_key
                .as_ref()
                .map(|key| ArtifactSpec::object("features", &self.bucket, key)),
        }
    }
}

/// Legacy failure predictor: classifier and scaler over plain HTTPS.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureConfig {
    pub model_url: Url,
    pub scaler_url: Url,
    pub timeout: Duration,
    pub artifacts: ArtifactSettings,
}

impl FailureConfig {
    pub const DEFAULT_MODEL_URL: &'static str =
        "https://sireieiplus.s3.us-east-1.amazonaws.com/Models/model.json";
    pub const DEFAULT_SCALER_URL: &'static str =
        "https://sireieiplus.s3.us-east-1.amazonaws.com/Models/scaler.json";
    pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

    pub fn from_env() -> Result<Self, HandlerError> {
        Self::from_source(&ProcessEnv)
    }

    pub fn from_source(env: &impl EnvSource) -> Result<Self, HandlerError> {
        Ok(Self {
            model_url: parse_url(
                "FAILURE_MODEL_URL",
                &var_or(env, "FAILURE_MODEL_URL", Self::DEFAULT_MODEL_URL),
            )?,
            scaler_url: parse_url(
                "FAILURE_SCALER_URL",
                &var_or(env, "FAILURE_SCALER_URL", Self::DEFAULT_SCALER_URL),
            )?,
            timeout: Duration::from_secs(timeout_secs(
                env,
                "FAILURE_TIMEOUT_SECS",
                Self::DEFAULT_TIMEOUT_SECS,
            )),
            artifacts: ArtifactSettings::from_source(env),
        })
    }

    pub fn model_artifacts(&self) -> ModelArtifacts {
        ModelArtifacts {
            classifier: ArtifactSpec::url("model", self.model_url.clone()),
            scaler: Some(ArtifactSpec::url("scaler", self.scaler_url.clone())),
            feature_list: None,
        }
    }
}

/// Occupancy predictor: classifier and scaler under `Models/occupancy_*`.
#[derive(Debug, Clone, PartialEq)]
pub struct OccupancyConfig {
    pub bucket: String,
    pub region: String,
    pub model_key: String,
    pub scaler_key: String,
    pub artifacts: ArtifactSettings,
}

impl OccupancyConfig {
    pub fn from_env() -> Self {
        Self::from_source(&ProcessEnv)
    }

    pub fn from_source(env: &impl EnvSource) -> Self {
        Self {
            bucket: var_or(env, "OCCUPANCY_S3_BUCKET", DEFAULT_BUCKET),
            region: var_or(env, "AWS_REGION", DEFAULT_REGION),
            model_key: var_or(env, "OCCUPANCY_MODEL_KEY", "Models/occupancy_model.json"),
            scaler_key: var_or(env, "OCCUPANCY_SCALER_KEY", "Models/occupancy_scaler.json"),
            artifacts: ArtifactSettings::from_source(env),
        }
    }

    pub fn model_artifacts(&self) -> ModelArtifacts {
        ModelArtifacts {
            classifier: ArtifactSpec::object("model", &self.bucket, &self.model_key),
            scaler: Some(ArtifactSpec::object("scaler", &self.bucket, &self.scaler_key)),
            feature_list: None,
        }
    }
}

/// SQL assistant: language model, secret name and region.
#[derive(Debug, Clone)]
pub struct SqlConfig {
    pub secret_name: String,
    pub region: String,
    pub llm: LlmConfig,
}

impl SqlConfig {
    pub fn from_env() -> Result<Self, HandlerError> {
        Self::from_source(&ProcessEnv)
    }

    pub fn from_source(env: &impl EnvSource) -> Result<Self, HandlerError> {
        Ok(Self {
            secret_name: required(env, "DB_SECRET_NAME")?,
            region: var_or(env, "AWS_REGION", DEFAULT_REGION),
            llm: llm_config(env)?,
        })
    }
}

/// Language model settings for the SQL and chat handlers.
pub fn llm_config(env: &impl EnvSource) -> Result<LlmConfig, HandlerError> {
    Ok(LlmConfig {
        base_url: parse_url(
            "OPENAI_BASE_URL",
            &var_or(env, "OPENAI_BASE_URL", LlmConfig::DEFAULT_BASE_URL),
        )?,
        api_key: required(env, "OPENAI_API_KEY")?,
        model: var_or(env, "MODEL_NAME", LlmConfig::DEFAULT_MODEL),
        timeout: Duration::from_secs(timeout_secs(
            env,
            "LLM_TIMEOUT_SECS",
            LlmConfig::DEFAULT_TIMEOUT_SECS,
        )),
    })
}

/// Whole seconds from `name`; unparsable or zero values use the default.
fn timeout_secs(env: &impl EnvSource, name: &str, default: u64) -> u64 {
    env.get(name)
        .and_then(|v| v.trim().parse().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(default)
}
