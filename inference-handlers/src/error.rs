//! Handler error type.
//!
//! Every failure in normalization, reconciliation, dispatch or a
//! collaborator call is folded into [`HandlerError`] and rendered once at
//! the handler boundary.

use std::error::Error as StdError;
use thiserror::Error;

use crate::artifacts::ArtifactError;
use crate::clients::{DatabaseError, LlmError, SecretsError};
use crate::features::FeatureError;
use crate::models::ModelError;
use crate::sql::UnsafeQuery;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Feature(#[from] FeatureError),

    #[error("Artifact unavailable: {0}")]
    ArtifactUnavailable(#[from] ArtifactError),

    #[error("Error scaling features: {0}")]
    Scaling(#[source] ModelError),

    #[error("Error in predict(): {0}")]
    Prediction(#[source] ModelError),

    #[error("Missing question")]
    MissingQuestion,

    #[error(transparent)]
    UnsafeQuery(#[from] UnsafeQuery),

    #[error("Language model error: {0}")]
    LanguageModel(#[from] LlmError),

    #[error("Secrets error: {0}")]
    Secrets(#[from] SecretsError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl HandlerError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            HandlerError::Feature(FeatureError::InvalidInputShape(_)) => "INVALID_INPUT_SHAPE",
            HandlerError::Feature(FeatureError::MissingFeatures { .. }) => "MISSING_FEATURES",
            HandlerError::Feature(FeatureError::InvalidFeatureValue { .. }) => "INVALID_FEATURE_VALUE",
            HandlerError::ArtifactUnavailable(_) => "ARTIFACT_UNAVAILABLE",
            HandlerError::Scaling(_) => "SCALING_ERROR",
            HandlerError::Prediction(_) => "PREDICTION_ERROR",
            HandlerError::MissingQuestion => "MISSING_QUESTION",
            HandlerError::UnsafeQuery(_) => "UNSAFE_QUERY",
            HandlerError::LanguageModel(_) => "LANGUAGE_MODEL_ERROR",
            HandlerError::Secrets(_) => "SECRETS_ERROR",
            HandlerError::Database(_) => "DATABASE_ERROR",
            HandlerError::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }

    /// 400 for anything the caller can fix by changing the request, 500 for
    /// collaborator and infrastructure faults.
    pub fn status_code(&self) -> u16 {
        match self {
            HandlerError::Feature(_) | HandlerError::MissingQuestion => 400,
            HandlerError::Scaling(e) | HandlerError::Prediction(e) if e.is_input_fault() => 400,
            _ => 500,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }

    /// Display of this error followed by each underlying cause.
    pub fn chain(&self) -> Vec<String> {
        let mut chain = vec![self.to_string()];
        let mut source = self.source();
        while let Some(cause) = source {
            let message = cause.to_string();
            if chain.last() != Some(&message) {
                chain.push(message);
            }
            source = cause.source();
        }
        chain
    }
}
