//! Hosted Language Model Client
//!
//! Client for OpenAI-compatible chat-completions endpoints. One request per
//! call; failures are returned to the caller immediately.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument};
use url::Url;

/// Language model client configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Base URL of the API, e.g. `https://api.openai.com/v1`
    pub base_url: Url,

    /// Bearer API key
    pub api_key: String,

    /// Model name sent with every request
    pub model: String,

    /// Request timeout
    pub timeout: Duration,
}

impl LlmConfig {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openai.com/v1";
    pub const DEFAULT_MODEL: &'static str = "gpt-4o-mini";
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
}

/// Errors from language model calls.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Request error: {0}")]
    Request(String),

    #[error("Response error: status={status}, message={message}")]
    Response { status: u16, message: String },

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Timeout error")]
    Timeout,

    #[error("Empty completion: the response carried no message content")]
    EmptyCompletion,
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else if err.is_connect() {
            LlmError::Connection(err.to_string())
        } else {
            LlmError::Request(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role/content chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Narrow contract of the hosted language model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate the assistant reply for `messages`. `temperature` of `None`
    /// leaves the provider default.
    async fn complete(&self, messages: &[ChatMessage], temperature: Option<f32>) -> Result<String, LlmError>;
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// HTTP client for chat-completions.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    config: LlmConfig,
}

impl OpenAiClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn completions_url(&self) -> Result<Url, LlmError> {
        let mut base = self.config.base_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.join("chat/completions")
            .map_err(|e| LlmError::Configuration(e.to_string()))
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    #[instrument(skip(self, messages), fields(model = %self.config.model, messages = messages.len()))]
    async fn complete(&self, messages: &[ChatMessage], temperature: Option<f32>) -> Result<String, LlmError> {
        let url = self.completions_url()?;
        let request = CompletionRequest {
            model: &self.config.model,
            messages,
            temperature,
        };

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        match status {
            s if s.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(LlmError::Authentication(
                    "Invalid or missing API key".to_string(),
                ));
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                return Err(LlmError::Response {
                    status: status.as_u16(),
                    message: body,
                });
            }
        }

        let body = response.text().await?;
        debug!(bytes = body.len(), "Completion received");
        let parsed: CompletionResponse = serde_json::from_str(&body).map_err(|e| LlmError::Response {
            status: status.as_u16(),
            message: format!("unreadable completion: {e}"),
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(LlmError::EmptyCompletion)?;

        info!("Completion succeeded");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base: &str) -> LlmConfig {
        LlmConfig {
            base_url: Url::parse(base).unwrap(),
            api_key: "sk-test".to_string(),
            model: LlmConfig::DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_completions_url_keeps_base_path() {
        let client = OpenAiClient::new(config("https://api.openai.com/v1")).unwrap();
        assert_eq!(
            client.completions_url().unwrap().as_str(),
            "https://api.openai.com/v1/chat/completions"
        );

        let client = OpenAiClient::new(config("http://localhost:9000/proxy/v1/")).unwrap();
        assert_eq!(
            client.completions_url().unwrap().as_str(),
            "http://localhost:9000/proxy/v1/chat/completions"
        );
    }

    #[test]
    fn test_request_serialization() {
        let messages = vec![ChatMessage::user("hello")];
        let request = CompletionRequest {
            model: "gpt-4o-mini",
            messages: &messages,
            temperature: Some(0.0),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["temperature"], 0.0);

        let request = CompletionRequest {
            temperature: None,
            ..request
        };
        assert!(serde_json::to_value(&request).unwrap().get("temperature").is_none());
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{"choices": [{"index": 0, "message": {"role": "assistant", "content": "Paris"}}]}"#;
        let parsed: CompletionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("Paris"));
    }
}
