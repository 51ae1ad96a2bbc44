//! Chat handler: forwards one question to the language model.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use super::{Handler, HandlerKind};
use crate::clients::{ChatMessage, LanguageModel, LlmConfig, OpenAiClient};
use crate::error::HandlerError;
use crate::response::LambdaResponse;

/// Question asked when the event carries none.
pub const DEFAULT_QUESTION: &str = "Hola, ¿cómo estás?";

#[derive(Debug, Deserialize, Validate)]
struct ChatRequest {
    #[serde(default, alias = "pregunta")]
    #[validate(length(min = 1))]
    question: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatReply {
    pub question: String,
    pub answer: String,
}

/// `question` (or `pregunta`) from the event or its JSON-encoded body.
fn read_question(event: &Value) -> Result<String, HandlerError> {
    let decoded;
    let source = match event.get("body") {
        Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
            Ok(body) => {
                decoded = body;
                &decoded
            }
            Err(_) => event,
        },
        _ => event,
    };

    if !source.is_object() {
        return Ok(DEFAULT_QUESTION.to_string());
    }

    // Absent means the greeting; present but unreadable is the caller's fault.
    let request = ChatRequest::deserialize(source).map_err(|_| HandlerError::MissingQuestion)?;
    request.validate().map_err(|_| HandlerError::MissingQuestion)?;
    Ok(request.question.unwrap_or_else(|| DEFAULT_QUESTION.to_string()))
}

pub struct ChatHandler {
    llm: Arc<dyn LanguageModel>,
}

impl ChatHandler {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, HandlerError> {
        Ok(Self::new(Arc::new(OpenAiClient::new(config.clone())?)))
    }
}

#[async_trait]
impl Handler for ChatHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Chat
    }

    async fn execute(&self, event: &Value) -> Result<LambdaResponse, HandlerError> {
        let question = read_question(event)?;
        let answer = self.llm.complete(&[ChatMessage::user(question.clone())], None).await?;
        Ok(LambdaResponse::ok(&ChatReply { question, answer }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_question_keys() {
        assert_eq!(read_question(&json!({"question": "Capital of France?"})).unwrap(), "Capital of France?");
        assert_eq!(read_question(&json!({"pregunta": "¿Hora?"})).unwrap(), "¿Hora?");
        assert_eq!(read_question(&json!({"body": "{\"question\": \"hi\"}"})).unwrap(), "hi");
    }

    #[test]
    fn test_default_question() {
        assert_eq!(read_question(&json!({})).unwrap(), DEFAULT_QUESTION);
        assert_eq!(read_question(&json!("just a string")).unwrap(), DEFAULT_QUESTION);
    }

    #[test]
    fn test_empty_question_rejected() {
        assert!(matches!(read_question(&json!({"question": ""})), Err(HandlerError::MissingQuestion)));
    }

    #[test]
    fn test_unreadable_question_rejected() {
        for event in [
            json!({"question": 5}),
            json!({"question": "hola", "pregunta": "hola"}),
            json!({"body": "{\"pregunta\": [\"a\"]}"}),
        ] {
            assert!(
                matches!(read_question(&event), Err(HandlerError::MissingQuestion)),
                "event {event}"
            );
        }
        assert_eq!(read_question(&json!({"question": null})).unwrap(), DEFAULT_QUESTION);
    }
}
