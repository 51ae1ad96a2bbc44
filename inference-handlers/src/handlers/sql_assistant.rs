//! SQL assistant handler.
//!
//! Turns a natural-language question into one read-only MySQL query through
//! the language model, runs it, and returns the statement with its rows.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, instrument};
use validator::Validate;

use super::{Handler, HandlerKind};
use crate::clients::{
    AwsSecretsProvider, ChatMessage, Database, LanguageModel, MySqlDatabase, OpenAiClient, SecretsProvider,
};
use crate::config::SqlConfig;
use crate::error::HandlerError;
use crate::features::FeatureError;
use crate::response::LambdaResponse;
use crate::sql::{build_prompt, ensure_read_only, extract_sql};

/// Generated statements must be deterministic.
const SQL_TEMPERATURE: f32 = 0.0;

#[derive(Debug, Default, Deserialize, Validate)]
struct SqlRequest {
    #[serde(default)]
    #[validate(length(min = 1))]
    question: String,
}

/// Read `question` from the JSON-encoded `body` of a gateway envelope. A
/// missing body reads as `{}`.
fn read_question(event: &Value) -> Result<String, HandlerError> {
    let body = match event.get("body") {
        None | Some(Value::Null) => Value::Object(Default::default()),
        Some(Value::String(raw)) => serde_json::from_str(raw)
            .map_err(|e| FeatureError::InvalidInputShape(format!("malformed JSON body: {e}")))?,
        Some(other) => other.clone(),
    };

    let mut request: SqlRequest = serde_json::from_value(body).map_err(|e| {
        FeatureError::InvalidInputShape(format!(
            "request body must be an object with a string 'question': {e}"
        ))
    })?;
    request.question = request.question.trim().to_string();
    request.validate().map_err(|_| HandlerError::MissingQuestion)?;
    Ok(request.question)
}

pub struct SqlAssistantHandler {
    llm: Arc<dyn LanguageModel>,
    secrets: Arc<dyn SecretsProvider>,
    database: Arc<dyn Database>,
    secret_name: String,
}

impl SqlAssistantHandler {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        secrets: Arc<dyn SecretsProvider>,
        database: Arc<dyn Database>,
        secret_name: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            secrets,
            database,
            secret_name: secret_name.into(),
        }
    }

    pub async fn from_config(config: &SqlConfig) -> Result<Self, HandlerError> {
        let llm = OpenAiClient::new(config.llm.clone())?;
        let secrets = AwsSecretsProvider::for_region(config.region.clone()).await;
        Ok(Self::new(
            Arc::new(llm),
            Arc::new(secrets),
            Arc::new(MySqlDatabase::new()),
            config.secret_name.clone(),
        ))
    }

    /// Ask the model for a statement and check it with the read-only guard.
    #[instrument(skip(self))]
    pub async fn generate_sql(&self, question: &str) -> Result<String, HandlerError> {
        let messages = [ChatMessage::user(build_prompt(question))];
        let completion = self.llm.complete(&messages, Some(SQL_TEMPERATURE)).await?;
        let sql = extract_sql(&completion);
        ensure_read_only(&sql)?;
        info!(sql = %sql, "Generated read-only query");
        Ok(sql)
    }
}

#[async_trait]
impl Handler for SqlAssistantHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Sql
    }

    async fn execute(&self, event: &Value) -> Result<LambdaResponse, HandlerError> {
        let question = read_question(event)?;
        let sql = self.generate_sql(&question).await?;

        let credentials = self.secrets.database_credentials(&self.secret_name).await?;
        let rows = self.database.query(&credentials, &sql).await?;

        Ok(LambdaResponse::ok(&json!({
            "generated_sql": sql,
            "result": rows,
        })))
    }

    fn render_error(&self, error: &HandlerError) -> LambdaResponse {
        let status = match error {
            HandlerError::MissingQuestion => 400,
            _ => 500,
        };
        LambdaResponse::error_message(status, error.to_string())
    }
}
