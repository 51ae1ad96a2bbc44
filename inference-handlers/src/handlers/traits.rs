//! Handler contract shared by every variant.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info_span, Instrument};

use crate::error::HandlerError;
use crate::response::LambdaResponse;
use crate::telemetry::InvocationTimer;

/// The handler variants this crate ships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    Anomaly,
    Failure,
    Occupancy,
    Sql,
    Chat,
}

impl HandlerKind {
    pub const ALL: [HandlerKind; 5] = [
        HandlerKind::Anomaly,
        HandlerKind::Failure,
        HandlerKind::Occupancy,
        HandlerKind::Sql,
        HandlerKind::Chat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerKind::Anomaly => "anomaly",
            HandlerKind::Failure => "failure",
            HandlerKind::Occupancy => "occupancy",
            HandlerKind::Sql => "sql",
            HandlerKind::Chat => "chat",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            HandlerKind::Anomaly => "Batch anomaly prediction over named device readings",
            HandlerKind::Failure => "Legacy failure prediction over one positional feature vector",
            HandlerKind::Occupancy => "Occupancy prediction over one positional feature vector",
            HandlerKind::Sql => "Natural-language question to a read-only SQL query and its rows",
            HandlerKind::Chat => "Direct question answering through the language model",
        }
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HandlerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HandlerKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let known: Vec<&str> = HandlerKind::ALL.iter().map(HandlerKind::as_str).collect();
                format!("unknown handler '{s}', expected one of: {}", known.join(", "))
            })
    }
}

/// One serverless entry point: a JSON event in, a transport envelope out.
///
/// Implementors provide [`execute`](Handler::execute) and optionally
/// [`render_error`](Handler::render_error); [`handle`](Handler::handle) is the
/// boundary that renders every failure exactly once and never panics or
/// propagates.
#[async_trait]
pub trait Handler: Send + Sync {
    fn kind(&self) -> HandlerKind;

    /// Run the request and render the success response.
    async fn execute(&self, event: &Value) -> Result<LambdaResponse, HandlerError>;

    /// Failure body for this variant; `{"error": message}` by default.
    fn render_error(&self, error: &HandlerError) -> LambdaResponse {
        LambdaResponse::error_message(error.status_code(), error.to_string())
    }

    async fn handle(&self, event: Value) -> LambdaResponse {
        let kind = self.kind();
        let timer = InvocationTimer::start(kind);
        let span = info_span!("invocation", handler = %kind, invocation_id = %timer.invocation_id());

        let (response, error_code) = async {
            match self.execute(&event).await {
                Ok(response) => (response, None),
                Err(e) => {
                    error!(error = %e, code = e.code(), "Request failed");
                    (self.render_error(&e), Some(e.code()))
                }
            }
        }
        .instrument(span)
        .await;

        timer.finish(response.status_code, error_code);
        response
    }
}
