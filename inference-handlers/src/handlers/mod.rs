//! Serverless Handlers
//!
//! Each handler accepts one JSON event and returns a [`LambdaResponse`]
//! envelope. Model-backed handlers memoize their artifacts for the lifetime
//! of the process.
//!
//! # Available Handlers
//!
//! - `AnomalyHandler`: batch anomaly prediction over named records
//! - `FailureHandler`: legacy positional failure prediction
//! - `OccupancyHandler`: positional occupancy prediction
//! - `SqlAssistantHandler`: natural-language question to SQL rows
//! - `ChatHandler`: direct question answering
//!
//! [`LambdaResponse`]: crate::response::LambdaResponse

pub mod anomaly;
pub mod chat;
pub mod failure;
pub mod occupancy;
pub mod positional;
pub mod sql_assistant;
pub mod traits;

use std::sync::Arc;

use tracing::info;

pub use anomaly::{AnomalyHandler, AnomalyResult};
pub use chat::{ChatHandler, ChatReply, DEFAULT_QUESTION};
pub use failure::{FailureHandler, FailureResult};
pub use occupancy::{OccupancyHandler, OccupancyResult};
pub use positional::PositionalPredictor;
pub use sql_assistant::SqlAssistantHandler;
pub use traits::{Handler, HandlerKind};

use crate::config::{self, AnomalyConfig, FailureConfig, OccupancyConfig, ProcessEnv, SqlConfig};
use crate::error::HandlerError;

/// Build the production handler for `kind` from the process environment.
///
/// Missing required settings fail here rather than per request.
pub async fn from_env(kind: HandlerKind) -> Result<Arc<dyn Handler>, HandlerError> {
    let handler: Arc<dyn Handler> = match kind {
        HandlerKind::Anomaly => Arc::new(AnomalyHandler::from_config(&AnomalyConfig::from_env()).await),
        HandlerKind::Failure => Arc::new(FailureHandler::from_config(&FailureConfig::from_env()?)?),
        HandlerKind::Occupancy => Arc::new(OccupancyHandler::from_config(&OccupancyConfig::from_env()).await),
        HandlerKind::Sql => Arc::new(SqlAssistantHandler::from_config(&SqlConfig::from_env()?).await?),
        HandlerKind::Chat => Arc::new(ChatHandler::from_config(&config::llm_config(&ProcessEnv)?)?),
    };
    info!(handler = %kind, "Handler initialized");
    Ok(handler)
}
