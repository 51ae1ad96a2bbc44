//! Telemetry Module
//!
//! Subscriber setup for the binaries and the single structured record each
//! handler invocation emits.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::handlers::HandlerKind;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "inference_service=info,inference_handlers=info";

/// Output format of the global subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line, for hosted log ingestion.
    Json,
    /// Human-readable single-line output.
    Compact,
}

/// Install the global subscriber writing to stderr. Fails if one is already
/// installed.
pub fn init_subscriber(
    format: LogFormat,
    default_filter: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Json => builder.json().with_current_span(false).try_init(),
        LogFormat::Compact => builder.compact().with_target(false).try_init(),
    }
}

/// Outcome of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStatus {
    Succeeded,
    Failed,
}

/// Structured record logged once per invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationRecord {
    pub invocation_id: Uuid,
    pub handler: HandlerKind,
    pub status: InvocationStatus,
    pub status_code: u16,
    pub error_code: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Measures one invocation from construction to [`finish`](Self::finish).
#[derive(Debug)]
pub struct InvocationTimer {
    invocation_id: Uuid,
    handler: HandlerKind,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl InvocationTimer {
    pub fn start(handler: HandlerKind) -> Self {
        Self {
            invocation_id: Uuid::new_v4(),
            handler,
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn invocation_id(&self) -> Uuid {
        self.invocation_id
    }

    /// Build the record and log it: `info` on success, `warn` on failure.
    pub fn finish(self, status_code: u16, error_code: Option<&str>) -> InvocationRecord {
        let status = if (200..300).contains(&status_code) {
            InvocationStatus::Succeeded
        } else {
            InvocationStatus::Failed
        };
        let record = InvocationRecord {
            invocation_id: self.invocation_id,
            handler: self.handler,
            status,
            status_code,
            error_code: error_code.map(str::to_string),
            started_at: self.started_at,
            duration_ms: u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        record.emit();
        record
    }
}

impl InvocationRecord {
    fn emit(&self) {
        match self.status {
            InvocationStatus::Succeeded => info!(
                invocation_id = %self.invocation_id,
                handler = %self.handler,
                status_code = self.status_code,
                duration_ms = self.duration_ms,
                "Invocation completed"
            ),
            InvocationStatus::Failed => warn!(
                invocation_id = %self.invocation_id,
                handler = %self.handler,
                status_code = self.status_code,
                error_code = self.error_code.as_deref().unwrap_or("UNKNOWN"),
                duration_ms = self.duration_ms,
                "Invocation failed"
            ),
        }
    }
}
