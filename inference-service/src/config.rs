//! Configuration for the inference service binary.
//!
//! The process runs in one of two modes:
//!
//! - **Lambda**: `AWS_LAMBDA_RUNTIME_API` is set by the host; the handler named
//!   by `HANDLER` serves every event of the process.
//! - **HTTP**: local harness exposing every handler under `/invoke/:kind`.
//!
//! Environment variables:
//! - `HANDLER`: handler kind (`anomaly`, `failure`, `occupancy`, `sql`, `chat`)
//!   served in Lambda mode, default `anomaly`
//! - `PORT`: HTTP listen port, default 8080

use anyhow::{anyhow, Context, Result};
use inference_handlers::HandlerKind;
use std::env;

/// How the process receives events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Lambda(HandlerKind),
    Http { port: u16 },
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub mode: RunMode,
}

fn default_port() -> u16 {
    8080
}

impl ServiceConfig {
    /// Load from the process environment.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let handler = lookup("HANDLER")
            .filter(|v| !v.trim().is_empty())
            .map(|v| v.parse::<HandlerKind>().map_err(|e| anyhow!(e)))
            .transpose()
            .context("Invalid HANDLER")?;

        let mode = if lookup("AWS_LAMBDA_RUNTIME_API").is_some() {
            RunMode::Lambda(handler.unwrap_or(HandlerKind::Anomaly))
        } else {
            let port = match lookup("PORT") {
                Some(raw) => raw.trim().parse().with_context(|| format!("Invalid PORT: {raw}"))?,
                None => default_port(),
            };
            RunMode::Http { port }
        };

        Ok(Self { mode })
    }
}
