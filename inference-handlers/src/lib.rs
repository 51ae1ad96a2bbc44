//! Inference Handlers
//!
//! Serverless request handlers that front pre-trained classifiers and a
//! hosted language model. Each handler takes one JSON event and returns a
//! `{statusCode, headers, body}` envelope.
//!
//! # Pipeline
//!
//! Model-backed handlers run a strictly linear pipeline:
//!
//! ```text
//! event -> normalizer -> reconciler -> dispatcher -> formatter -> response
//! ```
//!
//! The artifact cache is consulted once per process before the first
//! dispatch; loaded models are memoized for the lifetime of the process.
//!
//! # Usage
//!
//! ```rust,ignore
//! use inference_handlers::handlers::{self, Handler, HandlerKind};
//!
//! let handler = handlers::from_env(HandlerKind::Anomaly).await?;
//! let response = handler.handle(serde_json::json!({"records": [...]})).await;
//! ```
//!
//! # Modules
//!
//! - [`artifacts`]: remote stores, local cache and load-once model registry
//! - [`features`]: payload normalization and feature reconciliation
//! - [`models`]: scalers and classifiers read from JSON artifacts
//! - [`predictor`]: scaling, classification and probability shaping
//! - [`handlers`]: the handler variants and their shared contract
//! - [`clients`]: language model, secrets and database collaborators
//! - [`telemetry`]: subscriber setup and per-invocation records

pub mod artifacts;
pub mod clients;
pub mod config;
pub mod error;
pub mod features;
pub mod handlers;
pub mod models;
pub mod predictor;
pub mod response;
pub mod sql;
pub mod telemetry;

pub use error::HandlerError;
pub use handlers::{Handler, HandlerKind};
pub use response::LambdaResponse;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
