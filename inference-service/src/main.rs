//! Inference Service
//!
//! Entry point for the serverless handlers. Under the Lambda runtime the
//! handler selected by `HANDLER` serves every event of the process; anywhere
//! else the same handlers are exposed over HTTP for local use.
//!
//! # HTTP Topology
//!
//! - `GET /health` - Liveness probe
//! - `GET /handlers` - Available handler kinds
//! - `POST /invoke/:kind` - Invoke one handler with the request body as event

use anyhow::{anyhow, Result};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use inference_handlers::telemetry::{init_subscriber, LogFormat, DEFAULT_FILTER};
use inference_handlers::{handlers, Handler, HandlerKind, LambdaResponse};
use lambda_runtime::{service_fn, LambdaEvent};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

mod config;

use config::{RunMode, ServiceConfig};

#[tokio::main]
async fn main() -> Result<()> {
    init_subscriber(LogFormat::Json, DEFAULT_FILTER).map_err(|e| anyhow!(e))?;

    info!(
        service = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        "Starting inference service"
    );

    let config = ServiceConfig::load()?;
    match config.mode {
        RunMode::Lambda(kind) => run_lambda(kind).await,
        RunMode::Http { port } => serve_http(port).await,
    }
}

// =============================================================================
// Lambda Mode
// =============================================================================

async fn run_lambda(kind: HandlerKind) -> Result<()> {
    // Built once per cold start; artifacts stay memoized across invocations.
    let handler = handlers::from_env(kind).await?;
    info!(handler = %kind, "Lambda runtime ready");

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let handler = Arc::clone(&handler);
        async move { Ok::<LambdaResponse, lambda_runtime::Error>(handler.handle(event.payload).await) }
    }))
    .await
    .map_err(|e| anyhow!(e))
}

// =============================================================================
// HTTP Mode
// =============================================================================

/// Handlers are built on first invocation of their kind and then reused.
#[derive(Clone, Default)]
struct AppState {
    handlers: Arc<Mutex<HashMap<HandlerKind, Arc<dyn Handler>>>>,
}

impl AppState {
    async fn handler(&self, kind: HandlerKind) -> Result<Arc<dyn Handler>, inference_handlers::HandlerError> {
        let mut built = self.handlers.lock().await;
        if let Some(handler) = built.get(&kind) {
            return Ok(Arc::clone(handler));
        }
        let handler = handlers::from_env(kind).await?;
        built.insert(kind, Arc::clone(&handler));
        Ok(handler)
    }
}

async fn serve_http(port: u16) -> Result<()> {
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/handlers", get(list_handlers))
        .route("/invoke/:kind", post(invoke))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(AppState::default());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(address = %addr, "Server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutting down");
}

/// Liveness probe.
async fn health_check() -> &'static str {
    "OK"
}

#[derive(Debug, Serialize)]
struct HandlerInfo {
    kind: HandlerKind,
    description: &'static str,
    endpoint: String,
}

/// GET /handlers
async fn list_handlers() -> Json<Value> {
    let kinds: Vec<HandlerInfo> = HandlerKind::ALL
        .into_iter()
        .map(|kind| HandlerInfo {
            kind,
            description: kind.description(),
            endpoint: format!("/invoke/{kind}"),
        })
        .collect();
    Json(json!({ "count": kinds.len(), "handlers": kinds }))
}

/// POST /invoke/:kind
///
/// The request body is the event. A body that is not JSON is passed through
/// as a JSON string so the handler reports it the way the runtime would.
async fn invoke(State(state): State<AppState>, Path(kind): Path<String>, body: String) -> Response {
    let kind: HandlerKind = match kind.parse() {
        Ok(kind) => kind,
        Err(message) => return (StatusCode::NOT_FOUND, Json(json!({ "error": message }))).into_response(),
    };

    let handler = match state.handler(kind).await {
        Ok(handler) => handler,
        Err(e) => {
            error!(handler = %kind, error = %e, "Handler initialization failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() }))).into_response();
        }
    };

    let event = serde_json::from_str(&body).unwrap_or(Value::String(body));
    into_http(handler.handle(event).await)
}

fn into_http(response: LambdaResponse) -> Response {
    let status = StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut builder = Response::builder().status(status);
    for (name, value) in &response.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
        .body(Body::from(response.body))
        .unwrap_or_else(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "application/json")],
                json!({ "error": e.to_string() }).to_string(),
            )
                .into_response()
        })
}
