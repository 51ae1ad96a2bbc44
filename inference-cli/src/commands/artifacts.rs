//! `artifacts` commands: warm the local artifact cache ahead of the first
//! request.

use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use inference_handlers::config::{AnomalyConfig, FailureConfig, OccupancyConfig};
use inference_handlers::handlers::{AnomalyHandler, FailureHandler, OccupancyHandler};
use inference_handlers::HandlerKind;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Args)]
pub struct ArtifactsCommands {
    #[command(subcommand)]
    pub command: ArtifactsSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum ArtifactsSubcommand {
    /// Download a handler's model artifacts into the cache directory
    Fetch {
        /// Handler kind (anomaly, failure, occupancy)
        kind: HandlerKind,
    },
}

pub async fn execute(cmd: ArtifactsCommands) -> Result<()> {
    match cmd.command {
        ArtifactsSubcommand::Fetch { kind } => fetch(kind).await,
    }
}

async fn fetch(kind: HandlerKind) -> Result<()> {
    let paths: Vec<PathBuf> = match kind {
        HandlerKind::Anomaly => {
            let handler = AnomalyHandler::from_config(&AnomalyConfig::from_env()).await;
            handler.loader().prefetch().await?
        }
        HandlerKind::Failure => {
            let handler = FailureHandler::from_config(&FailureConfig::from_env()?)?;
            handler.loader().prefetch().await?
        }
        HandlerKind::Occupancy => {
            let handler = OccupancyHandler::from_config(&OccupancyConfig::from_env()).await;
            handler.loader().prefetch().await?
        }
        HandlerKind::Sql | HandlerKind::Chat => bail!("The {kind} handler has no model artifacts"),
    };

    info!(handler = %kind, artifacts = paths.len(), "Artifacts cached");
    println!("{}", format!("Cached artifacts for {kind}").bold());
    for path in paths {
        println!("  {}", path.display().to_string().green());
    }
    Ok(())
}
