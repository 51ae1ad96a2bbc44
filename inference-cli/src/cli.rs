//! CLI argument parsing

use clap::{Parser, Subcommand};

use crate::commands::{artifacts::ArtifactsCommands, invoke::InvokeCommand};

/// Inference handlers CLI
///
/// Runs the same handlers the serverless runtime hosts, configured from the
/// same environment variables.
#[derive(Parser, Debug)]
#[command(name = "inference")]
#[command(version)]
#[command(about = "Invoke inference handlers locally", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Invoke one handler with a JSON event
    #[command(alias = "run")]
    Invoke(InvokeCommand),

    /// List available handlers
    #[command(alias = "ls")]
    List,

    /// Manage locally cached model artifacts
    #[command(alias = "art")]
    Artifacts(ArtifactsCommands),
}
