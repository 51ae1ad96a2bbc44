//! Inference CLI
//!
//! Command-line interface for invoking the inference handlers locally and
//! warming their artifact caches.

use anyhow::{anyhow, Result};
use clap::Parser;
use inference_handlers::telemetry::{init_subscriber, LogFormat, DEFAULT_FILTER};

mod cli;
mod commands;

use cli::{Cli, Commands};

const VERBOSE_FILTER: &str = "inference_handlers=debug,inference_cli=debug";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    init_subscriber(LogFormat::Compact, filter).map_err(|e| anyhow!(e))?;

    match cli.command {
        Commands::Invoke(cmd) => commands::invoke::execute(cmd).await,
        Commands::List => commands::list::execute(),
        Commands::Artifacts(cmd) => commands::artifacts::execute(cmd).await,
    }
}
