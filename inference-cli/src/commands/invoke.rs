//! `invoke` command: run one handler against an event read from a file or
//! stdin and print the response.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use inference_handlers::{handlers, Handler, HandlerKind, LambdaResponse};
use serde_json::{json, Value};
use std::io::{self, Read};
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct InvokeCommand {
    /// Handler kind (anomaly, failure, occupancy, sql, chat)
    pub kind: HandlerKind,

    /// Event file path (JSON)
    #[arg(short, long, conflicts_with = "stdin")]
    pub input: Option<PathBuf>,

    /// Read the event from stdin
    #[arg(long)]
    pub stdin: bool,

    /// Wrap the input as the string `body` of a gateway event
    #[arg(long)]
    pub envelope: bool,

    /// Print the raw response envelope instead of the decoded body
    #[arg(long)]
    pub raw: bool,
}

pub async fn execute(cmd: InvokeCommand) -> Result<()> {
    let input = read_input(cmd.input.as_ref(), cmd.stdin)?;
    let event = build_event(&input, cmd.envelope);

    let handler = handlers::from_env(cmd.kind)
        .await
        .with_context(|| format!("Failed to initialize the {} handler", cmd.kind))?;
    let response = handler.handle(event).await;

    print_response(&response, cmd.raw)?;
    if !response.is_success() {
        bail!("{} handler returned status {}", cmd.kind, response.status_code);
    }
    Ok(())
}

fn read_input(file: Option<&PathBuf>, use_stdin: bool) -> Result<String> {
    if use_stdin {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read from stdin")?;
        Ok(buffer)
    } else if let Some(path) = file {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {}", path.display()))
    } else {
        bail!("Either --input or --stdin must be provided")
    }
}

/// Input that is not JSON is passed on as a JSON string, which the handlers
/// decode and report themselves.
fn build_event(input: &str, envelope: bool) -> Value {
    if envelope {
        return json!({ "body": input.trim() });
    }
    serde_json::from_str(input).unwrap_or_else(|_| Value::String(input.to_string()))
}

fn print_response(response: &LambdaResponse, raw: bool) -> Result<()> {
    let status = response.status_code.to_string();
    let status = if response.is_success() { status.green() } else { status.red() };
    eprintln!("{} {}", "Status:".bold(), status);

    let rendered = if raw {
        serde_json::to_string_pretty(response)?
    } else {
        match response.body_json() {
            Ok(body) => serde_json::to_string_pretty(&body)?,
            Err(_) => response.body.clone(),
        }
    };
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_event() {
        assert_eq!(build_event("{\"features\": [1, 2]}", false), json!({"features": [1, 2]}));
        assert_eq!(build_event("{oops", false), json!("{oops"));
        assert_eq!(
            build_event("{\"question\": \"hi\"}\n", true),
            json!({"body": "{\"question\": \"hi\"}"})
        );
    }

    #[test]
    fn test_read_input_requires_source() {
        assert!(read_input(None, false).is_err());
    }
}
