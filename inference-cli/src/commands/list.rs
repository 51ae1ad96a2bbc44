//! `list` command

use anyhow::Result;
use colored::Colorize;
use inference_handlers::HandlerKind;

pub fn execute() -> Result<()> {
    println!("{}", "Available Handlers".bold().cyan());
    println!("{}", "=".repeat(50));

    for kind in HandlerKind::ALL {
        println!("  {:<10} {}", kind.as_str().green(), kind.description());
    }

    println!("\n{}", "Usage:".bold());
    println!("  inference invoke anomaly --input event.json");
    println!("  inference invoke sql --stdin --envelope");
    println!("  inference artifacts fetch occupancy");

    Ok(())
}
