use anyhow::{anyhow, Result};

use crate::app::App;
use crate::OutputFormat;

pub async fn run_status(app: &App, format: &OutputFormat) -> Result<()> {
    let status = app.manager().lock_status().await.map_err(|e| anyhow!("{}", e))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
        OutputFormat::Plain => {
            if !status.locked {
                println!("unlocked");
                return Ok(());
            }
            println!(
                "locked by {} for {} ({} ms)",
                status.holder.as_deref().unwrap_or("?"),
                status.operation.as_deref().unwrap_or("?"),
                status.held_for_ms.unwrap_or(0)
            );
        }
    }
    Ok(())
}

/// Clears the lock whoever holds it.
pub async fn run_release(app: &App) -> Result<()> {
    app.manager().force_unlock().await.map_err(|e| anyhow!("{}", e))?;
    println!("Lock released");
    Ok(())
}
