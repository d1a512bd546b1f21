//! Main entry point for dplan
//!
//! - `dplan serve [--bind ADDR] ...` starts the HTTP API
//! - anything else is handled by the command line front end

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    if dplan_server::should_run_server_mode() {
        dplan_server::run().await?;
    } else {
        dplan_cli::run().await.map_err(|e| anyhow::anyhow!(e))?;
    }

    Ok(())
}
