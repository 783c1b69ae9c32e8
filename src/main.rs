//! Nexus Terminal - Super-admin console
//!
//! Entry point for the `nexus` binary.

use anyhow::Result;
use nexus_terminal::adapters::cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (credentials go here, not in console.toml)
    dotenvy::dotenv().ok();

    let app = cli::init();
    cli::execute(app).await
}
