//! CLI Adapter
//!
//! Command-line interface for the Nexus Terminal console.
//! Uses clap derive macros for argument parsing.

mod commands;

pub use commands::{
    build_console, ActivityCmd, CliApp, Command, ConfirmArgs, CredentialsArgs, InjectCmd,
    LicensesCmd, PurgeArgs, SignalsCmd, UpdateLicenseCmd, UsersCmd, DEFAULT_CONFIG_PATH,
};

use anyhow::Result;

/// Initialize the CLI application
pub fn init() -> CliApp {
    use clap::Parser;
    CliApp::parse()
}

/// Execute the CLI command
pub async fn execute(app: CliApp) -> Result<()> {
    commands::execute(app).await
}
