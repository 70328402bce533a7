//! CENYCA CLI - WhatsApp payment reconciliation
//!
//! Usage:
//!   cenyca reconcile --primary pagos.csv --ledger banco.csv   Remote run
//!   cenyca reconcile ... --offline                            Local matcher
//!   cenyca serve --port 3000                                  Start web server
//!   cenyca check                                              Backend + quota

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Reconcile {
            primary,
            ledger,
            output,
            offline,
        } => commands::cmd_reconcile(&primary, &ledger, output.as_deref(), offline).await,
        Commands::Serve {
            port,
            host,
            no_auth,
            static_dir,
        } => commands::cmd_serve(&host, port, no_auth, static_dir.as_deref()).await,
        Commands::Check => commands::cmd_check().await,
    }
}
