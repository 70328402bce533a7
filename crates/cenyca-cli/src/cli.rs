//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI
//! arguments. The actual command implementations are in the `commands`
//! module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// CENYCA - Reconcile WhatsApp-captured payments against a bank statement
#[derive(Parser)]
#[command(name = "cenyca")]
#[command(about = "Bank reconciliation for WhatsApp-captured payments", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reconcile a captured-payments CSV against a bank statement CSV
    Reconcile {
        /// Captured-payments CSV (the WhatsApp export)
        #[arg(short, long)]
        primary: PathBuf,

        /// Bank statement CSV
        #[arg(short, long)]
        ledger: PathBuf,

        /// Write the reconciliation CSV here (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Use the local matcher instead of the remote model
        ///
        /// Offline runs are deterministic, free, and do not consume the
        /// monthly quota. They also catch fewer fuzzy matches.
        #[arg(long)]
        offline: bool,
    },

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Disable authentication (for local development only)
        ///
        /// WARNING: Do not use this flag when exposing the server to a
        /// network. By default the server requires a Bearer API key
        /// (CENYCA_API_KEYS, comma-separated).
        #[arg(long)]
        no_auth: bool,

        /// Directory containing static files to serve (e.g., ui/dist)
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },

    /// Check backend reachability and the monthly quota
    Check,
}
