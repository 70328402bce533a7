//! `cenyca check` command

use anyhow::Result;

use cenyca_core::{ModelBackend, ModelClient, DEFAULT_MONTHLY_LIMIT};

/// Report backend configuration, reachability, and the configured limit.
pub async fn cmd_check() -> Result<()> {
    match ModelClient::from_env() {
        Some(client) => {
            println!("Backend:  {} (model: {})", client.host(), client.model());
            if client.health_check().await {
                println!("Status:   reachable");
            } else {
                println!("Status:   NOT responding");
            }
        }
        None => {
            println!("Backend:  not configured (set GEMINI_API_KEY)");
        }
    }

    let monthly_limit = std::env::var("CENYCA_MONTHLY_LIMIT")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(DEFAULT_MONTHLY_LIMIT);
    println!("Monthly limit: {} reconciliations", monthly_limit);

    Ok(())
}
