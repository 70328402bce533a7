//! `cenyca serve` command

use std::path::Path;

use anyhow::Result;
use tracing::warn;

use cenyca_server::ServerConfig;

/// Start the web server.
///
/// API keys come from `CENYCA_API_KEYS` (comma-separated), allowed CORS
/// origins from `CENYCA_ALLOWED_ORIGINS`, and the monthly limit from
/// `CENYCA_MONTHLY_LIMIT`.
pub async fn cmd_serve(
    host: &str,
    port: u16,
    no_auth: bool,
    static_dir: Option<&Path>,
) -> Result<()> {
    let api_keys: Vec<String> = std::env::var("CENYCA_API_KEYS")
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let allowed_origins: Vec<String> = std::env::var("CENYCA_ALLOWED_ORIGINS")
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let monthly_limit = std::env::var("CENYCA_MONTHLY_LIMIT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(cenyca_core::DEFAULT_MONTHLY_LIMIT);

    if !no_auth && api_keys.is_empty() {
        warn!("Authentication is enabled but CENYCA_API_KEYS is empty; every request will be rejected");
    }

    let config = ServerConfig {
        require_auth: !no_auth,
        allowed_origins,
        api_keys,
        monthly_limit,
    };

    let static_dir = static_dir.map(|p| p.to_string_lossy().into_owned());
    cenyca_server::serve_with_config(host, port, static_dir.as_deref(), config).await
}
