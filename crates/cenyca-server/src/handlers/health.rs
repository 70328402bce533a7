//! Health handler

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use cenyca_core::ModelBackend;

use crate::AppState;

/// Health response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub backend_configured: bool,
    pub backend_healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// GET /api/health - Backend configuration and reachability
pub async fn get_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let (configured, healthy, model) = match &state.backend {
        Some(backend) => (
            true,
            backend.health_check().await,
            Some(backend.model().to_string()),
        ),
        None => (false, false, None),
    };

    Json(HealthResponse {
        status: "ok",
        backend_configured: configured,
        backend_healthy: healthy,
        model,
    })
}
