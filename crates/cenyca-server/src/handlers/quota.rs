//! Quota handler

use std::sync::Arc;

use axum::{extract::State, Json};

use cenyca_core::{QuotaGate, QuotaState};

use crate::AppState;

/// GET /api/quota - Current monthly usage counter
pub async fn get_quota(State(state): State<Arc<AppState>>) -> Json<QuotaState> {
    Json(state.quota.state())
}
