//! Reconciliation handlers

use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    Json,
};
use tracing::info;

use cenyca_core::{
    reconcile_locally, validate_upload, CsvUpload, ReconciliationResult, Reconciler,
};

use crate::{AppError, AppState, MAX_UPLOAD_SIZE};

/// One uploaded form file: original filename plus bytes.
struct UploadedFile {
    filename: String,
    data: Vec<u8>,
}

/// POST /api/reconcile - Run a remote reconciliation attempt
///
/// Expects multipart form with:
/// - primary: captured-payments CSV (required, max 5MB)
/// - ledger: bank statement CSV (required, max 5MB)
///
/// Returns the full reconciliation result. An unusable model reply still
/// returns 200 with every row unmatched; only file, quota, and remote
/// failures surface as errors.
pub async fn run_reconciliation(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<ReconciliationResult>, AppError> {
    let (primary, ledger) = read_upload_fields(multipart).await?;

    // One attempt at a time; the guard frees the slot when the handler ends.
    let _guard = state
        .try_begin_attempt()
        .ok_or_else(|| AppError::conflict("A reconciliation is already in progress"))?;

    run_reconciliation_core(&state, primary, ledger).await
}

/// Core reconciliation logic - separated for testability
async fn run_reconciliation_core(
    state: &AppState,
    primary: UploadedFile,
    ledger: UploadedFile,
) -> Result<Json<ReconciliationResult>, AppError> {
    let backend = state.backend.clone().ok_or_else(|| {
        AppError::service_unavailable(
            "No model backend is configured on this server (GEMINI_API_KEY is not set)",
        )
    })?;

    let reconciler = Reconciler::new(backend, state.quota.clone());
    let result = reconciler
        .run(
            CsvUpload {
                filename: &primary.filename,
                data: &primary.data,
            },
            CsvUpload {
                filename: &ledger.filename,
                data: &ledger.data,
            },
        )
        .await
        .map_err(AppError::from_core)?;

    info!(
        matched = result.summary.matched,
        unmatched = result.summary.unmatched,
        "Reconciliation request completed"
    );

    Ok(Json(result))
}

/// POST /api/reconcile/offline - Run the local deterministic matcher
///
/// Same multipart form as /api/reconcile. Does not touch the remote model
/// or the quota.
pub async fn run_offline_reconciliation(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<ReconciliationResult>, AppError> {
    let (primary, ledger) = read_upload_fields(multipart).await?;

    let _guard = state
        .try_begin_attempt()
        .ok_or_else(|| AppError::conflict("A reconciliation is already in progress"))?;

    validate_upload(&primary.filename, primary.data.len()).map_err(AppError::from_core)?;
    validate_upload(&ledger.filename, ledger.data.len()).map_err(AppError::from_core)?;

    let primary_table =
        cenyca_core::parse_table(primary.data.as_slice()).map_err(AppError::from_core)?;
    let ledger_table =
        cenyca_core::parse_table(ledger.data.as_slice()).map_err(AppError::from_core)?;

    let mut result = reconcile_locally(&primary_table, &ledger_table);
    cenyca_core::reconcile::attach_phone_handles(&mut result, &primary_table);
    result.recompute_summary();

    Ok(Json(result))
}

/// Extract the `primary` and `ledger` files from a multipart form.
async fn read_upload_fields(mut multipart: Multipart) -> Result<(UploadedFile, UploadedFile), AppError> {
    let mut primary: Option<UploadedFile> = None;
    let mut ledger: Option<UploadedFile> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(&format!("Failed to read form field: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "primary" | "ledger" => {
                let filename = field
                    .file_name()
                    .unwrap_or("upload.csv")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|_| AppError::bad_request("Failed to read file data"))?;

                if bytes.len() > MAX_UPLOAD_SIZE {
                    return Err(AppError::bad_request(&format!(
                        "File too large. Maximum size is {} MB",
                        MAX_UPLOAD_SIZE / 1024 / 1024
                    )));
                }

                let file = UploadedFile {
                    filename,
                    data: bytes.to_vec(),
                };
                if name == "primary" {
                    primary = Some(file);
                } else {
                    ledger = Some(file);
                }
            }
            _ => {}
        }
    }

    let primary = primary.ok_or_else(|| AppError::bad_request("Missing primary field"))?;
    let ledger = ledger.ok_or_else(|| AppError::bad_request("Missing ledger field"))?;
    Ok((primary, ledger))
}
