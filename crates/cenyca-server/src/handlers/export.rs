//! Export handler

use axum::{
    http::{header, HeaderMap, HeaderValue},
    Json,
};

use cenyca_core::{export_csv, ReconciliationResult};

use crate::AppError;

/// POST /api/reconcile/export - Render a result as a CSV attachment
///
/// Takes the JSON body of a previous reconciliation response and returns
/// the fixed-header CSV ready for download.
pub async fn export_reconciliation(
    Json(result): Json<ReconciliationResult>,
) -> Result<(HeaderMap, String), AppError> {
    let csv = export_csv(&result);

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/csv; charset=utf-8"),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_static("attachment; filename=\"conciliacion.csv\""),
    );

    Ok((headers, csv))
}
