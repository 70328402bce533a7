//! `cenyca reconcile` command

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use cenyca_core::{
    export_csv, reconcile::attach_phone_handles, reconcile_locally, validate_upload, CsvUpload,
    MemoryQuota, ModelClient, ReconciliationResult, Reconciler,
};

/// Run one reconciliation from two local CSV files.
pub async fn cmd_reconcile(
    primary_path: &Path,
    ledger_path: &Path,
    output: Option<&Path>,
    offline: bool,
) -> Result<()> {
    let primary_name = file_name(primary_path);
    let ledger_name = file_name(ledger_path);

    let primary_data = std::fs::read(primary_path)
        .with_context(|| format!("Cannot read {}", primary_path.display()))?;
    let ledger_data = std::fs::read(ledger_path)
        .with_context(|| format!("Cannot read {}", ledger_path.display()))?;

    let result = if offline {
        run_offline(&primary_name, &primary_data, &ledger_name, &ledger_data)?
    } else {
        run_remote(&primary_name, &primary_data, &ledger_name, &ledger_data).await?
    };

    print_summary(&result);

    let csv = export_csv(&result);
    match output {
        Some(path) => {
            std::fs::write(path, &csv)
                .with_context(|| format!("Cannot write {}", path.display()))?;
            println!("Export written to {}", path.display());
        }
        None => print!("{}", csv),
    }

    Ok(())
}

fn run_offline(
    primary_name: &str,
    primary_data: &[u8],
    ledger_name: &str,
    ledger_data: &[u8],
) -> Result<ReconciliationResult> {
    validate_upload(primary_name, primary_data.len())?;
    validate_upload(ledger_name, ledger_data.len())?;

    let primary = cenyca_core::parse_table(primary_data)?;
    let ledger = cenyca_core::parse_table(ledger_data)?;

    let mut result = reconcile_locally(&primary, &ledger);
    attach_phone_handles(&mut result, &primary);
    result.recompute_summary();
    Ok(result)
}

async fn run_remote(
    primary_name: &str,
    primary_data: &[u8],
    ledger_name: &str,
    ledger_data: &[u8],
) -> Result<ReconciliationResult> {
    let Some(backend) = ModelClient::from_env() else {
        bail!("No model backend configured. Set GEMINI_API_KEY, or use --offline.");
    };

    let reconciler = Reconciler::new(backend, Arc::new(MemoryQuota::default()));
    let result = reconciler
        .run(
            CsvUpload {
                filename: primary_name,
                data: primary_data,
            },
            CsvUpload {
                filename: ledger_name,
                data: ledger_data,
            },
        )
        .await?;
    Ok(result)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn print_summary(result: &ReconciliationResult) {
    println!("Procesados:    {}", result.summary.processed);
    println!("Conciliados:   {}", result.summary.matched);
    println!("No conciliados: {}", result.summary.unmatched);
    if let Some(error) = &result.summary.error {
        println!("Aviso: {}", error);
    }
    println!();
}
