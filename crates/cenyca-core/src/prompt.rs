//! Prompt assembly for a reconciliation attempt

use serde::Serialize;

use crate::error::Result;
use crate::models::UploadedTable;
use crate::policy::RECONCILIATION_POLICY;

/// Generation parameters attached to every remote call.
///
/// Temperature stays low on purpose: reconciliation wants near-deterministic
/// output, not creative prose.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.05,
            max_output_tokens: 8192,
        }
    }
}

/// Build the full prompt: both tables serialized back through the CSV
/// dialect, followed by the fixed policy block.
pub fn build_prompt(primary: &UploadedTable, ledger: &UploadedTable) -> Result<String> {
    let primary_csv = primary.to_csv()?;
    let ledger_csv = ledger.to_csv()?;

    Ok(format!(
        "TABLE 1 (captured payments, {} rows):\n{}\nTABLE 2 (bank ledger, {} rows):\n{}\n{}",
        primary.len(),
        primary_csv,
        ledger.len(),
        ledger_csv,
        RECONCILIATION_POLICY
    ))
}
