//! CSV ingestion for the captured-payments table and the bank ledger
//!
//! Both uploads go through the same gate: extension and size are checked
//! before a single byte is parsed, and the parser keeps every cell as a
//! string so typed interpretation can be deferred to reconciliation.

use std::io::Read;

use csv::ReaderBuilder;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::UploadedTable;

/// Maximum accepted upload size per file (5 MB).
pub const MAX_FILE_SIZE: usize = 5 * 1024 * 1024;

/// Validate an upload before parsing.
///
/// Rejects anything that is not a `.csv` (case-insensitive) and anything
/// over [`MAX_FILE_SIZE`]. Runs before the quota gate and before any
/// network traffic.
pub fn validate_upload(filename: &str, size: usize) -> Result<()> {
    let is_csv = filename
        .rsplit('.')
        .next()
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false)
        && filename.contains('.');

    if !is_csv {
        return Err(Error::File(format!(
            "'{}' is not a CSV file. Only .csv files are accepted.",
            filename
        )));
    }

    if size > MAX_FILE_SIZE {
        return Err(Error::File(format!(
            "'{}' is too large ({:.1} MB). The maximum size is {} MB.",
            filename,
            size as f64 / 1024.0 / 1024.0,
            MAX_FILE_SIZE / 1024 / 1024
        )));
    }

    Ok(())
}

/// Parse CSV data into an [`UploadedTable`].
///
/// First row is the header. Flexible mode tolerates ragged rows (short rows
/// are padded with empty cells so column lookups stay total).
pub fn parse_table<R: Read>(reader: R) -> Result<UploadedTable> {
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(Error::File(
            "The CSV file has no header row.".to_string(),
        ));
    }

    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        let mut row: Vec<String> = record.iter().map(|c| c.to_string()).collect();
        row.resize(headers.len(), String::new());
        rows.push(row);
    }

    if rows.is_empty() {
        return Err(Error::File(
            "The CSV file has a header but no data rows.".to_string(),
        ));
    }

    debug!(columns = ?headers, rows = rows.len(), "Parsed CSV table");

    Ok(UploadedTable { headers, rows })
}

/// Parse a display amount into a number.
///
/// Strips currency symbols, thousands separators, and whitespace. Falls
/// back to 0.0 rather than failing; a bad amount cell should not sink the
/// whole attempt.
pub fn parse_amount(raw: &str) -> f64 {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    cleaned.parse().unwrap_or(0.0)
}
