//! Data model for the reconciliation pipeline
//!
//! Everything here is plain data: the uploaded tables, the per-row
//! reconciliation records, the summary, and the quota snapshot. Behavior
//! lives in the pipeline modules (`ingest`, `reconcile`, `export`).

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Placeholder for fields the model (or the source table) did not provide.
pub const NOT_AVAILABLE: &str = "No disponible";

/// An uploaded CSV table, header row plus string cells.
///
/// Cells are kept as strings; typed interpretation (amounts, dates) happens
/// at reconciliation time so that a malformed cell never aborts ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl UploadedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Look up a cell by header name (case-insensitive, trimmed).
    pub fn value(&self, row: usize, header: &str) -> Option<&str> {
        let col = self
            .headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(header.trim()))?;
        self.rows.get(row)?.get(col).map(|s| s.as_str())
    }

    /// Position of the first header matching any of the given names.
    pub fn column(&self, candidates: &[&str]) -> Option<usize> {
        self.headers.iter().position(|h| {
            candidates
                .iter()
                .any(|c| h.trim().eq_ignore_ascii_case(c.trim()))
        })
    }

    /// Serialize the table back into CSV text for prompt embedding.
    ///
    /// Uses the csv writer so quoting survives the round trip exactly.
    pub fn to_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| Error::InvalidData(format!("CSV buffer error: {}", e)))?;
        String::from_utf8(bytes)
            .map_err(|e| Error::InvalidData(format!("Non-UTF8 CSV output: {}", e)))
    }
}

/// Whether a captured payment was found in the bank ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Matched,
    Unmatched,
}

impl MatchStatus {
    /// Spanish label used in the export CSV and the UI.
    pub fn label(&self) -> &'static str {
        match self {
            MatchStatus::Matched => "Conciliado",
            MatchStatus::Unmatched => "No conciliado",
        }
    }

    /// Parse the status as models tend to spell it, in either language.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "matched" | "conciliado" | "match" => Some(MatchStatus::Matched),
            "unmatched" | "no conciliado" | "no_match" | "nomatch" => Some(MatchStatus::Unmatched),
            _ => None,
        }
    }
}

/// One reconciled payment, aligned 1:1 with a row of the captured table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationRecord {
    pub name: String,
    pub amount: f64,
    pub operation_date: String,
    pub tracking_key: String,
    pub reference_number: String,
    pub folio_number: String,
    pub concept: String,
    pub status: MatchStatus,
    /// Diagnostic note, only populated for unmatched records.
    #[serde(default)]
    pub note: String,
    /// Normalized phone in international format, when the source row had one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whatsapp: Option<String>,
}

impl ReconciliationRecord {
    /// An all-defaults unmatched record for a captured row the model could
    /// not (or did not) account for.
    pub fn fallback(name: &str, amount: f64, operation_date: &str, note: &str) -> Self {
        Self {
            name: name.to_string(),
            amount,
            operation_date: operation_date.to_string(),
            tracking_key: NOT_AVAILABLE.to_string(),
            reference_number: NOT_AVAILABLE.to_string(),
            folio_number: NOT_AVAILABLE.to_string(),
            concept: NOT_AVAILABLE.to_string(),
            status: MatchStatus::Unmatched,
            note: note.to_string(),
            whatsapp: None,
        }
    }
}

/// Aggregate counts for one reconciliation attempt.
///
/// Always derived from the record list, never taken from the model reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    pub processed: usize,
    pub matched: usize,
    pub unmatched: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The full outcome of a reconciliation attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub summary: ReconciliationSummary,
    pub records: Vec<ReconciliationRecord>,
}

impl ReconciliationResult {
    pub fn new(records: Vec<ReconciliationRecord>) -> Self {
        let mut result = Self {
            summary: ReconciliationSummary::default(),
            records,
        };
        result.recompute_summary();
        result
    }

    pub fn matched(&self) -> impl Iterator<Item = &ReconciliationRecord> {
        self.records
            .iter()
            .filter(|r| r.status == MatchStatus::Matched)
    }

    pub fn unmatched(&self) -> impl Iterator<Item = &ReconciliationRecord> {
        self.records
            .iter()
            .filter(|r| r.status == MatchStatus::Unmatched)
    }

    /// Recount the summary from the record partition.
    pub fn recompute_summary(&mut self) {
        let matched = self.matched().count();
        self.summary.processed = self.records.len();
        self.summary.matched = matched;
        self.summary.unmatched = self.records.len() - matched;
    }
}

/// Snapshot of the monthly usage counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaState {
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
    pub limit_reached: bool,
}

impl QuotaState {
    pub fn new(used: u32, limit: u32) -> Self {
        Self {
            used,
            limit,
            remaining: limit.saturating_sub(used),
            limit_reached: used >= limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> UploadedTable {
        UploadedTable {
            headers: vec!["Nombre".into(), "Monto".into(), "Fecha".into()],
            rows: vec![
                vec!["Ana".into(), "1500.00".into(), "2025-02-01".into()],
                vec!["Luis, Jr.".into(), "200".into(), "2025-02-02".into()],
            ],
        }
    }

    #[test]
    fn test_value_lookup_is_case_insensitive() {
        let t = table();
        assert_eq!(t.value(0, "nombre"), Some("Ana"));
        assert_eq!(t.value(1, " MONTO "), Some("200"));
        assert_eq!(t.value(0, "telefono"), None);
        assert_eq!(t.value(5, "Nombre"), None);
    }

    #[test]
    fn test_to_csv_round_trips_quoted_fields() {
        let t = table();
        let csv_text = t.to_csv().unwrap();
        assert!(csv_text.contains("\"Luis, Jr.\""));

        let mut reader = csv::Reader::from_reader(csv_text.as_bytes());
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[1][0], "Luis, Jr.");
    }

    #[test]
    fn test_status_parse_accepts_both_languages() {
        assert_eq!(MatchStatus::parse("Conciliado"), Some(MatchStatus::Matched));
        assert_eq!(MatchStatus::parse("matched"), Some(MatchStatus::Matched));
        assert_eq!(
            MatchStatus::parse("NO CONCILIADO"),
            Some(MatchStatus::Unmatched)
        );
        assert_eq!(MatchStatus::parse("pending"), None);
    }

    #[test]
    fn test_recompute_summary_from_partition() {
        let mut result = ReconciliationResult::new(vec![
            ReconciliationRecord::fallback("Ana", 1500.0, "2025-02-01", "nota"),
            ReconciliationRecord {
                status: MatchStatus::Matched,
                ..ReconciliationRecord::fallback("Luis", 200.0, "2025-02-02", "")
            },
        ]);
        assert_eq!(result.summary.processed, 2);
        assert_eq!(result.summary.matched, 1);
        assert_eq!(result.summary.unmatched, 1);

        // A stale summary is always overwritten by the partition counts.
        result.summary.matched = 99;
        result.recompute_summary();
        assert_eq!(result.summary.matched, 1);
    }

    #[test]
    fn test_quota_state_saturates() {
        let state = QuotaState::new(7, 5);
        assert_eq!(state.remaining, 0);
        assert!(state.limit_reached);
    }
}
