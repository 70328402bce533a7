//! The reconciliation attempt pipeline
//!
//! Validate → quota → prompt → remote call → parse → normalize. The one
//! invariant everything downstream relies on: the result always carries
//! exactly one record per captured-table row, whatever the model replied.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::ai::parsing::{parse_reply, ReplyRecord};
use crate::ai::ModelBackend;
use crate::error::{Error, Result};
use crate::ingest::{parse_amount, parse_table, validate_upload};
use crate::models::{
    MatchStatus, ReconciliationRecord, ReconciliationResult, UploadedTable, NOT_AVAILABLE,
};
use crate::prompt::{build_prompt, GenerationParams};
use crate::quota::QuotaGate;

/// Note attached to records synthesized when the reply was unusable.
pub const FALLBACK_NOTE: &str = "Error en conciliación automática";

/// Header spellings for the captured customer name.
const NAME_COLUMNS: &[&str] = &["Nombre", "Cliente", "Name"];
/// Header spellings for the captured amount.
const AMOUNT_COLUMNS: &[&str] = &["Monto", "Importe", "Cantidad", "Amount"];
/// Header spellings for the captured operation date.
const DATE_COLUMNS: &[&str] = &["Fecha de Operación", "Fecha de Operacion", "Fecha", "Date"];
/// Header spellings for the captured phone handle.
const PHONE_COLUMNS: &[&str] = &[
    "WhatsApp",
    "Teléfono",
    "Telefono",
    "Celular",
    "Número",
    "Numero",
    "Phone",
];

/// One uploaded file, name plus raw bytes.
pub struct CsvUpload<'a> {
    pub filename: &'a str,
    pub data: &'a [u8],
}

/// Runs reconciliation attempts against a model backend behind a quota gate.
pub struct Reconciler<B: ModelBackend> {
    backend: B,
    quota: Arc<dyn QuotaGate>,
    params: GenerationParams,
}

impl<B: ModelBackend> Reconciler<B> {
    pub fn new(backend: B, quota: Arc<dyn QuotaGate>) -> Self {
        Self {
            backend,
            quota,
            params: GenerationParams::default(),
        }
    }

    /// Run one full reconciliation attempt from raw uploads.
    ///
    /// File and quota failures abort before any network traffic. A remote
    /// failure releases the reserved quota slot. An unusable reply does NOT
    /// fail the attempt: it degrades to an all-unmatched result.
    pub async fn run(
        &self,
        primary_upload: CsvUpload<'_>,
        ledger_upload: CsvUpload<'_>,
    ) -> Result<ReconciliationResult> {
        validate_upload(primary_upload.filename, primary_upload.data.len())?;
        validate_upload(ledger_upload.filename, ledger_upload.data.len())?;

        let primary = parse_table(primary_upload.data)?;
        let ledger = parse_table(ledger_upload.data)?;

        self.reconcile_tables(&primary, &ledger).await
    }

    /// Run one attempt on already-parsed tables.
    pub async fn reconcile_tables(
        &self,
        primary: &UploadedTable,
        ledger: &UploadedTable,
    ) -> Result<ReconciliationResult> {
        let prompt = build_prompt(primary, ledger)?;

        // Reserve the slot immediately before the call; the slot is consumed
        // by a completed call even when the reply turns out to be unusable.
        let quota_state = self.quota.reserve()?;
        debug!(
            used = quota_state.used,
            limit = quota_state.limit,
            rows = primary.len(),
            "Quota reserved, invoking model"
        );

        let raw_reply = match self.backend.generate(&prompt, self.params).await {
            Ok(text) => text,
            Err(e) => {
                self.quota.release();
                return Err(e);
            }
        };

        let mut result = match interpret_reply(&raw_reply, primary) {
            Ok(records) => ReconciliationResult::new(records),
            Err(e) => {
                warn!(error = %e, "Unusable model reply, degrading to all-unmatched");
                let mut fallback = synthesize_fallback(primary);
                fallback.summary.error = Some(e.to_string());
                fallback
            }
        };

        attach_phone_handles(&mut result, primary);
        result.recompute_summary();

        info!(
            processed = result.summary.processed,
            matched = result.summary.matched,
            unmatched = result.summary.unmatched,
            "Reconciliation attempt finished"
        );

        debug_assert_eq!(result.records.len(), primary.len());
        Ok(result)
    }
}

/// Parse and shape-check the raw reply against the captured table.
///
/// A reply with the wrong number of detail entries is incomplete and
/// treated the same as garbage.
fn interpret_reply(raw: &str, primary: &UploadedTable) -> Result<Vec<ReconciliationRecord>> {
    let reply = parse_reply(raw)?;

    if reply.detail.len() != primary.len() {
        return Err(Error::InvalidData(format!(
            "Incomplete reply: {} detail entries for {} captured rows",
            reply.detail.len(),
            primary.len()
        )));
    }

    Ok(reply
        .detail
        .into_iter()
        .enumerate()
        .map(|(i, r)| normalize_record(r, primary, i))
        .collect())
}

/// Turn one lenient reply entry into a clean record.
///
/// Blank fields fall back to the sentinel, an unrecognized status counts as
/// unmatched, and notes survive only on unmatched records.
fn normalize_record(
    reply: ReplyRecord,
    primary: &UploadedTable,
    row: usize,
) -> ReconciliationRecord {
    let status = MatchStatus::parse(&reply.status).unwrap_or(MatchStatus::Unmatched);

    let or_sentinel = |s: String| {
        if s.trim().is_empty() {
            NOT_AVAILABLE.to_string()
        } else {
            s
        }
    };

    // The model sometimes drops identifying fields; recover them from the
    // captured row so the export stays readable.
    let name = if reply.name.trim().is_empty() {
        row_value(primary, row, NAME_COLUMNS).unwrap_or(NOT_AVAILABLE).to_string()
    } else {
        reply.name
    };
    let operation_date = if reply.operation_date.trim().is_empty() {
        row_value(primary, row, DATE_COLUMNS).unwrap_or(NOT_AVAILABLE).to_string()
    } else {
        reply.operation_date
    };

    ReconciliationRecord {
        name,
        amount: reply.amount,
        operation_date,
        tracking_key: or_sentinel(reply.tracking_key),
        reference_number: or_sentinel(reply.reference_number),
        folio_number: or_sentinel(reply.folio_number),
        concept: or_sentinel(reply.concept),
        status,
        note: match status {
            MatchStatus::Matched => String::new(),
            MatchStatus::Unmatched => reply.note,
        },
        whatsapp: None,
    }
}

/// Synthesize one unmatched record per captured row.
pub fn synthesize_fallback(primary: &UploadedTable) -> ReconciliationResult {
    let records = (0..primary.len())
        .map(|row| {
            ReconciliationRecord::fallback(
                row_value(primary, row, NAME_COLUMNS).unwrap_or(NOT_AVAILABLE),
                parse_amount(row_value(primary, row, AMOUNT_COLUMNS).unwrap_or("")),
                row_value(primary, row, DATE_COLUMNS).unwrap_or(NOT_AVAILABLE),
                FALLBACK_NOTE,
            )
        })
        .collect();
    ReconciliationResult::new(records)
}

fn row_value<'a>(table: &'a UploadedTable, row: usize, candidates: &[&str]) -> Option<&'a str> {
    let col = table.column(candidates)?;
    table
        .rows
        .get(row)?
        .get(col)
        .map(|s| s.as_str())
        .filter(|s| !s.trim().is_empty())
}

/// Attach WhatsApp handles to unmatched records by referencing them back to
/// captured rows. Matched payments need no outreach.
///
/// Back-reference is exact equality: trimmed name, amount within one cent,
/// trimmed date string. Rows without a phone column or with an unusable
/// phone value simply leave the handle empty.
pub fn attach_phone_handles(result: &mut ReconciliationResult, primary: &UploadedTable) {
    let phone_col = match primary.column(PHONE_COLUMNS) {
        Some(col) => col,
        None => return,
    };
    let name_col = primary.column(NAME_COLUMNS);
    let amount_col = primary.column(AMOUNT_COLUMNS);
    let date_col = primary.column(DATE_COLUMNS);

    for record in &mut result.records {
        if record.status == MatchStatus::Matched {
            continue;
        }
        let matching_row = primary.rows.iter().find(|row| {
            let name_ok = name_col
                .and_then(|c| row.get(c))
                .map(|v| v.trim() == record.name.trim())
                .unwrap_or(false);
            let amount_ok = amount_col
                .and_then(|c| row.get(c))
                .map(|v| (parse_amount(v) - record.amount).abs() < 0.01)
                .unwrap_or(false);
            let date_ok = date_col
                .and_then(|c| row.get(c))
                .map(|v| v.trim() == record.operation_date.trim())
                .unwrap_or(true);
            name_ok && amount_ok && date_ok
        });

        record.whatsapp = matching_row
            .and_then(|row| row.get(phone_col))
            .and_then(|raw| normalize_phone(raw));
    }
}

/// Normalize a captured phone value to `52` + 10-digit core.
///
/// Non-digits are stripped first, so labels ("tel: ...") and separators are
/// tolerated. Bot exports glue a timestamp after the number
/// ("5216645487274_2025-02-.."); the fixed-width slices below never reach
/// those trailing digits. A `521` mobile prefix collapses to `52`; a bare
/// 10-digit number gets the country code added.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    let core = if digits.len() >= 13 && digits.starts_with("521") {
        &digits[3..13]
    } else if digits.len() >= 12 && digits.starts_with("52") {
        &digits[2..12]
    } else if digits.len() >= 10 {
        &digits[..10]
    } else {
        return None;
    };

    Some(format!("52{}", core))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockBackend;
    use crate::quota::MemoryQuota;

    fn primary_csv() -> &'static [u8] {
        b"Nombre,Monto,Fecha,Telefono\n\
          Ana,1500.00,2025-02-01,5216645487274_2025-02-01T10:00\n\
          Luis,200,2025-02-02,6641234567\n"
    }

    fn ledger_csv() -> &'static [u8] {
        b"Titular,Importe,Fecha,Clave de Rastreo\n\
          ANA PEREZ,1500.00,2025-02-01,CR123\n"
    }

    fn reconciler(reply: &str) -> Reconciler<MockBackend> {
        Reconciler::new(
            MockBackend::with_reply(reply),
            Arc::new(MemoryQuota::new(10)),
        )
    }

    const GOOD_REPLY: &str = r#"{"summary": {"processed": 2, "matched": 1, "unmatched": 1},
        "detail": [
          {"name": "Ana", "amount": 1500.0, "operation_date": "2025-02-01",
           "tracking_key": "CR123", "reference_number": "777", "folio_number": "9",
           "concept": "pago", "status": "matched", "note": "should be dropped"},
          {"name": "Luis", "amount": 200, "operation_date": "2025-02-02",
           "tracking_key": "", "reference_number": "", "folio_number": "",
           "concept": "", "status": "unmatched", "note": "sin registro en banco"}
        ]}"#;

    #[tokio::test]
    async fn test_successful_attempt_partitions_and_counts() {
        let r = reconciler(GOOD_REPLY);
        let result = r
            .run(
                CsvUpload { filename: "pagos.csv", data: primary_csv() },
                CsvUpload { filename: "banco.csv", data: ledger_csv() },
            )
            .await
            .unwrap();

        assert_eq!(result.summary.processed, 2);
        assert_eq!(result.summary.matched, 1);
        assert_eq!(result.summary.unmatched, 1);
        assert!(result.summary.error.is_none());

        // Matched records never carry a note; blanks become the sentinel.
        assert_eq!(result.records[0].note, "");
        assert_eq!(result.records[1].tracking_key, NOT_AVAILABLE);
        assert_eq!(result.records[1].note, "sin registro en banco");
    }

    #[tokio::test]
    async fn test_unparseable_reply_degrades_to_fallback() {
        let r = reconciler("Lo siento, no puedo procesar estas tablas.");
        let result = r
            .run(
                CsvUpload {
                    filename: "pagos.csv",
                    data: b"Nombre,Monto\nAna,100\nLuis,50\n",
                },
                CsvUpload { filename: "banco.csv", data: ledger_csv() },
            )
            .await
            .unwrap();

        assert_eq!(result.records.len(), 2);
        assert!(result.records.iter().all(|rec| {
            rec.status == MatchStatus::Unmatched
                && rec.note == FALLBACK_NOTE
                && rec.tracking_key == NOT_AVAILABLE
        }));
        assert_eq!(result.records[0].name, "Ana");
        assert_eq!(result.records[0].amount, 100.0);
        assert_eq!(result.records[1].name, "Luis");
        assert_eq!(result.records[1].amount, 50.0);
        assert!(result.summary.error.is_some());
    }

    #[tokio::test]
    async fn test_incomplete_reply_counts_as_unusable() {
        // One detail entry for two captured rows.
        let r = reconciler(
            r#"{"detail": [{"name": "Ana", "amount": 1500.0,
                "operation_date": "2025-02-01", "status": "matched"}]}"#,
        );
        let result = r
            .run(
                CsvUpload { filename: "pagos.csv", data: primary_csv() },
                CsvUpload { filename: "banco.csv", data: ledger_csv() },
            )
            .await
            .unwrap();

        assert_eq!(result.records.len(), 2);
        assert_eq!(result.summary.unmatched, 2);
        assert!(result.summary.error.as_deref().unwrap().contains("Incomplete reply"));
    }

    #[tokio::test]
    async fn test_file_gate_rejects_before_quota() {
        let quota = Arc::new(MemoryQuota::new(10));
        let r = Reconciler::new(MockBackend::new(), quota.clone());

        let err = r
            .run(
                CsvUpload { filename: "pagos.txt", data: primary_csv() },
                CsvUpload { filename: "banco.csv", data: ledger_csv() },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::File(_)));
        assert_eq!(quota.state().used, 0);
    }

    #[tokio::test]
    async fn test_quota_exhausted_blocks_attempt() {
        let quota = Arc::new(MemoryQuota::new(0));
        let r = Reconciler::new(MockBackend::new(), quota);
        let err = r
            .run(
                CsvUpload { filename: "pagos.csv", data: primary_csv() },
                CsvUpload { filename: "banco.csv", data: ledger_csv() },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::QuotaExceeded { .. }));
    }

    #[tokio::test]
    async fn test_unusable_reply_still_consumes_quota() {
        let quota = Arc::new(MemoryQuota::new(10));
        let r = Reconciler::new(
            MockBackend::with_reply("no json"),
            quota.clone(),
        );
        r.run(
            CsvUpload { filename: "pagos.csv", data: primary_csv() },
            CsvUpload { filename: "banco.csv", data: ledger_csv() },
        )
        .await
        .unwrap();
        assert_eq!(quota.state().used, 1);
    }

    #[test]
    fn test_normalize_phone_variants() {
        // Bot export with glued metadata and 521 mobile prefix.
        assert_eq!(
            normalize_phone("5216645487274_2025-02-01T10:00").as_deref(),
            Some("526645487274")
        );
        // Already 52 + 10 digits.
        assert_eq!(normalize_phone("526645487274").as_deref(), Some("526645487274"));
        // Bare 10-digit local number.
        assert_eq!(normalize_phone("6641234567").as_deref(), Some("526641234567"));
        // Labels and separators are stripped before the prefix repair.
        assert_eq!(normalize_phone("tel: 6641234567").as_deref(), Some("526641234567"));
        assert_eq!(normalize_phone("664-123-4567").as_deref(), Some("526641234567"));
        // Too short.
        assert_eq!(normalize_phone("12345"), None);
        assert_eq!(normalize_phone(""), None);
    }

    #[tokio::test]
    async fn test_phone_handles_attached_by_back_reference() {
        let r = reconciler(GOOD_REPLY);
        let result = r
            .run(
                CsvUpload { filename: "pagos.csv", data: primary_csv() },
                CsvUpload { filename: "banco.csv", data: ledger_csv() },
            )
            .await
            .unwrap();

        // Only the unmatched payment needs outreach; the matched one stays
        // without a handle even though its row has a phone.
        assert_eq!(result.records[0].whatsapp, None);
        assert_eq!(result.records[1].whatsapp.as_deref(), Some("526641234567"));
    }

    #[test]
    fn test_fallback_without_phone_column_leaves_handle_empty() {
        let table = parse_table("Nombre,Monto\nAna,100\n".as_bytes()).unwrap();
        let mut result = synthesize_fallback(&table);
        attach_phone_handles(&mut result, &table);
        assert_eq!(result.records[0].whatsapp, None);
    }
}
