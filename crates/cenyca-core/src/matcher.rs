//! Local deterministic matcher
//!
//! Implements the same three-tier policy the model is asked to follow, but
//! as plain code: exact tracking key, then strong name+amount+date, then a
//! flexible heuristic. Used for offline runs and as a testable oracle for
//! the policy semantics. Ambiguity is resolved by not resolving it: rows
//! with more than one equally strong candidate stay unmatched for review.

use tracing::debug;

use crate::ingest::parse_amount;
use crate::models::{
    MatchStatus, ReconciliationRecord, ReconciliationResult, UploadedTable, NOT_AVAILABLE,
};

const NAME_COLUMNS: &[&str] = &["Nombre", "Cliente", "Titular", "Name"];
const AMOUNT_COLUMNS: &[&str] = &["Monto", "Importe", "Cantidad", "Amount"];
const DATE_COLUMNS: &[&str] = &["Fecha de Operación", "Fecha de Operacion", "Fecha", "Date"];
const TRACKING_COLUMNS: &[&str] = &["Clave de Rastreo", "Clave", "Tracking Key"];
const REFERENCE_COLUMNS: &[&str] = &[
    "Número de Referencia",
    "Numero de Referencia",
    "Referencia",
];
const FOLIO_COLUMNS: &[&str] = &["Número de Folio", "Numero de Folio", "Folio"];
const CONCEPT_COLUMNS: &[&str] = &["Concepto", "Concept"];

const AMOUNT_EPSILON: f64 = 0.01;

/// Note for rows where two or more ledger rows were equally plausible.
pub const AMBIGUOUS_NOTE: &str = "Coincidencia ambigua, requiere revisión manual";
/// Note for rows with no plausible ledger counterpart.
pub const NO_MATCH_NOTE: &str = "Sin coincidencia en el estado de cuenta";

/// A ledger row flattened into typed fields once, up front.
struct LedgerEntry {
    name: String,
    amount: f64,
    date: String,
    tracking_key: String,
    reference_number: String,
    folio_number: String,
    concept: String,
    consumed: bool,
}

fn field(table: &UploadedTable, row: &[String], candidates: &[&str]) -> String {
    table
        .column(candidates)
        .and_then(|c| row.get(c))
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

fn ledger_entries(ledger: &UploadedTable) -> Vec<LedgerEntry> {
    ledger
        .rows
        .iter()
        .map(|row| LedgerEntry {
            name: field(ledger, row, NAME_COLUMNS),
            amount: parse_amount(&field(ledger, row, AMOUNT_COLUMNS)),
            date: field(ledger, row, DATE_COLUMNS),
            tracking_key: field(ledger, row, TRACKING_COLUMNS),
            reference_number: field(ledger, row, REFERENCE_COLUMNS),
            folio_number: field(ledger, row, FOLIO_COLUMNS),
            concept: field(ledger, row, CONCEPT_COLUMNS),
            consumed: false,
        })
        .collect()
}

fn same_name(a: &str, b: &str) -> bool {
    !a.is_empty() && a.eq_ignore_ascii_case(b)
}

fn same_amount(a: f64, b: f64) -> bool {
    (a - b).abs() < AMOUNT_EPSILON
}

/// Reconcile the captured table against the ledger without the model.
///
/// Deterministic: same inputs, same output. Each ledger row justifies at
/// most one match.
pub fn reconcile_locally(primary: &UploadedTable, ledger: &UploadedTable) -> ReconciliationResult {
    let mut entries = ledger_entries(ledger);

    let records = primary
        .rows
        .iter()
        .map(|row| {
            let name = field(primary, row, NAME_COLUMNS);
            let amount = parse_amount(&field(primary, row, AMOUNT_COLUMNS));
            let date = field(primary, row, DATE_COLUMNS);
            let tracking = field(primary, row, TRACKING_COLUMNS);

            match find_match(&entries, &name, amount, &date, &tracking) {
                Outcome::Match(idx) => {
                    let entry = &mut entries[idx];
                    entry.consumed = true;
                    matched_record(&name, amount, &date, entry)
                }
                Outcome::Ambiguous => unmatched_record(&name, amount, &date, AMBIGUOUS_NOTE),
                Outcome::None => unmatched_record(&name, amount, &date, NO_MATCH_NOTE),
            }
        })
        .collect();

    let result = ReconciliationResult::new(records);
    debug!(
        matched = result.summary.matched,
        unmatched = result.summary.unmatched,
        "Local reconciliation finished"
    );
    result
}

enum Outcome {
    Match(usize),
    Ambiguous,
    None,
}

fn find_match(
    entries: &[LedgerEntry],
    name: &str,
    amount: f64,
    date: &str,
    tracking: &str,
) -> Outcome {
    // Tier 1: exact tracking key, only when the key is unique in the ledger.
    if !tracking.is_empty() {
        let hits: Vec<usize> = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.tracking_key == tracking)
            .map(|(i, _)| i)
            .collect();
        match hits.as_slice() {
            [only] if !entries[*only].consumed => return Outcome::Match(*only),
            [] => {}
            _ => return Outcome::Ambiguous,
        }
    }

    // Tier 2: same name, same amount, same date.
    let strong: Vec<usize> = entries
        .iter()
        .enumerate()
        .filter(|(_, e)| {
            !e.consumed && same_name(&e.name, name) && same_amount(e.amount, amount) && e.date == date
        })
        .map(|(i, _)| i)
        .collect();
    match strong.as_slice() {
        [only] => return Outcome::Match(*only),
        [] => {}
        _ => return Outcome::Ambiguous,
    }

    // Tier 3: amount+date without the name, or name+amount without the date.
    let flexible: Vec<usize> = entries
        .iter()
        .enumerate()
        .filter(|(_, e)| {
            !e.consumed
                && same_amount(e.amount, amount)
                && (e.date == date || same_name(&e.name, name))
        })
        .map(|(i, _)| i)
        .collect();
    match flexible.as_slice() {
        [only] => Outcome::Match(*only),
        [] => Outcome::None,
        _ => Outcome::Ambiguous,
    }
}

fn sentinel(s: &str) -> String {
    if s.is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        s.to_string()
    }
}

fn matched_record(name: &str, amount: f64, date: &str, entry: &LedgerEntry) -> ReconciliationRecord {
    ReconciliationRecord {
        name: sentinel(name),
        amount,
        operation_date: sentinel(date),
        tracking_key: sentinel(&entry.tracking_key),
        reference_number: sentinel(&entry.reference_number),
        folio_number: sentinel(&entry.folio_number),
        concept: sentinel(&entry.concept),
        status: MatchStatus::Matched,
        note: String::new(),
        whatsapp: None,
    }
}

fn unmatched_record(name: &str, amount: f64, date: &str, note: &str) -> ReconciliationRecord {
    ReconciliationRecord::fallback(&sentinel(name), amount, &sentinel(date), note)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::parse_table;

    fn tables(primary: &str, ledger: &str) -> (UploadedTable, UploadedTable) {
        (
            parse_table(primary.as_bytes()).unwrap(),
            parse_table(ledger.as_bytes()).unwrap(),
        )
    }

    #[test]
    fn test_tier1_exact_tracking_key_wins() {
        let (primary, ledger) = tables(
            "Nombre,Monto,Fecha,Clave de Rastreo\nAna,999,2025-02-09,CR42\n",
            "Titular,Importe,Fecha,Clave de Rastreo,Concepto\n\
             OTRO NOMBRE,1500,2025-01-01,CR42,transferencia\n",
        );
        let result = reconcile_locally(&primary, &ledger);
        // Name, amount, and date all disagree; the key alone decides.
        assert_eq!(result.records[0].status, MatchStatus::Matched);
        assert_eq!(result.records[0].tracking_key, "CR42");
        assert_eq!(result.records[0].concept, "transferencia");
    }

    #[test]
    fn test_tier1_duplicate_key_is_ambiguous() {
        let (primary, ledger) = tables(
            "Nombre,Monto,Fecha,Clave de Rastreo\nAna,100,2025-02-09,CR42\n",
            "Titular,Importe,Fecha,Clave de Rastreo\nA,100,2025-02-09,CR42\nB,100,2025-02-09,CR42\n",
        );
        let result = reconcile_locally(&primary, &ledger);
        assert_eq!(result.records[0].status, MatchStatus::Unmatched);
        assert_eq!(result.records[0].note, AMBIGUOUS_NOTE);
    }

    #[test]
    fn test_tier2_strong_combination() {
        let (primary, ledger) = tables(
            "Nombre,Monto,Fecha\nana perez,1500.00,2025-02-01\n",
            "Titular,Importe,Fecha,Número de Folio\nANA PEREZ,1500,2025-02-01,F77\n",
        );
        let result = reconcile_locally(&primary, &ledger);
        assert_eq!(result.records[0].status, MatchStatus::Matched);
        assert_eq!(result.records[0].folio_number, "F77");
        // Missing ledger fields come back as the sentinel.
        assert_eq!(result.records[0].reference_number, NOT_AVAILABLE);
    }

    #[test]
    fn test_tier3_amount_and_date_without_name() {
        let (primary, ledger) = tables(
            "Nombre,Monto,Fecha\nAna,350.50,2025-02-03\n",
            "Titular,Importe,Fecha\nDEPOSITO EFECTIVO,350.50,2025-02-03\n",
        );
        let result = reconcile_locally(&primary, &ledger);
        assert_eq!(result.records[0].status, MatchStatus::Matched);
    }

    #[test]
    fn test_no_candidate_leaves_unmatched() {
        let (primary, ledger) = tables(
            "Nombre,Monto,Fecha\nAna,350.50,2025-02-03\n",
            "Titular,Importe,Fecha\nLUIS,99,2025-02-04\n",
        );
        let result = reconcile_locally(&primary, &ledger);
        assert_eq!(result.records[0].status, MatchStatus::Unmatched);
        assert_eq!(result.records[0].note, NO_MATCH_NOTE);
        assert_eq!(result.records[0].tracking_key, NOT_AVAILABLE);
    }

    #[test]
    fn test_ledger_row_consumed_once() {
        // Two identical captured payments, one ledger row: the second one
        // must not reuse the consumed row.
        let (primary, ledger) = tables(
            "Nombre,Monto,Fecha\nAna,100,2025-02-01\nAna,100,2025-02-01\n",
            "Titular,Importe,Fecha\nANA,100,2025-02-01\n",
        );
        let result = reconcile_locally(&primary, &ledger);
        assert_eq!(result.summary.matched, 1);
        assert_eq!(result.summary.unmatched, 1);
    }

    #[test]
    fn test_two_equal_candidates_are_ambiguous() {
        let (primary, ledger) = tables(
            "Nombre,Monto,Fecha\nAna,100,2025-02-01\n",
            "Titular,Importe,Fecha\nANA,100,2025-02-01\nANA,100,2025-02-01\n",
        );
        let result = reconcile_locally(&primary, &ledger);
        assert_eq!(result.records[0].status, MatchStatus::Unmatched);
        assert_eq!(result.records[0].note, AMBIGUOUS_NOTE);
    }

    #[test]
    fn test_totality_one_record_per_row() {
        let (primary, ledger) = tables(
            "Nombre,Monto,Fecha\nA,1,2025-02-01\nB,2,2025-02-02\nC,3,2025-02-03\n",
            "Titular,Importe,Fecha\nB,2,2025-02-02\n",
        );
        let result = reconcile_locally(&primary, &ledger);
        assert_eq!(result.records.len(), primary.len());
        assert_eq!(
            result.summary.processed,
            result.summary.matched + result.summary.unmatched
        );
    }
}
