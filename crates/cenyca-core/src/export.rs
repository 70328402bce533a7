//! Reconciliation export: fixed-header CSV and WhatsApp outreach links

use crate::models::{MatchStatus, ReconciliationRecord, ReconciliationResult};

/// Column header of the export CSV. Downstream spreadsheets key on these
/// exact names, so the header never changes.
pub const EXPORT_HEADER: &str = "Nombre,Monto,Fecha de Operación,Estado,Clave de Rastreo,Número de Referencia,Número de Folio,Concepto,Nota,WhatsApp";

/// Message template behind each wa.me link, interpolated per record.
const OUTREACH_TEMPLATE: &str = "Hola {name}, te contactamos sobre tu pago de ${amount} con fecha {date} (referencia: {reference}). No pudimos conciliarlo con el estado de cuenta. ¿Nos ayudas a verificarlo?";

/// Render the full reconciliation result as CSV text.
pub fn export_csv(result: &ReconciliationResult) -> String {
    let mut out = String::from(EXPORT_HEADER);
    out.push('\n');

    for record in &result.records {
        let link = whatsapp_link(record).unwrap_or_default();
        let amount = format!("{:.2}", record.amount);
        let fields = [
            record.name.as_str(),
            amount.as_str(),
            record.operation_date.as_str(),
            record.status.label(),
            record.tracking_key.as_str(),
            record.reference_number.as_str(),
            record.folio_number.as_str(),
            record.concept.as_str(),
            record.note.as_str(),
            link.as_str(),
        ]
        .map(escape_csv_field);
        out.push_str(&fields.join(","));
        out.push('\n');
    }

    out
}

/// Build the `wa.me` outreach link for an unmatched record, when it has a
/// phone handle. Matched payments never get one; the message asks the
/// customer to verify an unreconciled payment.
pub fn whatsapp_link(record: &ReconciliationRecord) -> Option<String> {
    if record.status == MatchStatus::Matched {
        return None;
    }
    let phone = record.whatsapp.as_deref()?;

    let message = OUTREACH_TEMPLATE
        .replace("{name}", &record.name)
        .replace("{amount}", &format!("{:.2}", record.amount))
        .replace("{date}", &record.operation_date)
        .replace("{reference}", &record.reference_number);

    Some(format!(
        "https://wa.me/{}?text={}",
        phone,
        urlencoding::encode(&message)
    ))
}

/// Quote a field if it contains a comma, quote, or newline.
fn escape_csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
