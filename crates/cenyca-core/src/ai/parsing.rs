//! JSON parsing helpers for model replies
//!
//! Model replies often wrap the JSON payload in prose or markdown fences.
//! These helpers locate the payload, tolerate the usual shape drift
//! (amounts as strings, missing fields), and report what they saw when
//! nothing parses.

use serde::{Deserialize, Deserializer};

use crate::error::{Error, Result};
use crate::models::NOT_AVAILABLE;

/// One `detail` entry as the model tends to spell it.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplyRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub amount: f64,
    #[serde(default)]
    pub operation_date: String,
    #[serde(default = "not_available")]
    pub tracking_key: String,
    #[serde(default = "not_available")]
    pub reference_number: String,
    #[serde(default = "not_available")]
    pub folio_number: String,
    #[serde(default = "not_available")]
    pub concept: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub note: String,
}

fn not_available() -> String {
    NOT_AVAILABLE.to_string()
}

/// The reply shape requested by the policy block.
///
/// The reply's `summary` block is deliberately dropped: counts are always
/// recomputed from the detail entries downstream.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelReply {
    #[serde(default)]
    pub detail: Vec<ReplyRecord>,
}

/// Accept an amount as a number or as a string like "1,500.00".
fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(f64),
        Text(String),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Num(n) => n,
        Raw::Text(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            cleaned.parse().unwrap_or(0.0)
        }
    })
}

/// Extract the first complete top-level JSON object from free-form text.
///
/// Scans brace depth while tracking string and escape state, so braces
/// inside prose or string literals cannot truncate or extend the span.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Parse a raw model reply into a [`ModelReply`].
///
/// Returns `Error::InvalidData` when no JSON object is present or the
/// payload does not deserialize; the caller decides how to degrade.
pub fn parse_reply(response: &str) -> Result<ModelReply> {
    let response = response.trim();

    let json_str = extract_json_object(response).ok_or_else(|| {
        Error::InvalidData(format!(
            "No JSON found in model reply | Raw: {}",
            truncate(response)
        ))
    })?;

    serde_json::from_str(json_str).map_err(|e| {
        Error::InvalidData(format!(
            "Invalid JSON from model: {} | Raw: {}",
            e,
            truncate(json_str)
        ))
    })
}

/// Truncate long replies for error messages.
fn truncate(s: &str) -> String {
    if s.len() > 200 {
        let mut end = 200;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_plain_object() {
        let text = r#"{"detail": []}"#;
        assert_eq!(extract_json_object(text), Some(text));
    }

    #[test]
    fn test_extract_ignores_surrounding_prose_and_fences() {
        let text = "Here is the result:\n```json\n{\"detail\": []}\n```\nDone.";
        assert_eq!(extract_json_object(text), Some("{\"detail\": []}"));
    }

    #[test]
    fn test_extract_braces_inside_strings_do_not_truncate() {
        let text = r#"note first: {"detail": [{"note": "missing } in ledger {row}"}]} trailing"#;
        let extracted = extract_json_object(text).unwrap();
        assert!(extracted.ends_with(r#"}]}"#));
        let value: serde_json::Value = serde_json::from_str(extracted).unwrap();
        assert_eq!(value["detail"][0]["note"], "missing } in ledger {row}");
    }

    #[test]
    fn test_extract_escaped_quote_inside_string() {
        let text = r#"{"note": "he said \"{\" twice"}"#;
        let extracted = extract_json_object(text).unwrap();
        assert_eq!(extracted, text);
    }

    #[test]
    fn test_extract_stops_at_first_complete_object() {
        let text = r#"{"a": 1} {"b": 2}"#;
        assert_eq!(extract_json_object(text), Some(r#"{"a": 1}"#));
    }

    #[test]
    fn test_extract_unterminated_object() {
        assert_eq!(extract_json_object(r#"{"a": {"b": 1}"#), None);
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[test]
    fn test_parse_reply_full_shape() {
        let reply = parse_reply(
            r#"{"summary": {"processed": 1, "matched": 1, "unmatched": 0},
               "detail": [{"name": "Ana", "amount": 1500.0,
                           "operation_date": "2025-02-01",
                           "tracking_key": "CR123", "reference_number": "777",
                           "folio_number": "9", "concept": "pago",
                           "status": "matched", "note": ""}]}"#,
        )
        .unwrap();
        assert_eq!(reply.detail.len(), 1);
        assert_eq!(reply.detail[0].tracking_key, "CR123");
    }

    #[test]
    fn test_parse_reply_lenient_amount_and_defaults() {
        let reply = parse_reply(
            r#"{"detail": [{"name": "Luis", "amount": "$1,200.50", "status": "unmatched"}]}"#,
        )
        .unwrap();
        let record = &reply.detail[0];
        assert_eq!(record.amount, 1200.5);
        assert_eq!(record.tracking_key, NOT_AVAILABLE);
        assert_eq!(record.concept, NOT_AVAILABLE);
        assert!(record.note.is_empty());
    }

    #[test]
    fn test_parse_reply_no_json() {
        let err = parse_reply("I could not reconcile these tables.").unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
        assert!(err.to_string().contains("No JSON found"));
    }

    #[test]
    fn test_parse_reply_truncates_long_raw() {
        let long = format!("garbage {} garbage", "x".repeat(500));
        let err = parse_reply(&long).unwrap_err();
        assert!(err.to_string().contains("..."));
    }
}
