//! Error types for CENYCA

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("File error: {0}")]
    File(String),

    #[error("Monthly reconciliation limit reached ({used}/{limit}). The counter resets at the start of the next month.")]
    QuotaExceeded { used: u32, limit: u32 },

    #[error("The reconciliation service took more than {waited_secs} seconds to respond. This is a slow response from the remote model, not a problem with the size of your files. Please try again.")]
    Timeout { waited_secs: u64 },

    #[error("Reconciliation service error{}: {message}", .status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    Remote {
        status: Option<u16>,
        message: String,
    },

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_blames_remote_not_input() {
        let msg = Error::Timeout { waited_secs: 90 }.to_string();
        assert!(msg.contains("90 seconds"));
        assert!(msg.contains("remote model"));
        assert!(msg.contains("not a problem with the size of your files"));
    }

    #[test]
    fn test_quota_message_includes_counts() {
        let msg = Error::QuotaExceeded { used: 5, limit: 5 }.to_string();
        assert!(msg.contains("5/5"));
        assert!(msg.contains("next month"));
    }

    #[test]
    fn test_remote_message_with_and_without_status() {
        let with = Error::Remote {
            status: Some(503),
            message: "overloaded".into(),
        };
        assert!(with.to_string().contains("HTTP 503"));

        let without = Error::Remote {
            status: None,
            message: "connection reset".into(),
        };
        assert!(!without.to_string().contains("HTTP"));
    }
}
