//! Mock backend for testing
//!
//! Returns a canned reply for every prompt. Useful for unit tests and
//! development without an API key.

use async_trait::async_trait;

use crate::error::Result;
use crate::prompt::GenerationParams;

use super::ModelBackend;

/// Default canned reply: one matched record in the policy shape.
const DEFAULT_REPLY: &str = r#"{"summary": {"processed": 1, "matched": 1, "unmatched": 0},
"detail": [{"name": "Ana", "amount": 1500.0, "operation_date": "2025-02-01",
"tracking_key": "MOCK0001", "reference_number": "1", "folio_number": "1",
"concept": "pago", "status": "matched", "note": ""}]}"#;

/// Mock model backend for testing
#[derive(Clone)]
pub struct MockBackend {
    /// Whether health_check should return true
    pub healthy: bool,
    reply: String,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Create a new mock backend (healthy by default)
    pub fn new() -> Self {
        Self {
            healthy: true,
            reply: DEFAULT_REPLY.to_string(),
        }
    }

    /// Create an unhealthy mock backend
    pub fn unhealthy() -> Self {
        Self {
            healthy: false,
            reply: DEFAULT_REPLY.to_string(),
        }
    }

    /// Create a mock that replies with the given text
    pub fn with_reply(reply: &str) -> Self {
        Self {
            healthy: true,
            reply: reply.to_string(),
        }
    }
}

#[async_trait]
impl ModelBackend for MockBackend {
    async fn generate(&self, _prompt: &str, _params: GenerationParams) -> Result<String> {
        Ok(self.reply.clone())
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}
