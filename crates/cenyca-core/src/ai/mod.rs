//! Pluggable remote model backend abstraction
//!
//! # Architecture
//!
//! - `ModelBackend` trait: defines the interface for text generation
//! - `ModelClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `GeminiBackend`, `MockBackend`
//!
//! # Configuration
//!
//! Environment variables:
//! - `CENYCA_BACKEND`: Backend to use (gemini, mock). Default: gemini
//! - `GEMINI_API_KEY`: API key (required for the gemini backend)
//! - `CENYCA_MODEL`: Model name (default: gemini-2.0-flash)
//! - `CENYCA_TIMEOUT_SECS`: Overall wait bound for one call (default: 90)

mod gemini;
mod mock;
pub mod parsing;

pub use gemini::GeminiBackend;
pub use mock::MockBackend;

use async_trait::async_trait;

use crate::error::Result;
use crate::prompt::GenerationParams;

/// Trait defining the interface for remote model backends
///
/// Backends must be Send + Sync to allow use across async tasks.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Send a prompt and return the raw reply text
    async fn generate(&self, prompt: &str, params: GenerationParams) -> Result<String>;

    /// Check if the backend is reachable
    async fn health_check(&self) -> bool;

    /// Get the model name (for logging)
    fn model(&self) -> &str;

    /// Get the host URL (for logging)
    fn host(&self) -> &str;
}

/// Concrete model client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum ModelClient {
    /// Google Gemini generateContent API
    Gemini(GeminiBackend),
    /// Mock backend for testing
    Mock(MockBackend),
}

impl ModelClient {
    /// Create a model client from environment variables
    ///
    /// Checks `CENYCA_BACKEND` to determine which backend to use:
    /// - `gemini` (default): Uses GEMINI_API_KEY, CENYCA_MODEL, CENYCA_TIMEOUT_SECS
    /// - `mock`: Creates a mock backend for testing
    ///
    /// Returns None if the required environment variables are not set.
    pub fn from_env() -> Option<Self> {
        let backend = std::env::var("CENYCA_BACKEND").unwrap_or_else(|_| "gemini".to_string());

        match backend.to_lowercase().as_str() {
            "gemini" => GeminiBackend::from_env().map(ModelClient::Gemini),
            "mock" => Some(ModelClient::Mock(MockBackend::new())),
            _ => {
                tracing::warn!(backend = %backend, "Unknown CENYCA_BACKEND, falling back to gemini");
                GeminiBackend::from_env().map(ModelClient::Gemini)
            }
        }
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        ModelClient::Mock(MockBackend::new())
    }
}

#[async_trait]
impl ModelBackend for ModelClient {
    async fn generate(&self, prompt: &str, params: GenerationParams) -> Result<String> {
        match self {
            ModelClient::Gemini(b) => b.generate(prompt, params).await,
            ModelClient::Mock(b) => b.generate(prompt, params).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            ModelClient::Gemini(b) => b.health_check().await,
            ModelClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            ModelClient::Gemini(b) => b.model(),
            ModelClient::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            ModelClient::Gemini(b) => b.host(),
            ModelClient::Mock(b) => b.host(),
        }
    }
}
