//! Gemini backend implementation
//!
//! HTTP client for the Google generateContent API. One call per
//! reconciliation attempt, bounded by a single overall timeout, no retry:
//! a failed call must not burn a second quota slot behind the user's back.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::prompt::GenerationParams;

use super::ModelBackend;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Default overall wait bound for one generateContent call (seconds).
pub const DEFAULT_TIMEOUT_SECS: u64 = 90;

/// Gemini backend
#[derive(Clone)]
pub struct GeminiBackend {
    http_client: Client,
    base_url: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

impl GeminiBackend {
    /// Create a new Gemini backend
    pub fn new(base_url: &str, model: &str, api_key: &str, timeout_secs: u64) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Create from environment variables
    ///
    /// Requires `GEMINI_API_KEY`; `CENYCA_MODEL` and `CENYCA_TIMEOUT_SECS`
    /// are optional overrides.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("GEMINI_API_KEY").ok()?;
        let model = std::env::var("CENYCA_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let timeout_secs = std::env::var("CENYCA_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Some(Self::new(DEFAULT_BASE_URL, &model, &api_key, timeout_secs))
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        )
    }

    async fn send_request(&self, prompt: &str, params: GenerationParams) -> Result<String> {
        let request_body = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: params.temperature,
                max_output_tokens: params.max_output_tokens,
            },
        };

        let url = self.generate_url();
        debug!(
            model = %self.model,
            prompt_len = prompt.len(),
            "Sending generateContent request"
        );

        let response = self.http_client.post(&url).json(&request_body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "Gemini API returned an error");
            return Err(Error::Remote {
                status: Some(status.as_u16()),
                message: extract_api_error(&body).unwrap_or(body),
            });
        }

        let reply: GeminiResponse = response.json().await?;

        let text = reply
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| Error::Remote {
                status: None,
                message: "Empty reply: no candidates in response".to_string(),
            })?;

        debug!(reply_len = text.len(), "Received generateContent reply");
        Ok(text)
    }
}

/// Pull the human-readable message out of a Gemini error payload.
fn extract_api_error(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value["error"]["message"].as_str().map(|s| s.to_string())
}

#[async_trait]
impl ModelBackend for GeminiBackend {
    async fn generate(&self, prompt: &str, params: GenerationParams) -> Result<String> {
        // One overall bound covering connect, send, and read. A slow model
        // reply surfaces as Error::Timeout, never as a hung request.
        match tokio::time::timeout(self.timeout, self.send_request(prompt, params)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                waited_secs: self.timeout.as_secs(),
            }),
        }
    }

    async fn health_check(&self) -> bool {
        // A lightweight GET against the model listing; any 2xx means the
        // host is reachable and the key is accepted.
        let url = format!("{}?key={}", self.base_url, self.api_key);
        match self
            .http_client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}

/// Request to the generateContent API
#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

/// Response from the generateContent API
#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiResponseContent,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let backend = GeminiBackend::new("http://localhost:9999/", "m", "k", 90);
        assert_eq!(backend.host(), "http://localhost:9999");
        assert_eq!(backend.generate_url(), "http://localhost:9999/m:generateContent?key=k");
    }

    #[test]
    fn test_extract_api_error_message() {
        let body = r#"{"error": {"code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(
            extract_api_error(body).as_deref(),
            Some("Resource has been exhausted")
        );
        assert_eq!(extract_api_error("not json"), None);
    }

    #[test]
    fn test_request_body_wire_names() {
        let body = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: "hola".into() }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: 0.05,
                max_output_tokens: 8192,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hola");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 8192);
    }
}
