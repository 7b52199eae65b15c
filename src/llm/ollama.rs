//! JSON-mode HTTP client for an Ollama-compatible chat endpoint.
//!
//! Built the way the teacher's `nlp::ollama_client::OllamaClient` is built:
//! a bare `reqwest::Client`, a request/response pair derived with `serde`,
//! and a bounded `tokio::time::timeout` around the call. The teacher's
//! `println!`/`eprintln!` diagnostics are replaced with `tracing` events.

use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use super::{LlmClient, LlmError};

const DEFAULT_TIMEOUT_MS: u64 = 60_000;

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'a str,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    timeout_ms: u64,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for OllamaClient {
    async fn complete_json(&self, prompt: &str) -> Result<serde_json::Value, LlmError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: "json",
            options: GenerateOptions { temperature: 0.2 },
        };

        tracing::debug!(model = %self.model, "sending LLM prompt");

        let response = timeout(
            std::time::Duration::from_millis(self.timeout_ms),
            self.http
                .post(format!("{}/api/generate", self.base_url))
                .json(&request)
                .send(),
        )
        .await
        .map_err(|_| LlmError::Timeout)?
        .map_err(|e| LlmError::Request(e.to_string()))?;

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        serde_json::from_str(&body.response).map_err(|e| {
            tracing::warn!(error = %e, "LLM response was not valid JSON");
            LlmError::ParseError(e.to_string())
        })
    }
}
