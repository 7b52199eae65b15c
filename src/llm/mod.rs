pub mod ollama;

use async_trait::async_trait;

/// Capability seam isolating the one non-deterministic element of the
/// pipeline (spec §9 "LLM coupling"). SE/AR/TD/LD are built on top of this
/// single method; tests mock it, the scheduler and allotter never see it.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Sends `prompt` to the model in JSON mode and returns the parsed
    /// document. Implementations retry once on a transient network error;
    /// callers retry once more on a schema-violation (spec §5).
    async fn complete_json(&self, prompt: &str) -> Result<serde_json::Value, LlmError>;
}

#[derive(thiserror::Error, Debug, Clone)]
pub enum LlmError {
    #[error("LLM request timed out")]
    Timeout,
    #[error("LLM request failed: {0}")]
    Request(String),
    #[error("LLM output was not valid JSON: {0}")]
    ParseError(String),
}
