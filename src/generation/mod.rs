//! Causal language model access for answer generation.
//!
//! The pipeline only needs "prompt in, continuation out" with a bounded token budget, so the
//! seam is a single trait. The Ollama-backed client issues HTTP requests to the local runtime and
//! pins inference to the device resolved at startup.

use crate::config::Device;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

/// Errors surfaced while generating text.
#[derive(Debug, Error)]
pub enum GenerationClientError {
    /// Provider was unreachable.
    #[error("Generation provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate text: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Sampling settings for one bounded generation.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Model identifier understood by the provider.
    pub model: String,
    /// Full prompt text.
    pub prompt: String,
    /// Maximum number of generated tokens.
    pub max_new_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Nucleus sampling mass.
    pub top_p: f32,
}

/// Interface implemented by causal language model backends.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Generate a continuation of `request.prompt`. Returns only the generated text.
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationClientError>;
}

/// Generation client backed by a local Ollama runtime.
pub struct OllamaGenerationClient {
    http: Client,
    base_url: String,
    device: Device,
}

impl OllamaGenerationClient {
    /// Construct a client for the runtime at `base_url`, running on `device`.
    pub fn new(base_url: impl Into<String>, device: Device) -> Self {
        let http = Client::builder()
            .user_agent("pnl-qa/generate")
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.into(),
            device,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

#[async_trait]
impl GenerationClient for OllamaGenerationClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationClientError> {
        let mut options = json!({
            "num_predict": request.max_new_tokens,
            "temperature": request.temperature,
            "top_p": request.top_p,
        });
        if self.device.is_cpu() {
            options["num_gpu"] = json!(0);
        }
        let payload = json!({
            "model": request.model,
            "prompt": request.prompt,
            "raw": true,
            "stream": false,
            "options": options,
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                GenerationClientError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(GenerationClientError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationClientError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            GenerationClientError::InvalidResponse(format!(
                "failed to decode Ollama response: {error}"
            ))
        })?;

        if !body.done {
            return Err(GenerationClientError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.response)
    }
}
