//! Ollama provider — completions via a local Ollama instance
//!
//! Ollama runs models locally, so completions cost nothing and no API key is
//! involved. The generation endpoint is `/api/generate` with streaming
//! disabled.

use crate::error::{LlmError, LlmResult};
use crate::provider::CompletionProvider;
use crate::types::{Completion, TokenUsage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Ollama completion provider
#[derive(Debug)]
pub struct OllamaProvider {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    /// Create a provider for the given model
    ///
    /// `base_url` defaults to `http://localhost:11434` when empty. Local
    /// models can be slow to answer; the timeout is 120s.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> LlmResult<Self> {
        let model = model.into();
        if model.is_empty() {
            return Err(LlmError::Config("model is required".to_string()));
        }

        let base_url = {
            let url = base_url.into();
            if url.is_empty() {
                DEFAULT_BASE_URL.to_string()
            } else {
                url.trim_end_matches('/').to_string()
            }
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| LlmError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            model,
            client,
        })
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    prompt_eval_count: u64,
    #[serde(default)]
    eval_count: u64,
}

#[async_trait]
impl CompletionProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> LlmResult<Completion> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Provider {
                status: status.as_u16(),
                message: body,
            });
        }

        let body: GenerateResponse = response.json().await?;
        let usage = TokenUsage::new(body.prompt_eval_count, body.eval_count);

        // Local inference is free
        Ok(Completion::new(body.response, usage, 0.0))
    }
}
