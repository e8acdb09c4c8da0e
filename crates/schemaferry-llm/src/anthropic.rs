//! Anthropic provider — completions via the Messages API

use crate::error::{LlmError, LlmResult};
use crate::provider::CompletionProvider;
use crate::types::{Completion, CostModel, TokenUsage};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const MAX_COMPLETION_TOKENS: u32 = 500;

/// Anthropic provider configuration
#[derive(Clone)]
pub struct AnthropicConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
    pub cost: CostModel,
}

/// Anthropic completion provider
pub struct AnthropicProvider {
    config: AnthropicConfig,
    client: reqwest::Client,
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Builder for `AnthropicProvider`
#[derive(Default)]
pub struct AnthropicProviderBuilder {
    api_key: Option<SecretString>,
    base_url: Option<String>,
    model: Option<String>,
    timeout: Option<Duration>,
    cost: Option<CostModel>,
}

impl AnthropicProviderBuilder {
    /// Set the API key (required)
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(key.into()));
        self
    }

    /// Override base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the model (required)
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set request timeout (default: 60s)
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the token cost model (default: free)
    pub fn cost(mut self, cost: CostModel) -> Self {
        self.cost = Some(cost);
        self
    }

    /// Build the provider
    pub fn build(self) -> LlmResult<AnthropicProvider> {
        let api_key = self
            .api_key
            .ok_or_else(|| LlmError::Config("api_key is required".to_string()))?;
        if api_key.expose_secret().is_empty() {
            return Err(LlmError::Config("api_key must not be empty".to_string()));
        }

        let model = self
            .model
            .ok_or_else(|| LlmError::Config("model is required".to_string()))?;

        let timeout = self.timeout.unwrap_or(Duration::from_secs(60));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(AnthropicProvider {
            config: AnthropicConfig {
                api_key,
                base_url: self
                    .base_url
                    .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                    .trim_end_matches('/')
                    .to_string(),
                model,
                timeout,
                cost: self.cost.unwrap_or_default(),
            },
            client,
        })
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: UsageBody,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize, Default)]
struct UsageBody {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

impl AnthropicProvider {
    /// Create a builder
    pub fn builder() -> AnthropicProviderBuilder {
        AnthropicProviderBuilder::default()
    }
}

#[async_trait]
impl CompletionProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, prompt: &str) -> LlmResult<Completion> {
        let url = format!("{}/v1/messages", self.config.base_url);
        let request = MessagesRequest {
            model: &self.config.model,
            max_tokens: MAX_COMPLETION_TOKENS,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.config.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => LlmError::Auth(body),
                429 => LlmError::RateLimited {
                    message: body,
                    retry_after_secs: None,
                },
                s => LlmError::Provider {
                    status: s,
                    message: body,
                },
            });
        }

        let body: MessagesResponse = response.json().await?;
        let block = body
            .content
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::EmptyCompletion("no content blocks".to_string()))?;

        let usage = TokenUsage::new(body.usage.input_tokens, body.usage.output_tokens);
        let cost = self.config.cost.cost_of(usage);

        debug!(
            model = %self.config.model,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            cost,
            "Anthropic completion"
        );

        Ok(Completion::new(block.text, usage, cost))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_requires_api_key() {
        let result = AnthropicProvider::builder().model("claude-3-5-haiku").build();
        assert!(matches!(result, Err(LlmError::Config(_))));
    }

    #[test]
    fn test_builder_requires_model() {
        let result = AnthropicProvider::builder().api_key("sk-ant").build();
        assert!(matches!(result, Err(LlmError::Config(_))));
    }

    #[test]
    fn test_debug_redacts_key() {
        let provider = AnthropicProvider::builder()
            .api_key("sk-ant-secret")
            .model("claude-3-5-haiku")
            .build()
            .unwrap();
        let debug = format!("{provider:?}");
        assert!(!debug.contains("sk-ant-secret"));
    }
}
