//! OpenAI provider — chat completions via the OpenAI REST API
//!
//! Also serves any OpenAI-compatible endpoint (vLLM, LocalAI, LM Studio,
//! an Ollama instance running in OpenAI-compat mode) by configuring
//! `base_url`; compatible endpoints typically run with [`CostModel::free`].
//!
//! # Example
//!
//! ```rust,no_run
//! use schemaferry_llm::openai::OpenAiProvider;
//!
//! # async fn example() -> Result<(), schemaferry_llm::LlmError> {
//! let provider = OpenAiProvider::builder()
//!     .api_key("sk-...")
//!     .model("gpt-4o")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use crate::error::{LlmError, LlmResult};
use crate::provider::CompletionProvider;
use crate::types::{Completion, CostModel, TokenUsage};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Default OpenAI API base URL
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Completion budget per naming call; subject names are short
const MAX_COMPLETION_TOKENS: u32 = 500;

/// Low temperature keeps suggestions deterministic across runs
const TEMPERATURE: f32 = 0.3;

/// OpenAI provider configuration
#[derive(Clone)]
pub struct OpenAiConfig {
    /// API key (may be empty for unauthenticated compatible endpoints)
    pub api_key: SecretString,
    /// Base URL (default: `https://api.openai.com/v1`)
    pub base_url: String,
    /// Model to request
    pub model: String,
    /// Request timeout
    pub timeout: Duration,
    /// Token pricing for cost accounting
    pub cost: CostModel,
}

/// Builder for `OpenAiProvider`
#[derive(Default)]
pub struct OpenAiProviderBuilder {
    api_key: Option<SecretString>,
    base_url: Option<String>,
    model: Option<String>,
    timeout: Option<Duration>,
    cost: Option<CostModel>,
}

impl OpenAiProviderBuilder {
    /// Set the API key
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(key.into()));
        self
    }

    /// Override base URL (for OpenAI-compatible endpoints)
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
    pub fn build(self) -> LlmResult<OpenAiProvider> {
        let model = self
            .model
            .ok_or_else(|| LlmError::Config("model is required".to_string()))?;

        let base_url = self
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        if !base_url.starts_with("https://") && !base_url.starts_with("http://") {
            return Err(LlmError::Config(format!(
                "base_url must start with http:// or https://, got: {base_url}"
            )));
        }

        let api_key = self.api_key.unwrap_or_else(|| SecretString::from(""));
        if api_key.expose_secret().is_empty() && base_url == DEFAULT_BASE_URL {
            return Err(LlmError::Config(
                "api_key is required for api.openai.com".to_string(),
            ));
        }

        if base_url.starts_with("http://")
            && !base_url.contains("localhost")
            && !base_url.contains("127.0.0.1")
        {
            warn!("OpenAI base_url uses plain HTTP — API key will be sent in cleartext");
        }

        let timeout = self.timeout.unwrap_or(Duration::from_secs(60));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Config(format!("failed to build HTTP client: {e}")))?;

        let config = OpenAiConfig {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            timeout,
            cost: self.cost.unwrap_or_default(),
        };

        debug!(
            base_url = %config.base_url,
            model = %config.model,
            "OpenAI provider initialized"
        );

        Ok(OpenAiProvider { config, client })
    }
}

/// OpenAI completion provider
pub struct OpenAiProvider {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: UsageBody,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageBody,
}

#[derive(Deserialize)]
struct MessageBody {
    content: String,
}

#[derive(Deserialize, Default)]
struct UsageBody {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl OpenAiProvider {
    /// Create a builder
    pub fn builder() -> OpenAiProviderBuilder {
        OpenAiProviderBuilder::default()
    }

    fn parse_error(status: reqwest::StatusCode, body: &str) -> LlmError {
        match status.as_u16() {
            401 | 403 => LlmError::Auth(body.to_string()),
            429 => LlmError::RateLimited {
                message: body.to_string(),
                retry_after_secs: None,
            },
            s => LlmError::Provider {
                status: s,
                message: body.to_string(),
            },
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, prompt: &str) -> LlmResult<Completion> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: MAX_COMPLETION_TOKENS,
            temperature: TEMPERATURE,
        };

        let mut builder = self.client.post(&url).json(&request);
        if !self.config.api_key.expose_secret().is_empty() {
            builder = builder.bearer_auth(self.config.api_key.expose_secret());
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            let mut err = Self::parse_error(status, &body);
            if let LlmError::RateLimited {
                retry_after_secs, ..
            } = &mut err
            {
                *retry_after_secs = retry_after;
            }
            return Err(err);
        }

        let body: ChatResponse = response.json().await?;
        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::EmptyCompletion("no choices in response".to_string()))?;

        let usage = TokenUsage::new(body.usage.prompt_tokens, body.usage.completion_tokens);
        let cost = self.config.cost.cost_of(usage);

        debug!(
            model = %self.config.model,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            cost,
            "OpenAI completion"
        );

        Ok(Completion::new(choice.message.content, usage, cost))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_requires_model() {
        let result = OpenAiProvider::builder().api_key("sk-test").build();
        assert!(matches!(result, Err(LlmError::Config(_))));
    }

    #[test]
    fn test_builder_requires_key_for_openai() {
        let result = OpenAiProvider::builder().model("gpt-4o").build();
        assert!(matches!(result, Err(LlmError::Config(_))));
    }

    #[test]
    fn test_compatible_endpoint_without_key() {
        let provider = OpenAiProvider::builder()
            .model("llama3")
            .base_url("http://localhost:8000/v1")
            .build()
            .unwrap();
        assert_eq!(provider.model(), "llama3");
        assert_eq!(provider.name(), "openai");
    }

    #[test]
    fn test_builder_rejects_bad_url() {
        let result = OpenAiProvider::builder()
            .api_key("sk-test")
            .model("gpt-4o")
            .base_url("ftp://example.com")
            .build();
        assert!(matches!(result, Err(LlmError::Config(_))));
    }

    #[test]
    fn test_debug_redacts_key() {
        let provider = OpenAiProvider::builder()
            .api_key("sk-supersecret")
            .model("gpt-4o")
            .build()
            .unwrap();
        let debug = format!("{provider:?}");
        assert!(!debug.contains("supersecret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let provider = OpenAiProvider::builder()
            .api_key("sk-test")
            .model("gpt-4o")
            .base_url("https://example.com/v1/")
            .build()
            .unwrap();
        assert_eq!(provider.config.base_url, "https://example.com/v1");
    }
}
