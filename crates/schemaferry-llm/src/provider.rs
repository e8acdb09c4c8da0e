//! LLM provider trait — the core abstraction
//!
//! All providers (OpenAI, Anthropic, Ollama) implement this trait.

use crate::error::LlmResult;
use crate::types::Completion;
use async_trait::async_trait;

/// Provider-agnostic completion interface
///
/// Implementations handle authentication, HTTP transport, request
/// serialization, response parsing, and error mapping for a specific
/// provider. Callers see exactly one operation: prompt in, text + cost out.
///
/// # Example
///
/// ```rust,no_run
/// use schemaferry_llm::CompletionProvider;
///
/// async fn suggest(provider: &dyn CompletionProvider, prompt: &str) -> String {
///     let completion = provider.complete(prompt).await.unwrap();
///     completion.text
/// }
/// ```
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider name (e.g. "openai", "anthropic", "ollama")
    fn name(&self) -> &str;

    /// Model this provider instance is bound to
    fn model(&self) -> &str;

    /// Perform a single-prompt completion
    async fn complete(&self, prompt: &str) -> LlmResult<Completion>;
}
