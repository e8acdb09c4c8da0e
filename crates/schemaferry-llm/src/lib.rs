//! # schemaferry-llm — LLM Provider Facade
//!
//! Unified async API over the LLM providers used for subject-name
//! suggestions during schema migration.
//!
//! Every provider reduces to a single contract: send a prompt, receive the
//! completion text plus the dollar cost of the call. The cost feeds the
//! migration tool's spending ceiling, so providers must report token usage
//! honestly (local providers report zero cost).
//!
//! ## Supported Providers
//!
//! | Provider | Endpoint style | Cost |
//! |:---------|:---------------|:-----|
//! | OpenAI (and any OpenAI-compatible endpoint via `base_url`) | `/chat/completions` | token-based |
//! | Anthropic | `/v1/messages` | token-based |
//! | Ollama | `/api/generate` | free |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use schemaferry_llm::{CompletionProvider, CostModel};
//! use schemaferry_llm::openai::OpenAiProvider;
//!
//! # async fn example() -> Result<(), schemaferry_llm::LlmError> {
//! let provider = OpenAiProvider::builder()
//!     .api_key("sk-...")
//!     .model("gpt-4o")
//!     .cost(CostModel::per_token(0.000005, 0.000015))
//!     .build()?;
//!
//! let completion = provider.complete("Suggest a subject name for ...").await?;
//! println!("{} (${:.4})", completion.text, completion.cost);
//! # Ok(())
//! # }
//! ```

pub mod anthropic;
pub mod error;
pub mod ollama;
pub mod openai;
pub mod provider;
pub mod types;

pub use error::{LlmError, LlmResult};
pub use provider::CompletionProvider;
pub use types::{Completion, CostModel, TokenUsage};
