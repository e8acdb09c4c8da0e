//! Core types shared by all LLM providers

use serde::{Deserialize, Serialize};

/// Token usage reported by a provider for a single call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt
    pub input_tokens: u64,
    /// Tokens produced in the completion
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Per-token dollar pricing for a provider/model pair
///
/// Local providers use [`CostModel::free`]; their completions cost nothing
/// regardless of token counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostModel {
    /// Dollars per input (prompt) token
    pub input_per_token: f64,
    /// Dollars per output (completion) token
    pub output_per_token: f64,
}

impl CostModel {
    /// Pricing expressed in dollars per single token
    pub fn per_token(input_per_token: f64, output_per_token: f64) -> Self {
        Self {
            input_per_token,
            output_per_token,
        }
    }

    /// A zero-cost model (local providers)
    pub fn free() -> Self {
        Self::default()
    }

    /// Dollar cost of a call with the given usage
    pub fn cost_of(&self, usage: TokenUsage) -> f64 {
        usage.input_tokens as f64 * self.input_per_token
            + usage.output_tokens as f64 * self.output_per_token
    }
}

/// Result of a completion call
#[derive(Debug, Clone)]
pub struct Completion {
    /// The completion text, as returned by the provider
    pub text: String,
    /// Dollar cost of this call (zero for local providers)
    pub cost: f64,
    /// Token usage, when the provider reports it
    pub usage: TokenUsage,
}

impl Completion {
    pub fn new(text: impl Into<String>, usage: TokenUsage, cost: f64) -> Self {
        Self {
            text: text.into(),
            cost,
            usage,
        }
    }
}
