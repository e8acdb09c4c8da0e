//! LLM-backed subject naming
//!
//! The namer sits behind the mapper's `llm` strategy. A suggestion request
//! checks the persistent cache first, then the spending ceiling, then takes
//! a token from the LLM rate bucket before calling the provider. Responses
//! are cleaned defensively (backtick fences, whitespace) and cached; the
//! cache file is persisted every few calls and on shutdown.

pub mod cache;
pub mod preprocess;

pub use cache::{NameSuggestion, SuggestionCache};
pub use preprocess::{extract_context, SchemaContext};

use crate::config::{LlmConfig, LlmProviderKind};
use crate::error::{MigrateError, MigrateResult};
use crate::models::{ParsedSchema, SchemaRole, SourceSchema};
use crate::worker::RateLimiters;
use parking_lot::Mutex;
use schemaferry_llm::anthropic::AnthropicProvider;
use schemaferry_llm::ollama::OllamaProvider;
use schemaferry_llm::openai::OpenAiProvider;
use schemaferry_llm::{CompletionProvider, CostModel};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Persist the cache after this many fresh LLM calls
const CACHE_SAVE_INTERVAL: usize = 10;

#[derive(Default)]
struct NamerStats {
    calls: usize,
    total_cost: f64,
}

/// LLM-backed name suggester with caching and a cost ceiling
pub struct Namer {
    provider: Arc<dyn CompletionProvider>,
    cache: SuggestionCache,
    cache_path: Option<PathBuf>,
    max_cost: f64,
    stats: Mutex<NamerStats>,
    limiters: Arc<RateLimiters>,
}

impl Namer {
    pub fn new(config: &LlmConfig, limiters: Arc<RateLimiters>) -> MigrateResult<Self> {
        let provider = build_provider(config)?;

        let (cache, cache_path) = if config.cache_file.is_empty() {
            (SuggestionCache::empty(), None)
        } else {
            match SuggestionCache::load(&config.cache_file) {
                Ok(cache) => (cache, Some(PathBuf::from(&config.cache_file))),
                Err(e) => {
                    warn!(error = %e, "failed to load LLM cache, continuing without");
                    (SuggestionCache::empty(), Some(PathBuf::from(&config.cache_file)))
                }
            }
        };

        Ok(Self {
            provider,
            cache,
            cache_path,
            max_cost: config.max_cost,
            stats: Mutex::new(NamerStats::default()),
            limiters,
        })
    }

    /// Suggest a subject name for a schema
    ///
    /// Returns `CostLimit` once the spending ceiling is reached; the mapper
    /// falls back to the topic strategy for the remaining schemas.
    pub async fn suggest(
        &self,
        schema: &SourceSchema,
        parsed: &ParsedSchema,
        role: SchemaRole,
        cancel: &CancellationToken,
    ) -> MigrateResult<NameSuggestion> {
        let cache_key = schema.key();
        if let Some(hit) = self.cache.get(&cache_key) {
            debug!(schema = %cache_key, "LLM cache hit");
            return Ok(hit);
        }

        if self.max_cost > 0.0 && self.stats.lock().total_cost >= self.max_cost {
            return Err(MigrateError::CostLimit(self.max_cost));
        }

        let context = extract_context(schema, parsed);
        let prompt = build_prompt(&context, role);

        self.limiters.llm.acquire(cancel).await?;
        let completion = self.provider.complete(&prompt).await?;

        let save_due = {
            let mut stats = self.stats.lock();
            stats.calls += 1;
            stats.total_cost += completion.cost;
            stats.calls % CACHE_SAVE_INTERVAL == 0
        };

        let suggested = clean_response(&completion.text);
        if suggested.is_empty() {
            return Err(MigrateError::Llm(
                schemaferry_llm::LlmError::EmptyCompletion("blank suggestion".to_string()),
            ));
        }

        let suggestion = NameSuggestion {
            original_name: schema.name.clone(),
            suggested_name: suggested,
            reasoning: "LLM suggestion".to_string(),
        };
        self.cache
            .insert(cache_key, suggestion.clone(), self.provider.model());

        if save_due {
            self.persist();
        }

        Ok(suggestion)
    }

    /// Number of fresh LLM calls made (cache hits excluded)
    pub fn call_count(&self) -> usize {
        self.stats.lock().calls
    }

    /// Accumulated dollar cost
    pub fn total_cost(&self) -> f64 {
        self.stats.lock().total_cost
    }

    /// Flush the cache to disk, if a cache file is configured
    pub fn persist(&self) {
        if let Some(path) = &self.cache_path {
            if let Err(e) = self.cache.save(path) {
                warn!(error = %e, path = %path.display(), "failed to save LLM cache");
            }
        }
    }
}

/// Construct the provider named by the configuration
fn build_provider(config: &LlmConfig) -> MigrateResult<Arc<dyn CompletionProvider>> {
    let cost = CostModel::per_token(config.input_token_cost, config.output_token_cost);
    let provider: Arc<dyn CompletionProvider> = match config.provider {
        LlmProviderKind::Openai => {
            let mut builder = OpenAiProvider::builder()
                .api_key(config.api_key.clone())
                .model(config.model.clone())
                .cost(cost);
            if !config.base_url.is_empty() {
                builder = builder.base_url(config.base_url.clone());
            }
            Arc::new(builder.build()?)
        }
        LlmProviderKind::Anthropic => Arc::new(
            AnthropicProvider::builder()
                .api_key(config.api_key.clone())
                .model(config.model.clone())
                .cost(cost)
                .build()?,
        ),
        LlmProviderKind::Ollama => {
            Arc::new(OllamaProvider::new(config.base_url.clone(), config.model.clone())?)
        }
        LlmProviderKind::Local => {
            // Any OpenAI-compatible endpoint; key optional
            let mut builder = OpenAiProvider::builder()
                .model(config.model.clone())
                .base_url(config.base_url.clone())
                .cost(CostModel::free());
            if !config.api_key.is_empty() {
                builder = builder.api_key(config.api_key.clone());
            }
            Arc::new(builder.build()?)
        }
    };
    Ok(provider)
}

fn build_prompt(context: &SchemaContext, role: SchemaRole) -> String {
    format!(
        "You are a Confluent Cloud Schema Registry naming expert.\n\
         \n\
         Given information about a source schema, suggest an appropriate Confluent Cloud subject name.\n\
         \n\
         ## Confluent Subject Naming Conventions\n\
         - Use lowercase with hyphens (kebab-case): \"payment-transactions\"\n\
         - Append \"-value\" for value schemas, \"-key\" for key schemas\n\
         - Be descriptive but concise\n\
         - Avoid environment prefixes (prod, dev, staging)\n\
         - Avoid version suffixes (v1, v2)\n\
         - Avoid AWS-specific prefixes (MSK_, Glue_, etc.)\n\
         \n\
         ## Schema Information\n\
         Schema Name: {name}\n\
         Registry: {registry}\n\
         Schema Type: {schema_type}\n\
         Record Name: {record_name}\n\
         Namespace: {namespace}\n\
         Documentation: {documentation}\n\
         Key Fields: {fields:?}\n\
         Field Count: {field_count}\n\
         Detected Role: {role}\n\
         \n\
         ## Instructions\n\
         1. Analyze the schema name, record name, namespace, and field names\n\
         2. The schema has been detected as a {role} schema\n\
         3. Suggest a clean, descriptive subject name following Confluent conventions\n\
         4. Include the appropriate suffix ({suffix})\n\
         \n\
         Respond with ONLY the suggested subject name, nothing else.\n\
         Example response: payment-transactions-value",
        name = context.schema_name,
        registry = context.registry,
        schema_type = context.schema_type,
        record_name = context.record_name,
        namespace = context.namespace,
        documentation = context.documentation,
        fields = context.key_fields,
        field_count = context.field_count,
        role = role,
        suffix = role.suffix(),
    )
}

/// Strip markdown fences and surrounding whitespace from a model response
fn clean_response(response: &str) -> String {
    let mut s = response.trim();
    loop {
        let before = s;
        s = s.strip_prefix("```").unwrap_or(s);
        s = s.strip_suffix("```").unwrap_or(s);
        s = s.strip_prefix('`').unwrap_or(s);
        s = s.strip_suffix('`').unwrap_or(s);
        s = s.trim();
        if s == before {
            break;
        }
    }
    s.to_string()
}
