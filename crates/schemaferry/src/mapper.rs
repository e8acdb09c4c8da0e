//! Naming mapper — derives a target subject for every source schema
//!
//! Resolution order per schema:
//!
//! 1. custom mapping file (qualified `registry:schema` beats bare name);
//!    the override subject is used verbatim, no normalization
//! 2. role detection (unless the override pinned a role)
//! 3. context derivation (flat / registry / custom lookup)
//! 4. strategy dispatch: `topic`, `record`, `llm` (with topic fallback), or
//!    a user template rendered over `{registry}`, `{name}`, `{role}`, ...

use crate::config::{Config, ContextStrategy, ExtendedMapping, NameMappingFile, SubjectStrategy};
use crate::error::{MigrateError, MigrateResult};
use crate::keyvalue::Detector;
use crate::models::{
    MappingStatus, ParsedSchema, SchemaMapping, SchemaRole, SourceSchema,
};
use crate::namer::Namer;
use crate::normalizer::{self, Normalizer};
use crate::parser;
use futures::stream::{self, StreamExt, TryStreamExt};
use regex::Regex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::sync::LazyLock;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Template variables look like `{name}` or `{record_name}`
static TEMPLATE_VAR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").expect("template var pattern"));

/// A custom mapping resolved from the mapping file
#[derive(Debug, Clone)]
struct ResolvedMapping {
    subject: String,
    /// Pinned role; `None` means auto-detect
    role: Option<SchemaRole>,
    /// Pinned context; `None` means derive from the registry
    context: Option<String>,
}

#[derive(Debug, Default)]
struct CustomMappings {
    /// Keyed by `registry:schema`
    qualified: HashMap<String, ResolvedMapping>,
    /// Keyed by bare schema name
    simple: HashMap<String, ResolvedMapping>,
}

impl CustomMappings {
    fn lookup(&self, registry: &str, schema_name: &str) -> Option<&ResolvedMapping> {
        self.qualified
            .get(&format!("{registry}:{schema_name}"))
            .or_else(|| self.simple.get(schema_name))
    }
}

/// Derives `(context, subject, role)` for every schema
pub struct NameMapper {
    config: Arc<Config>,
    normalizer: Normalizer,
    detector: Detector,
    namer: Option<Arc<Namer>>,
    custom_mappings: Option<CustomMappings>,
    /// registry name → context name, for the `custom` context strategy
    context_mappings: Option<HashMap<String, String>>,
    /// Set after the first cost-limit hit so the fallback warning fires once
    llm_exhausted: AtomicBool,
}

impl NameMapper {
    pub fn new(
        config: Arc<Config>,
        normalizer: Normalizer,
        detector: Detector,
        namer: Option<Arc<Namer>>,
    ) -> MigrateResult<Self> {
        let custom_mappings = if config.naming.name_mapping_file.is_empty() {
            None
        } else {
            Some(load_custom_mappings(&config.naming.name_mapping_file)?)
        };

        let context_mappings = if config.naming.context_mapping == ContextStrategy::Custom
            && !config.naming.context_mapping_file.is_empty()
        {
            Some(load_context_mappings(&config.naming.context_mapping_file)?)
        } else {
            None
        };

        Ok(Self {
            config,
            normalizer,
            detector,
            namer,
            custom_mappings,
            context_mappings,
            llm_exhausted: AtomicBool::new(false),
        })
    }

    /// Map all schemas concurrently, preserving input order
    pub async fn map_all(
        &self,
        schemas: &[SourceSchema],
        cancel: &CancellationToken,
    ) -> MigrateResult<Vec<SchemaMapping>> {
        let workers = self.config.concurrency.workers.max(1);
        stream::iter(schemas.iter())
            .map(|schema| async move {
                if cancel.is_cancelled() {
                    return Err(MigrateError::Cancelled);
                }
                Ok(self.map_schema(schema, cancel).await)
            })
            .buffered(workers)
            .try_collect()
            .await
    }

    /// Map a single schema; naming failures land in the mapping's status
    /// rather than failing the run
    pub async fn map_schema(
        &self,
        schema: &SourceSchema,
        cancel: &CancellationToken,
    ) -> SchemaMapping {
        let mut mapping = SchemaMapping::skeleton(
            &schema.registry_name,
            &schema.name,
            schema.versions.len(),
            Vec::new(),
            0,
        );

        // Custom mapping wins outright: subject verbatim, no normalization
        if let Some(custom) = self
            .custom_mappings
            .as_ref()
            .and_then(|m| m.lookup(&schema.registry_name, &schema.name))
        {
            mapping.target_subject = custom.subject.clone();
            mapping.naming_strategy = "custom-mapping".to_string();
            mapping.naming_reason = "custom name mapping file".to_string();
            mapping.transformations =
                vec![format!("custom-mapping: {} -> {}", schema.name, custom.subject)];

            mapping.detected_role = match custom.role {
                Some(role) => role,
                None => {
                    let parsed = parser::parse(schema);
                    self.detector
                        .detect(&schema.registry_name, &schema.name, Some(&parsed))
                        .role
                }
            };
            mapping.target_context = match &custom.context {
                Some(context) => context.clone(),
                None => self.derive_context(&schema.registry_name),
            };
            return mapping;
        }

        let parsed = parser::parse(schema);

        let detection = self
            .detector
            .detect(&schema.registry_name, &schema.name, Some(&parsed));
        mapping.detected_role = detection.role;
        mapping.naming_reason = detection.reason;

        mapping.target_context = self.derive_context(&schema.registry_name);

        match self
            .derive_subject(schema, &parsed, detection.role, cancel)
            .await
        {
            Ok((subject, strategy, transformations)) => {
                mapping.target_subject = subject;
                mapping.naming_strategy = strategy;
                mapping.transformations = transformations;
            }
            Err(e) => {
                mapping.status = MappingStatus::Error;
                mapping.error = e.to_string();
            }
        }

        mapping
    }

    fn derive_context(&self, registry: &str) -> String {
        match self.config.naming.context_mapping {
            ContextStrategy::Flat => String::new(),
            ContextStrategy::Registry => format!(".{registry}"),
            ContextStrategy::Custom => match self
                .context_mappings
                .as_ref()
                .and_then(|m| m.get(registry))
            {
                Some(context) => format!(".{context}"),
                None => format!(".{registry}"),
            },
        }
    }

    async fn derive_subject(
        &self,
        schema: &SourceSchema,
        parsed: &ParsedSchema,
        role: SchemaRole,
        cancel: &CancellationToken,
    ) -> MigrateResult<(String, String, Vec<String>)> {
        match self.config.naming.subject_strategy {
            SubjectStrategy::Topic => {
                let (subject, transformations) = self.topic_subject(schema, role);
                Ok((subject, "topic".to_string(), transformations))
            }

            SubjectStrategy::Record => {
                let (subject, transformations) = self.record_subject(schema, parsed, role);
                Ok((subject, "record".to_string(), transformations))
            }

            SubjectStrategy::Llm => match self.llm_subject(schema, parsed, role, cancel).await {
                Ok((subject, transformations)) => {
                    Ok((subject, "llm".to_string(), transformations))
                }
                Err(e) => {
                    if matches!(e, MigrateError::CostLimit(_))
                        && !self.llm_exhausted.swap(true, Ordering::SeqCst)
                    {
                        warn!(
                            "LLM cost limit reached, remaining schemas fall back to the topic strategy"
                        );
                    }
                    let (subject, transformations) = self.topic_subject(schema, role);
                    Ok((subject, "topic (fallback)".to_string(), transformations))
                }
            },

            SubjectStrategy::Custom => {
                let (subject, transformations) = self.template_subject(schema, parsed, role)?;
                Ok((subject, "custom".to_string(), transformations))
            }
        }
    }

    /// `topic`: normalized schema name, role suffixes stripped then re-added
    fn topic_subject(&self, schema: &SourceSchema, role: SchemaRole) -> (String, Vec<String>) {
        let (normalized, transformations) = self.normalizer.normalize(&schema.name);
        let stripped = normalizer::strip_key_suffix(normalizer::strip_value_suffix(&normalized));
        (format!("{stripped}{}", role.suffix()), transformations)
    }

    /// `record`: namespace-qualified record name, falling back to the
    /// schema name when the definition carried none
    fn record_subject(
        &self,
        schema: &SourceSchema,
        parsed: &ParsedSchema,
        role: SchemaRole,
    ) -> (String, Vec<String>) {
        let base = if parsed.record_name.is_empty() {
            schema.name.clone()
        } else if parsed.namespace.is_empty() {
            parsed.record_name.clone()
        } else {
            format!("{}.{}", parsed.namespace, parsed.record_name)
        };

        let (normalized, transformations) = self.normalizer.normalize(&base);
        (format!("{normalized}{}", role.suffix()), transformations)
    }

    async fn llm_subject(
        &self,
        schema: &SourceSchema,
        parsed: &ParsedSchema,
        role: SchemaRole,
        cancel: &CancellationToken,
    ) -> MigrateResult<(String, Vec<String>)> {
        let namer = self
            .namer
            .as_ref()
            .ok_or_else(|| MigrateError::Config("LLM namer not configured".to_string()))?;

        if self.llm_exhausted.load(Ordering::SeqCst) {
            return Err(MigrateError::CostLimit(0.0));
        }

        let suggestion = namer.suggest(schema, parsed, role, cancel).await?;

        let mut transformations = Vec::new();
        if suggestion.original_name != suggestion.suggested_name {
            transformations.push(format!(
                "llm: {} → {}",
                suggestion.original_name, suggestion.suggested_name
            ));
        }
        Ok((suggestion.suggested_name, transformations))
    }

    /// `custom`: render the user template, then normalize the result
    fn template_subject(
        &self,
        schema: &SourceSchema,
        parsed: &ParsedSchema,
        role: SchemaRole,
    ) -> MigrateResult<(String, Vec<String>)> {
        let template = &self.config.naming.subject_template;
        if template.is_empty() {
            return Err(MigrateError::Config(
                "custom subject template not configured".to_string(),
            ));
        }

        let rendered = TEMPLATE_VAR_REGEX
            .replace_all(template, |caps: &regex::Captures<'_>| {
                match &caps[1] {
                    "registry" => schema.registry_name.clone(),
                    "name" | "schema_name" => schema.name.clone(),
                    "role" => role.to_string(),
                    "suffix" => role.suffix().to_string(),
                    "record_name" => parsed.record_name.clone(),
                    "namespace" => parsed.namespace.clone(),
                    // Unknown variables render as empty
                    _ => String::new(),
                }
            })
            .into_owned();

        let (normalized, transformations) = self.normalizer.normalize(&rendered);
        Ok((normalized, transformations))
    }
}

fn load_custom_mappings(path: &str) -> MigrateResult<CustomMappings> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| MigrateError::Config(format!("cannot read name mapping file {path}: {e}")))?;
    let file: NameMappingFile = serde_yaml::from_str(&data)
        .map_err(|e| MigrateError::Config(format!("invalid name mapping file {path}: {e}")))?;

    let mut mappings = CustomMappings::default();

    for (source, subject) in file.mappings {
        mappings.simple.insert(
            source,
            ResolvedMapping {
                subject,
                role: None,
                context: None,
            },
        );
    }
    for (source, subject) in file.qualified_mappings {
        mappings.qualified.insert(
            source,
            ResolvedMapping {
                subject,
                role: None,
                context: None,
            },
        );
    }
    for ext in file.extended_mappings {
        let resolved = resolve_extended(&ext)?;
        if ext.source.contains(':') {
            mappings.qualified.insert(ext.source, resolved);
        } else {
            mappings.simple.insert(ext.source, resolved);
        }
    }

    Ok(mappings)
}

fn resolve_extended(ext: &ExtendedMapping) -> MigrateResult<ResolvedMapping> {
    let role = match ext.role.as_str() {
        "" => None,
        "key" => Some(SchemaRole::Key),
        "value" => Some(SchemaRole::Value),
        other => {
            return Err(MigrateError::Config(format!(
                "invalid role {other:?} for mapping {:?}",
                ext.source
            )))
        }
    };
    Ok(ResolvedMapping {
        subject: ext.subject.clone(),
        role,
        context: if ext.context.is_empty() {
            None
        } else {
            Some(ext.context.clone())
        },
    })
}

fn load_context_mappings(path: &str) -> MigrateResult<HashMap<String, String>> {
    let data = std::fs::read_to_string(path).map_err(|e| {
        MigrateError::Config(format!("cannot read context mapping file {path}: {e}"))
    })?;
    serde_yaml::from_str(&data)
        .map_err(|e| MigrateError::Config(format!("invalid context mapping file {path}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CaseMode, DotMode};
    use crate::models::{SchemaType, SchemaVersion};
    use std::io::Write;

    fn schema(registry: &str, name: &str, definition: &str) -> SourceSchema {
        SourceSchema {
            name: name.into(),
            registry_name: registry.into(),
            arn: String::new(),
            description: String::new(),
            data_format: SchemaType::Avro,
            compatibility: String::new(),
            tags: Default::default(),
            latest_version: 1,
            versions: vec![SchemaVersion {
                version_number: 1,
                version_id: "v".into(),
                definition: definition.into(),
                status: String::new(),
                created_time: None,
            }],
        }
    }

    fn plain_schema(name: &str) -> SourceSchema {
        schema(
            "reg",
            name,
            r#"{"type":"record","name":"Rec","fields":[{"name":"id","type":"long"}]}"#,
        )
    }

    fn mapper_with(config: Config) -> NameMapper {
        let config = Arc::new(config);
        let normalizer = Normalizer::new(config.normalization.clone());
        let detector = Detector::new(&config.key_value).unwrap();
        NameMapper::new(config, normalizer, detector, None).unwrap()
    }

    fn default_mapper() -> NameMapper {
        let mut config = Config::default();
        config.aws.registry_names = vec!["reg".into()];
        config.output.dry_run = true;
        mapper_with(config)
    }

    #[tokio::test]
    async fn test_topic_strategy() {
        let mapper = default_mapper();
        let cancel = CancellationToken::new();

        let mapping = mapper
            .map_schema(&plain_schema("UserEvent"), &cancel)
            .await;
        assert_eq!(mapping.target_subject, "user-event-value");
        assert_eq!(mapping.naming_strategy, "topic");
        assert_eq!(mapping.target_context, "");
        assert_eq!(mapping.status, MappingStatus::Ready);
    }

    #[tokio::test]
    async fn test_topic_strategy_strips_existing_suffix() {
        let mapper = default_mapper();
        let cancel = CancellationToken::new();

        // normalized to "user-event-key", stripped, role suffix re-added
        let mapping = mapper
            .map_schema(&plain_schema("user-event-key"), &cancel)
            .await;
        assert_eq!(mapping.detected_role, SchemaRole::Key);
        assert_eq!(mapping.target_subject, "user-event-key");

        let mapping = mapper
            .map_schema(&plain_schema("user-event-value"), &cancel)
            .await;
        assert_eq!(mapping.detected_role, SchemaRole::Value);
        assert_eq!(mapping.target_subject, "user-event-value");
    }

    #[tokio::test]
    async fn test_record_strategy_uses_namespace() {
        let mut config = Config::default();
        config.aws.registry_names = vec!["reg".into()];
        config.output.dry_run = true;
        config.naming.subject_strategy = SubjectStrategy::Record;
        let mapper = mapper_with(config);
        let cancel = CancellationToken::new();

        let mapping = mapper
            .map_schema(
                &schema(
                    "reg",
                    "whatever",
                    r#"{"type":"record","name":"OrderCreated","namespace":"com.shop","fields":[]}"#,
                ),
                &cancel,
            )
            .await;
        // "com.shop.OrderCreated" → dots replaced → kebab
        assert_eq!(mapping.target_subject, "com-shop-order-created-value");
        assert_eq!(mapping.naming_strategy, "record");
    }

    #[tokio::test]
    async fn test_record_strategy_falls_back_to_schema_name() {
        let mut config = Config::default();
        config.aws.registry_names = vec!["reg".into()];
        config.output.dry_run = true;
        config.naming.subject_strategy = SubjectStrategy::Record;
        let mapper = mapper_with(config);
        let cancel = CancellationToken::new();

        // unparseable definition: no record name
        let mapping = mapper
            .map_schema(&schema("reg", "RawEvents", "{bad json"), &cancel)
            .await;
        assert_eq!(mapping.target_subject, "raw-events-value");
    }

    #[tokio::test]
    async fn test_custom_mapping_bypasses_normalization() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "mappings:\n  UserCreatedEvent: user-created-value\n").unwrap();

        let mut config = Config::default();
        config.aws.registry_names = vec!["reg".into()];
        config.output.dry_run = true;
        config.naming.name_mapping_file = f.path().to_string_lossy().into_owned();
        let mapper = mapper_with(config);
        let cancel = CancellationToken::new();

        let mapping = mapper
            .map_schema(&plain_schema("UserCreatedEvent"), &cancel)
            .await;
        assert_eq!(mapping.target_subject, "user-created-value");
        assert_eq!(mapping.naming_strategy, "custom-mapping");
        // the only transformation entry is the mapping note itself
        assert_eq!(mapping.transformations.len(), 1);
        assert!(mapping.transformations[0].starts_with("custom-mapping:"));
    }

    #[tokio::test]
    async fn test_qualified_mapping_beats_simple() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            "mappings:\n  Shared: generic-subject\nqualified_mappings:\n  reg:Shared: specific-subject\n"
        )
        .unwrap();

        let mut config = Config::default();
        config.aws.registry_names = vec!["reg".into()];
        config.output.dry_run = true;
        config.naming.name_mapping_file = f.path().to_string_lossy().into_owned();
        let mapper = mapper_with(config);
        let cancel = CancellationToken::new();

        let mapping = mapper.map_schema(&plain_schema("Shared"), &cancel).await;
        assert_eq!(mapping.target_subject, "specific-subject");

        let other = schema(
            "other",
            "Shared",
            r#"{"type":"record","name":"S","fields":[]}"#,
        );
        let mapping = mapper.map_schema(&other, &cancel).await;
        assert_eq!(mapping.target_subject, "generic-subject");
    }

    #[tokio::test]
    async fn test_extended_mapping_pins_role_and_context() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            "extended_mappings:\n  - source: reg:Lookup\n    subject: lookup-subject\n    role: key\n    context: .shared\n"
        )
        .unwrap();

        let mut config = Config::default();
        config.aws.registry_names = vec!["reg".into()];
        config.output.dry_run = true;
        config.naming.name_mapping_file = f.path().to_string_lossy().into_owned();
        let mapper = mapper_with(config);
        let cancel = CancellationToken::new();

        let mapping = mapper.map_schema(&plain_schema("Lookup"), &cancel).await;
        assert_eq!(mapping.target_subject, "lookup-subject");
        assert_eq!(mapping.detected_role, SchemaRole::Key);
        assert_eq!(mapping.target_context, ".shared");
    }

    #[tokio::test]
    async fn test_registry_context() {
        let mut config = Config::default();
        config.aws.registry_names = vec!["payments".into()];
        config.output.dry_run = true;
        config.naming.context_mapping = ContextStrategy::Registry;
        let mapper = mapper_with(config);
        let cancel = CancellationToken::new();

        let mapping = mapper
            .map_schema(
                &schema(
                    "payments",
                    "tx",
                    r#"{"type":"record","name":"Tx","fields":[]}"#,
                ),
                &cancel,
            )
            .await;
        assert_eq!(mapping.target_context, ".payments");
    }

    #[tokio::test]
    async fn test_custom_context_with_fallback() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "payments: billing\n").unwrap();

        let mut config = Config::default();
        config.aws.registry_names = vec!["payments".into(), "orders".into()];
        config.output.dry_run = true;
        config.naming.context_mapping = ContextStrategy::Custom;
        config.naming.context_mapping_file = f.path().to_string_lossy().into_owned();
        let mapper = mapper_with(config);
        let cancel = CancellationToken::new();

        let mapping = mapper
            .map_schema(
                &schema(
                    "payments",
                    "tx",
                    r#"{"type":"record","name":"Tx","fields":[]}"#,
                ),
                &cancel,
            )
            .await;
        assert_eq!(mapping.target_context, ".billing");

        // unmapped registry falls back to its own name
        let mapping = mapper
            .map_schema(
                &schema("orders", "o", r#"{"type":"record","name":"O","fields":[]}"#),
                &cancel,
            )
            .await;
        assert_eq!(mapping.target_context, ".orders");
    }

    #[tokio::test]
    async fn test_template_strategy() {
        let mut config = Config::default();
        config.aws.registry_names = vec!["reg".into()];
        config.output.dry_run = true;
        config.naming.subject_strategy = SubjectStrategy::Custom;
        config.naming.subject_template = "{registry}-{name}{suffix}".into();
        // keep the rendered value recognizable
        config.normalization.normalize_case = CaseMode::Lower;
        config.normalization.normalize_dots = DotMode::Keep;
        let mapper = mapper_with(config);
        let cancel = CancellationToken::new();

        let mapping = mapper.map_schema(&plain_schema("Orders"), &cancel).await;
        assert_eq!(mapping.target_subject, "reg-orders-value");
        assert_eq!(mapping.naming_strategy, "custom");
    }

    #[tokio::test]
    async fn test_map_all_preserves_order() {
        let mapper = default_mapper();
        let cancel = CancellationToken::new();

        let schemas = vec![
            plain_schema("Alpha"),
            plain_schema("Beta"),
            plain_schema("Gamma"),
        ];
        let mappings = mapper.map_all(&schemas, &cancel).await.unwrap();
        let names: Vec<&str> = mappings
            .iter()
            .map(|m| m.source_schema_name.as_str())
            .collect();
        assert_eq!(names, vec!["Alpha", "Beta", "Gamma"]);
        assert_eq!(mappings[0].target_subject, "alpha-value");
    }

    #[tokio::test]
    async fn test_llm_strategy_without_namer_falls_back() {
        let mut config = Config::default();
        config.aws.registry_names = vec!["reg".into()];
        config.output.dry_run = true;
        config.naming.subject_strategy = SubjectStrategy::Llm;
        let mapper = mapper_with(config);
        let cancel = CancellationToken::new();

        let mapping = mapper.map_schema(&plain_schema("Orders"), &cancel).await;
        assert_eq!(mapping.naming_strategy, "topic (fallback)");
        assert_eq!(mapping.target_subject, "orders-value");
        assert_eq!(mapping.status, MappingStatus::Ready);
    }
}
