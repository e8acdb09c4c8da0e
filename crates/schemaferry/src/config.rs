//! Configuration for schemaferry
//!
//! A YAML config file enumerates every knob; the CLI overrides the common
//! ones. Validation runs before any I/O and collects every problem instead
//! of stopping at the first.

use crate::error::{MigrateError, MigrateResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Source: AWS Glue Schema Registry
    pub aws: AwsConfig,
    /// Target: Confluent Cloud Schema Registry
    pub confluent_cloud: ConfluentCloudConfig,
    pub naming: NamingConfig,
    pub normalization: NormalizationConfig,
    pub key_value: KeyValueConfig,
    pub migration: MigrationConfig,
    pub llm: LlmConfig,
    pub concurrency: ConcurrencyConfig,
    pub checkpoint: CheckpointConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsConfig {
    pub region: String,
    pub registry_names: Vec<String>,
    pub registry_all: bool,
    /// Glob patterns; matching registries are skipped when `registry_all`
    pub registry_exclude: Vec<String>,
    /// Glob pattern applied to schema names within a registry
    pub schema_filter: String,
    pub profile: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Endpoint override (LocalStack, proxies)
    pub endpoint_url: String,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            registry_names: Vec::new(),
            registry_all: false,
            registry_exclude: Vec::new(),
            schema_filter: String::new(),
            profile: String::new(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            endpoint_url: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfluentCloudConfig {
    pub url: String,
    pub api_key: String,
    pub api_secret: String,
}

/// How target subjects are derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubjectStrategy {
    #[default]
    Topic,
    Record,
    Llm,
    Custom,
}

/// How target contexts are derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContextStrategy {
    /// Everything lands in the default context
    #[default]
    Flat,
    /// One context per source registry
    Registry,
    /// Registry → context lookup from a mapping file
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    pub subject_strategy: SubjectStrategy,
    /// Template for the `custom` strategy, e.g. `"{registry}-{name}{suffix}"`
    pub subject_template: String,
    pub context_mapping: ContextStrategy,
    pub context_mapping_file: String,
    /// Explicit schema → subject overrides (highest priority)
    pub name_mapping_file: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            subject_strategy: SubjectStrategy::Topic,
            subject_template: String::new(),
            context_mapping: ContextStrategy::Flat,
            context_mapping_file: String::new(),
            name_mapping_file: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DotMode {
    Keep,
    #[default]
    Replace,
    ExtractLast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaseMode {
    Keep,
    #[default]
    Kebab,
    Snake,
    Lower,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollisionStrategy {
    Fail,
    #[default]
    Suffix,
    RegistryPrefix,
    PreferShorter,
    Skip,
}

impl std::fmt::Display for CollisionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CollisionStrategy::Fail => "fail",
            CollisionStrategy::Suffix => "suffix",
            CollisionStrategy::RegistryPrefix => "registry-prefix",
            CollisionStrategy::PreferShorter => "prefer-shorter",
            CollisionStrategy::Skip => "skip",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationConfig {
    pub normalize_dots: DotMode,
    pub dot_replacement: String,
    pub normalize_case: CaseMode,
    pub invalid_char_replacement: String,
    pub collision_check: bool,
    pub collision_resolution: CollisionStrategy,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            normalize_dots: DotMode::Replace,
            dot_replacement: "-".to_string(),
            normalize_case: CaseMode::Kebab,
            invalid_char_replacement: "-".to_string(),
            collision_check: true,
            collision_resolution: CollisionStrategy::Suffix,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultRole {
    Key,
    #[default]
    Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyValueConfig {
    pub key_regex: Vec<String>,
    pub value_regex: Vec<String>,
    pub default_role: DefaultRole,
    pub role_override_file: String,
    pub disable_builtin_patterns: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionStrategy {
    #[default]
    All,
    Latest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceStrategy {
    #[default]
    Rewrite,
    Skip,
    Fail,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    pub version_strategy: VersionStrategy,
    pub reference_strategy: ReferenceStrategy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderKind {
    #[default]
    Openai,
    Anthropic,
    Ollama,
    /// Any OpenAI-compatible endpoint reachable at `base_url`
    Local,
}

impl std::fmt::Display for LlmProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LlmProviderKind::Openai => "openai",
            LlmProviderKind::Anthropic => "anthropic",
            LlmProviderKind::Ollama => "ollama",
            LlmProviderKind::Local => "local",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProviderKind,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub base_url: String,
    pub cache_file: String,
    /// Spending ceiling in dollars; 0 disables the gate
    pub max_cost: f64,
    pub rate_limit: u32,
    pub input_token_cost: f64,
    pub output_token_cost: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProviderKind::Openai,
            model: "gpt-4o".to_string(),
            api_key: String::new(),
            base_url: String::new(),
            cache_file: String::new(),
            max_cost: 0.0,
            rate_limit: 5,
            // gpt-4o list pricing: $5 / $15 per million tokens
            input_token_cost: 0.000005,
            output_token_cost: 0.000015,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    pub workers: usize,
    pub aws_rate_limit: u32,
    pub cc_rate_limit: u32,
    pub llm_rate_limit: u32,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            aws_rate_limit: 10,
            cc_rate_limit: 10,
            llm_rate_limit: 5,
            retry_attempts: 3,
            retry_delay_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    pub file: String,
    pub resume: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Table,
    Json,
    Csv,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dry_run: bool,
    pub report_file: String,
    pub format: ReportFormat,
    pub log_level: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            report_file: String::new(),
            format: ReportFormat::Table,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load a config file, layering it over the defaults
    pub fn from_file(path: impl AsRef<Path>) -> MigrateResult<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| {
            MigrateError::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        let config: Config = serde_yaml::from_str(&data).map_err(|e| {
            MigrateError::Config(format!("cannot parse config file {}: {e}", path.display()))
        })?;
        Ok(config)
    }

    /// Fill credentials from the environment when the config left them empty
    pub fn apply_env_fallbacks(&mut self) {
        if self.confluent_cloud.api_key.is_empty() {
            if let Ok(v) = std::env::var("CC_API_KEY") {
                self.confluent_cloud.api_key = v;
            }
        }
        if self.confluent_cloud.api_secret.is_empty() {
            if let Ok(v) = std::env::var("CC_API_SECRET") {
                self.confluent_cloud.api_secret = v;
            }
        }
        if self.llm.api_key.is_empty() {
            let var = match self.llm.provider {
                LlmProviderKind::Openai => Some("OPENAI_API_KEY"),
                LlmProviderKind::Anthropic => Some("ANTHROPIC_API_KEY"),
                _ => None,
            };
            if let Some(var) = var {
                if let Ok(v) = std::env::var(var) {
                    self.llm.api_key = v;
                }
            }
        }
    }

    /// SHA-256 over the canonical serialized config, recorded in checkpoints
    /// so a resumed run can notice a changed plan
    pub fn hash(&self) -> String {
        let serialized = serde_yaml::to_string(self).unwrap_or_default();
        let digest = Sha256::digest(serialized.as_bytes());
        hex::encode(digest)
    }

    /// Validate the configuration; collects every problem
    pub fn validate(&self) -> MigrateResult<()> {
        let mut problems: Vec<String> = Vec::new();

        if self.aws.region.is_empty() {
            problems.push("aws.region: region is required".into());
        }
        if !self.aws.registry_all && self.aws.registry_names.is_empty() {
            problems
                .push("aws.registry_names: either registry_names or registry_all is required".into());
        }

        // Target credentials are only needed when we will actually write
        if !self.output.dry_run {
            if self.confluent_cloud.url.is_empty() {
                problems.push("confluent_cloud.url: URL is required".into());
            } else if reqwest::Url::parse(&self.confluent_cloud.url).is_err() {
                problems.push("confluent_cloud.url: invalid URL".into());
            }
            if self.confluent_cloud.api_key.is_empty() {
                problems.push("confluent_cloud.api_key: API key is required".into());
            }
            if self.confluent_cloud.api_secret.is_empty() {
                problems.push("confluent_cloud.api_secret: API secret is required".into());
            }
        }

        if self.naming.subject_strategy == SubjectStrategy::Custom
            && self.naming.subject_template.is_empty()
        {
            problems.push(
                "naming.subject_template: template is required for the custom strategy".into(),
            );
        }

        if self.naming.context_mapping == ContextStrategy::Custom {
            if self.naming.context_mapping_file.is_empty() {
                problems.push(
                    "naming.context_mapping_file: required when context_mapping is custom".into(),
                );
            } else {
                validate_context_mapping_file(&self.naming.context_mapping_file, &mut problems);
            }
        }

        if !self.naming.name_mapping_file.is_empty() {
            validate_name_mapping_file(&self.naming.name_mapping_file, &mut problems);
        }

        for (i, pattern) in self.key_value.key_regex.iter().enumerate() {
            if let Err(e) = regex::Regex::new(pattern) {
                problems.push(format!("key_value.key_regex[{i}]: invalid regex: {e}"));
            }
        }
        for (i, pattern) in self.key_value.value_regex.iter().enumerate() {
            if let Err(e) = regex::Regex::new(pattern) {
                problems.push(format!("key_value.value_regex[{i}]: invalid regex: {e}"));
            }
        }

        if self.naming.subject_strategy == SubjectStrategy::Llm {
            if self.llm.model.is_empty() {
                problems.push("llm.model: model is required for the llm strategy".into());
            }
            match self.llm.provider {
                LlmProviderKind::Openai | LlmProviderKind::Anthropic => {
                    if self.llm.api_key.is_empty() {
                        problems
                            .push("llm.api_key: API key is required for cloud providers".into());
                    }
                }
                LlmProviderKind::Ollama | LlmProviderKind::Local => {
                    if self.llm.base_url.is_empty() && self.llm.provider == LlmProviderKind::Local {
                        problems.push("llm.base_url: base URL is required for local providers".into());
                    }
                }
            }
        }

        if self.concurrency.workers == 0 {
            problems.push("concurrency.workers: must be at least 1".into());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(MigrateError::Config(problems.join("; ")))
        }
    }
}

/// Structure of the custom name-mapping YAML file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NameMappingFile {
    /// schema name → subject (matches any registry)
    pub mappings: HashMap<String, String>,
    /// `registry:schema` → subject
    pub qualified_mappings: HashMap<String, String>,
    /// Mappings with optional role / context overrides
    pub extended_mappings: Vec<ExtendedMapping>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExtendedMapping {
    /// Schema name or `registry:schema`
    pub source: String,
    pub subject: String,
    /// Optional: "key" or "value"
    pub role: String,
    /// Optional: target context
    pub context: String,
}

fn validate_name_mapping_file(path: &str, problems: &mut Vec<String>) {
    let data = match std::fs::read_to_string(path) {
        Ok(d) => d,
        Err(e) => {
            problems.push(format!("naming.name_mapping_file: cannot read {path}: {e}"));
            return;
        }
    };
    let file: NameMappingFile = match serde_yaml::from_str(&data) {
        Ok(f) => f,
        Err(e) => {
            problems.push(format!("naming.name_mapping_file: invalid YAML: {e}"));
            return;
        }
    };

    let mut seen: HashMap<&str, ()> = HashMap::new();
    for (source, subject) in &file.mappings {
        if subject.is_empty() {
            problems.push(format!(
                "naming.name_mapping_file: empty subject for mapping {source:?}"
            ));
        }
        if seen.insert(source.as_str(), ()).is_some() {
            problems.push(format!("naming.name_mapping_file: duplicate source {source:?}"));
        }
    }
    for (source, subject) in &file.qualified_mappings {
        if subject.is_empty() {
            problems.push(format!(
                "naming.name_mapping_file: empty subject for qualified mapping {source:?}"
            ));
        }
        if !source.contains(':') {
            problems.push(format!(
                "naming.name_mapping_file: qualified mapping {source:?} must contain ':' (registry:schema)"
            ));
        }
        if seen.insert(source.as_str(), ()).is_some() {
            problems.push(format!("naming.name_mapping_file: duplicate source {source:?}"));
        }
    }
    for (i, ext) in file.extended_mappings.iter().enumerate() {
        if ext.source.is_empty() {
            problems.push(format!(
                "naming.name_mapping_file: extended_mappings[{i}]: source is required"
            ));
        }
        if ext.subject.is_empty() {
            problems.push(format!(
                "naming.name_mapping_file: extended_mappings[{i}]: subject is required"
            ));
        }
        if !ext.role.is_empty() && ext.role != "key" && ext.role != "value" {
            problems.push(format!(
                "naming.name_mapping_file: extended_mappings[{i}]: role must be 'key' or 'value', got {:?}",
                ext.role
            ));
        }
        if !ext.source.is_empty() && seen.insert(ext.source.as_str(), ()).is_some() {
            problems.push(format!(
                "naming.name_mapping_file: duplicate source {:?} in extended_mappings[{i}]",
                ext.source
            ));
        }
    }
}

fn validate_context_mapping_file(path: &str, problems: &mut Vec<String>) {
    let data = match std::fs::read_to_string(path) {
        Ok(d) => d,
        Err(e) => {
            problems.push(format!("naming.context_mapping_file: cannot read {path}: {e}"));
            return;
        }
    };
    let mappings: HashMap<String, String> = match serde_yaml::from_str(&data) {
        Ok(m) => m,
        Err(e) => {
            problems.push(format!(
                "naming.context_mapping_file: invalid YAML (expected string → string map): {e}"
            ));
            return;
        }
    };
    for (registry, context) in &mappings {
        if registry.is_empty() {
            problems.push("naming.context_mapping_file: empty registry name in mapping".into());
        }
        if context.is_empty() {
            problems.push(format!(
                "naming.context_mapping_file: empty context name for registry {registry:?}"
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn dry_run_config() -> Config {
        let mut cfg = Config::default();
        cfg.aws.registry_names = vec!["my-registry".into()];
        cfg.output.dry_run = true;
        cfg
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.aws.region, "us-east-1");
        assert_eq!(cfg.naming.subject_strategy, SubjectStrategy::Topic);
        assert_eq!(cfg.naming.context_mapping, ContextStrategy::Flat);
        assert_eq!(cfg.normalization.normalize_dots, DotMode::Replace);
        assert_eq!(cfg.normalization.normalize_case, CaseMode::Kebab);
        assert_eq!(
            cfg.normalization.collision_resolution,
            CollisionStrategy::Suffix
        );
        assert_eq!(cfg.migration.version_strategy, VersionStrategy::All);
        assert_eq!(cfg.migration.reference_strategy, ReferenceStrategy::Rewrite);
        assert_eq!(cfg.concurrency.workers, 10);
        assert_eq!(cfg.concurrency.retry_attempts, 3);
    }

    #[test]
    fn test_dry_run_skips_target_credentials() {
        let cfg = dry_run_config();
        cfg.validate().unwrap();
    }

    #[test]
    fn test_non_dry_run_requires_target() {
        let mut cfg = dry_run_config();
        cfg.output.dry_run = false;
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("confluent_cloud.url"));
        assert!(err.contains("confluent_cloud.api_key"));
    }

    #[test]
    fn test_requires_registry_selection() {
        let mut cfg = dry_run_config();
        cfg.aws.registry_names.clear();
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("registry_names"));

        cfg.aws.registry_all = true;
        cfg.validate().unwrap();
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let mut cfg = dry_run_config();
        cfg.key_value.key_regex = vec!["[unclosed".into()];
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("key_regex[0]"));
    }

    #[test]
    fn test_custom_strategy_requires_template() {
        let mut cfg = dry_run_config();
        cfg.naming.subject_strategy = SubjectStrategy::Custom;
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("subject_template"));
    }

    #[test]
    fn test_llm_strategy_requires_key() {
        let mut cfg = dry_run_config();
        cfg.naming.subject_strategy = SubjectStrategy::Llm;
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("llm.api_key"));
    }

    #[test]
    fn test_from_file_layers_over_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            "aws:\n  registry_names: [orders]\nnaming:\n  subject_strategy: record\n"
        )
        .unwrap();
        let cfg = Config::from_file(f.path()).unwrap();
        assert_eq!(cfg.aws.registry_names, vec!["orders".to_string()]);
        assert_eq!(cfg.naming.subject_strategy, SubjectStrategy::Record);
        // untouched sections keep their defaults
        assert_eq!(cfg.concurrency.workers, 10);
    }

    #[test]
    fn test_unknown_enum_value_fails_parse() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "naming:\n  subject_strategy: banana\n").unwrap();
        assert!(Config::from_file(f.path()).is_err());
    }

    #[test]
    fn test_hash_is_stable_and_sensitive() {
        let a = dry_run_config();
        let b = dry_run_config();
        assert_eq!(a.hash(), b.hash());

        let mut c = dry_run_config();
        c.concurrency.workers = 3;
        assert_ne!(a.hash(), c.hash());
    }

    #[test]
    fn test_name_mapping_file_validation() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            "mappings:\n  GoodSchema: good-subject\n  BadSchema: \"\"\nqualified_mappings:\n  no-colon-here: subj\n"
        )
        .unwrap();
        let mut cfg = dry_run_config();
        cfg.naming.name_mapping_file = f.path().to_string_lossy().into_owned();
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("empty subject"));
        assert!(err.contains("must contain ':'"));
    }

    #[test]
    fn test_extended_mapping_role_validated() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            "extended_mappings:\n  - source: a\n    subject: a-subj\n    role: banana\n"
        )
        .unwrap();
        let mut cfg = dry_run_config();
        cfg.naming.name_mapping_file = f.path().to_string_lossy().into_owned();
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("role must be 'key' or 'value'"));
    }
}
