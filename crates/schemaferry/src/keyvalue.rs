//! Key/value role detection
//!
//! Each schema is classified as a key schema or a value schema. Rules apply
//! in strict priority order, stopping at the first hit:
//!
//! 1. explicit override from the role-override file
//! 2. registry-specific patterns from the override file
//! 3. key patterns (user-provided, then built-in)
//! 4. value patterns (user-provided, then built-in)
//! 5. the same patterns against the parsed record name
//! 6. structural heuristics on the parsed fields
//! 7. the configured default

use crate::config::{DefaultRole, KeyValueConfig};
use crate::error::{MigrateError, MigrateResult};
use crate::models::{ParsedSchema, SchemaRole};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;

/// Built-in key patterns
const BUILTIN_KEY_PATTERNS: &[&str] = &[
    r"(?i)[-_]key$",
    r"Key$",
    r"(?i)[-_]id$",
    r"Id$",
    r"ID$",
    r"(?i)identifier$",
    r"(?i)[-_]pk$",
    r"(?i)primarykey$",
    r"(?i)partitionkey$",
];

/// Built-in value patterns
const BUILTIN_VALUE_PATTERNS: &[&str] = &[
    r"(?i)[-_]value$",
    r"Value$",
    r"(?i)event$",
    r"(?i)message$",
    r"(?i)payload$",
    r"(?i)data$",
    r"(?i)record$",
];

/// Field-name fragments that mark a small schema as a key schema
const ID_FIELD_FRAGMENTS: &[&str] = &["id", "key", "uuid", "partition_key", "entity_id", "pk"];

/// Structure of the role override YAML file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RoleOverrideFile {
    /// schema name (or `registry.schema`) → "key" | "value"
    pub overrides: HashMap<String, String>,
    /// Extra user key patterns
    pub key_patterns: Vec<String>,
    /// Extra user value patterns
    pub value_patterns: Vec<String>,
    /// Per-registry pattern blocks
    pub registries: HashMap<String, RegistryPatterns>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegistryPatterns {
    pub key_patterns: Vec<String>,
    pub value_patterns: Vec<String>,
}

/// Result of a detection: the role plus the rule that decided it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionResult {
    pub role: SchemaRole,
    pub reason: String,
}

struct CompiledRegistryPatterns {
    key: Vec<Regex>,
    value: Vec<Regex>,
}

/// Role detector with all patterns compiled up front
///
/// Pattern compilation failures are configuration errors and fail fast.
pub struct Detector {
    overrides: HashMap<String, SchemaRole>,
    registry_patterns: HashMap<String, CompiledRegistryPatterns>,
    builtin_key: Vec<Regex>,
    user_key: Vec<Regex>,
    builtin_value: Vec<Regex>,
    user_value: Vec<Regex>,
    default_role: SchemaRole,
}

impl Detector {
    pub fn new(config: &KeyValueConfig) -> MigrateResult<Self> {
        let mut overrides = HashMap::new();
        let mut registry_patterns = HashMap::new();
        let mut user_key_sources = config.key_regex.clone();
        let mut user_value_sources = config.value_regex.clone();

        if !config.role_override_file.is_empty() {
            let file = load_override_file(&config.role_override_file)?;
            for (name, role) in file.overrides {
                let role = match role.as_str() {
                    "key" => SchemaRole::Key,
                    _ => SchemaRole::Value,
                };
                overrides.insert(name, role);
            }
            user_key_sources.extend(file.key_patterns);
            user_value_sources.extend(file.value_patterns);
            for (registry, patterns) in file.registries {
                registry_patterns.insert(
                    registry,
                    CompiledRegistryPatterns {
                        key: compile_all(&patterns.key_patterns)?,
                        value: compile_all(&patterns.value_patterns)?,
                    },
                );
            }
        }

        let (builtin_key, builtin_value) = if config.disable_builtin_patterns {
            (Vec::new(), Vec::new())
        } else {
            (
                compile_all_static(BUILTIN_KEY_PATTERNS),
                compile_all_static(BUILTIN_VALUE_PATTERNS),
            )
        };

        Ok(Self {
            overrides,
            registry_patterns,
            builtin_key,
            user_key: compile_all(&user_key_sources)?,
            builtin_value,
            user_value: compile_all(&user_value_sources)?,
            default_role: match config.default_role {
                DefaultRole::Key => SchemaRole::Key,
                DefaultRole::Value => SchemaRole::Value,
            },
        })
    }

    /// Classify a schema
    pub fn detect(
        &self,
        registry: &str,
        schema_name: &str,
        parsed: Option<&ParsedSchema>,
    ) -> DetectionResult {
        // 1. Explicit override, bare name or registry-qualified
        if let Some(&role) = self.overrides.get(schema_name) {
            return DetectionResult {
                role,
                reason: "override file".to_string(),
            };
        }
        let qualified = format!("{registry}.{schema_name}");
        if let Some(&role) = self.overrides.get(&qualified) {
            return DetectionResult {
                role,
                reason: "override file".to_string(),
            };
        }

        // 2. Registry-specific patterns
        if let Some(patterns) = self.registry_patterns.get(registry) {
            for re in &patterns.key {
                if re.is_match(schema_name) {
                    return DetectionResult {
                        role: SchemaRole::Key,
                        reason: format!("registry pattern: {re}"),
                    };
                }
            }
            for re in &patterns.value {
                if re.is_match(schema_name) {
                    return DetectionResult {
                        role: SchemaRole::Value,
                        reason: format!("registry pattern: {re}"),
                    };
                }
            }
        }

        // 3 + 4. Name patterns: user before built-in within each role
        if let Some(result) = self.match_patterns(schema_name) {
            return result;
        }

        // 5. Same patterns against the parsed record name
        if let Some(parsed) = parsed {
            if !parsed.record_name.is_empty() {
                if let Some(mut result) = self.match_patterns(&parsed.record_name) {
                    result.reason = format!("record name {}", result.reason);
                    return result;
                }
            }

            // 6. Structural heuristics
            if let Some(result) = detect_by_structure(parsed) {
                return result;
            }
        }

        // 7. Default
        DetectionResult {
            role: self.default_role,
            reason: "default role".to_string(),
        }
    }

    fn match_patterns(&self, name: &str) -> Option<DetectionResult> {
        for re in &self.user_key {
            if re.is_match(name) {
                return Some(DetectionResult {
                    role: SchemaRole::Key,
                    reason: format!("user pattern: {re}"),
                });
            }
        }
        for re in &self.builtin_key {
            if re.is_match(name) {
                return Some(DetectionResult {
                    role: SchemaRole::Key,
                    reason: format!("built-in pattern: {re}"),
                });
            }
        }
        for re in &self.user_value {
            if re.is_match(name) {
                return Some(DetectionResult {
                    role: SchemaRole::Value,
                    reason: format!("user pattern: {re}"),
                });
            }
        }
        for re in &self.builtin_value {
            if re.is_match(name) {
                return Some(DetectionResult {
                    role: SchemaRole::Value,
                    reason: format!("built-in pattern: {re}"),
                });
            }
        }
        None
    }
}

/// Key schemas are small and carry ID-like fields; value schemas are wide
fn detect_by_structure(parsed: &ParsedSchema) -> Option<DetectionResult> {
    let field_count = parsed.fields.len();

    if (1..=3).contains(&field_count) {
        let has_id_field = parsed.fields.iter().any(|field| {
            let lower = field.name.to_lowercase();
            ID_FIELD_FRAGMENTS.iter().any(|frag| lower.contains(frag))
        });
        if has_id_field {
            return Some(DetectionResult {
                role: SchemaRole::Key,
                reason: "structure: few fields with ID-like names".to_string(),
            });
        }
    }

    if field_count >= 6 {
        return Some(DetectionResult {
            role: SchemaRole::Value,
            reason: "structure: many fields".to_string(),
        });
    }

    None
}

fn load_override_file(path: &str) -> MigrateResult<RoleOverrideFile> {
    let data = std::fs::read_to_string(path).map_err(|e| {
        MigrateError::Config(format!("cannot read role override file {path}: {e}"))
    })?;
    serde_yaml::from_str(&data)
        .map_err(|e| MigrateError::Config(format!("invalid role override file {path}: {e}")))
}

fn compile_all(patterns: &[String]) -> MigrateResult<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|e| MigrateError::Config(format!("invalid pattern {p:?}: {e}")))
        })
        .collect()
}

fn compile_all_static(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("built-in pattern"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Field;
    use std::io::Write;

    fn detector(config: &KeyValueConfig) -> Detector {
        Detector::new(config).unwrap()
    }

    fn default_detector() -> Detector {
        detector(&KeyValueConfig::default())
    }

    fn parsed_with_fields(names: &[&str]) -> ParsedSchema {
        ParsedSchema {
            fields: names
                .iter()
                .map(|n| Field {
                    name: n.to_string(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_builtin_suffix_detection() {
        let d = default_detector();
        assert_eq!(d.detect("reg", "user-event-key", None).role, SchemaRole::Key);
        assert_eq!(
            d.detect("reg", "user-event-value", None).role,
            SchemaRole::Value
        );
        assert_eq!(d.detect("reg", "userEventID", None).role, SchemaRole::Key);
        // no pattern hit, no structure: default
        let result = d.detect("reg", "notification", None);
        assert_eq!(result.role, SchemaRole::Value);
        assert_eq!(result.reason, "default role");
    }

    #[test]
    fn test_key_patterns_beat_value_patterns() {
        // "OrderEventKey" matches both Key$ and (?i)event; key wins by order
        let d = default_detector();
        let result = d.detect("reg", "OrderEventKey", None);
        assert_eq!(result.role, SchemaRole::Key);
    }

    #[test]
    fn test_override_beats_patterns() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "overrides:\n  user-event-key: value\n").unwrap();
        let config = KeyValueConfig {
            role_override_file: f.path().to_string_lossy().into_owned(),
            ..Default::default()
        };
        let d = detector(&config);
        // built-in regex says key; override says value; override wins
        let result = d.detect("reg", "user-event-key", None);
        assert_eq!(result.role, SchemaRole::Value);
        assert_eq!(result.reason, "override file");
    }

    #[test]
    fn test_registry_qualified_override() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "overrides:\n  payments.settlement: key\n").unwrap();
        let config = KeyValueConfig {
            role_override_file: f.path().to_string_lossy().into_owned(),
            ..Default::default()
        };
        let d = detector(&config);
        assert_eq!(
            d.detect("payments", "settlement", None).role,
            SchemaRole::Key
        );
        // other registries unaffected
        assert_eq!(d.detect("orders", "settlement", None).role, SchemaRole::Value);
    }

    #[test]
    fn test_registry_patterns() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            "registries:\n  payments:\n    key_patterns:\n      - '^pk-'\n"
        )
        .unwrap();
        let config = KeyValueConfig {
            role_override_file: f.path().to_string_lossy().into_owned(),
            ..Default::default()
        };
        let d = detector(&config);
        let result = d.detect("payments", "pk-settlement", None);
        assert_eq!(result.role, SchemaRole::Key);
        assert!(result.reason.starts_with("registry pattern"));
    }

    #[test]
    fn test_user_regex_beats_structure() {
        let config = KeyValueConfig {
            value_regex: vec!["^lookup-".to_string()],
            ..Default::default()
        };
        let d = detector(&config);
        // structure says key (2 fields, id-like); user regex says value
        let parsed = parsed_with_fields(&["id", "ts"]);
        let result = d.detect("reg", "lookup-entry", Some(&parsed));
        assert_eq!(result.role, SchemaRole::Value);
        assert!(result.reason.starts_with("user pattern"));
    }

    #[test]
    fn test_record_name_patterns() {
        let d = default_detector();
        let parsed = ParsedSchema {
            record_name: "PaymentKey".to_string(),
            ..Default::default()
        };
        let result = d.detect("reg", "obscure-name", Some(&parsed));
        assert_eq!(result.role, SchemaRole::Key);
        assert!(result.reason.starts_with("record name"));
    }

    #[test]
    fn test_structure_few_id_fields_is_key() {
        let d = default_detector();
        let parsed = parsed_with_fields(&["entity_id", "ts"]);
        let result = d.detect("reg", "obscure", Some(&parsed));
        assert_eq!(result.role, SchemaRole::Key);
    }

    #[test]
    fn test_structure_many_fields_is_value() {
        let d = default_detector();
        let parsed = parsed_with_fields(&["a", "b", "c", "d", "e", "f"]);
        let result = d.detect("reg", "obscure", Some(&parsed));
        assert_eq!(result.role, SchemaRole::Value);
        assert_eq!(result.reason, "structure: many fields");
    }

    #[test]
    fn test_default_role_configurable() {
        let config = KeyValueConfig {
            default_role: DefaultRole::Key,
            disable_builtin_patterns: true,
            ..Default::default()
        };
        let d = detector(&config);
        assert_eq!(d.detect("reg", "whatever", None).role, SchemaRole::Key);
    }

    #[test]
    fn test_disable_builtin_patterns() {
        let config = KeyValueConfig {
            disable_builtin_patterns: true,
            ..Default::default()
        };
        let d = detector(&config);
        // would match built-in Key$ otherwise
        let result = d.detect("reg", "OrderKey", None);
        assert_eq!(result.role, SchemaRole::Value);
        assert_eq!(result.reason, "default role");
    }

    #[test]
    fn test_invalid_user_pattern_is_config_error() {
        let config = KeyValueConfig {
            key_regex: vec!["[bad".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            Detector::new(&config),
            Err(MigrateError::Config(_))
        ));
    }
}
