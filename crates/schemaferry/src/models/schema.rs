//! Source schemas, parsed metadata, and the mapping unit

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Schema definition format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchemaType {
    #[serde(rename = "AVRO")]
    Avro,
    #[serde(rename = "JSON")]
    Json,
    #[serde(rename = "PROTOBUF")]
    Protobuf,
}

impl SchemaType {
    /// Wire name used by both registries
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaType::Avro => "AVRO",
            SchemaType::Json => "JSON",
            SchemaType::Protobuf => "PROTOBUF",
        }
    }
}

impl std::fmt::Display for SchemaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SchemaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "AVRO" => Ok(SchemaType::Avro),
            "JSON" => Ok(SchemaType::Json),
            "PROTOBUF" => Ok(SchemaType::Protobuf),
            other => Err(format!("unknown schema type: {other}")),
        }
    }
}

/// Whether a schema describes message keys or message values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaRole {
    Key,
    Value,
}

impl SchemaRole {
    /// Suffix appended to subjects for this role
    pub fn suffix(&self) -> &'static str {
        match self {
            SchemaRole::Key => "-key",
            SchemaRole::Value => "-value",
        }
    }
}

impl std::fmt::Display for SchemaRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaRole::Key => f.write_str("key"),
            SchemaRole::Value => f.write_str("value"),
        }
    }
}

/// A source-side registry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceRegistry {
    pub name: String,
    #[serde(default)]
    pub arn: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub created_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_time: Option<DateTime<Utc>>,
}

/// A schema as extracted from the source registry, with all versions
///
/// Identity is `(registry_name, name)`. Versions are kept sorted strictly
/// ascending by `version_number`; that order is the registration order at
/// the target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSchema {
    pub name: String,
    pub registry_name: String,
    #[serde(default)]
    pub arn: String,
    #[serde(default)]
    pub description: String,
    pub data_format: SchemaType,
    #[serde(default)]
    pub compatibility: String,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default)]
    pub latest_version: i64,
    #[serde(default)]
    pub versions: Vec<SchemaVersion>,
}

impl SourceSchema {
    /// Canonical identity string `registry:name`
    pub fn key(&self) -> String {
        schema_key(&self.registry_name, &self.name)
    }

    /// The latest version, if any versions were fetched
    pub fn latest(&self) -> Option<&SchemaVersion> {
        self.versions.last()
    }
}

/// One version of a source schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaVersion {
    pub version_number: i64,
    /// Opaque version id assigned by the source (a UUID for Glue)
    #[serde(default)]
    pub version_id: String,
    pub definition: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub created_time: Option<DateTime<Utc>>,
}

/// Metadata extracted from the latest version of a source schema
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedSchema {
    #[serde(default)]
    pub record_name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub documentation: String,
    #[serde(default)]
    pub fields: Vec<Field>,
    /// Referenced type names as they appear in the definition,
    /// duplicate-free, first-seen order
    #[serde(default)]
    pub references: Vec<String>,
}

/// A field extracted from a schema definition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(default)]
    pub type_name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub doc: String,
}

/// Subject metadata pushed to the target
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubjectMetadata {
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub properties: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Mapping status after the naming pipeline and validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingStatus {
    Ready,
    Warning,
    Error,
    Skipped,
}

/// The unit the planning pipeline produces: one source schema mapped to one
/// target subject
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaMapping {
    // Source
    pub source_registry: String,
    pub source_schema_name: String,
    pub source_versions: usize,

    // Target
    #[serde(default)]
    pub target_context: String,
    #[serde(default)]
    pub target_subject: String,
    pub detected_role: SchemaRole,

    // Naming
    #[serde(default)]
    pub naming_strategy: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub naming_reason: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transformations: Vec<String>,

    // References (resolved keys) and graph position
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
    pub dependency_level: usize,

    // Status
    pub status: MappingStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub warning: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl SchemaMapping {
    /// A skeleton mapping as produced by the dependency graph; target-side
    /// fields are filled in by the naming pipeline
    pub fn skeleton(
        registry: &str,
        name: &str,
        versions: usize,
        references: Vec<String>,
        level: usize,
    ) -> Self {
        Self {
            source_registry: registry.to_string(),
            source_schema_name: name.to_string(),
            source_versions: versions,
            target_context: String::new(),
            target_subject: String::new(),
            detected_role: SchemaRole::Value,
            naming_strategy: String::new(),
            naming_reason: String::new(),
            transformations: Vec::new(),
            references,
            dependency_level: level,
            status: MappingStatus::Ready,
            warning: String::new(),
            error: String::new(),
        }
    }

    /// Canonical identity string `registry:name`
    pub fn key(&self) -> String {
        schema_key(&self.source_registry, &self.source_schema_name)
    }

    /// Full target including context: `.ctx:subject`, or just `subject`
    /// when the context is empty
    pub fn full_target(&self) -> String {
        if self.target_context.is_empty() {
            self.target_subject.clone()
        } else {
            format!("{}:{}", self.target_context, self.target_subject)
        }
    }
}

/// Canonical identity used in graphs, checkpoints, and progress logs
pub fn schema_key(registry: &str, name: &str) -> String {
    format!("{registry}:{name}")
}
