//! User-visible migration report
//!
//! A report is always emitted, dry-run or not. It can be rendered as a
//! table, JSON, or CSV (see `crate::report`).

use super::schema::SchemaRole;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Complete report of one migration run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReport {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration: String,
    pub dry_run: bool,

    pub source: SourceReport,
    pub target: TargetReport,
    pub config: ConfigReport,
    pub results: ResultsReport,

    pub schemas: Vec<SchemaReport>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ReportIssue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ReportIssue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceReport {
    /// Always "aws_glue"
    pub kind: String,
    pub region: String,
    pub registries: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetReport {
    /// Always "confluent_cloud"
    pub kind: String,
    pub url: String,
}

/// The configuration knobs that shaped this run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigReport {
    pub subject_strategy: String,
    pub context_mapping: String,
    pub version_strategy: String,
    pub reference_strategy: String,
    pub normalize_dots: String,
    pub normalize_case: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub llm_provider: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub llm_model: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ResultsReport {
    pub registries_processed: usize,
    pub schemas_processed: usize,
    pub versions_processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub llm_calls: usize,
    pub llm_cost: f64,
}

/// Per-schema line in the report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaReport {
    pub source_registry: String,
    pub source_schema: String,

    pub target_context: String,
    pub target_subject: String,

    pub detected_role: SchemaRole,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub role_reason: String,
    pub naming_strategy: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transformations: Vec<String>,

    pub versions: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,

    pub status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub warning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportIssue {
    pub schema: String,
    pub message: String,
}
