//! Migration plan and checkpoint state

use super::schema::SchemaMapping;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Checkpoint file format version
pub const STATE_VERSION: u32 = 1;

/// Persistent migration state, written atomically after every dependency
/// level so an interrupted run can resume
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationState {
    #[serde(default = "default_state_version")]
    pub version: u32,

    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub config_hash: String,

    #[serde(default)]
    pub total_schemas: usize,
    #[serde(default)]
    pub completed_count: usize,
    #[serde(default)]
    pub failed_count: usize,
    #[serde(default)]
    pub skipped_count: usize,

    /// Level-order list of resolved keys
    #[serde(default)]
    pub migration_order: Vec<String>,

    #[serde(default)]
    pub completed_schemas: HashMap<String, CompletedSchema>,
    #[serde(default)]
    pub failed_schemas: HashMap<String, FailedSchema>,
}

fn default_state_version() -> u32 {
    STATE_VERSION
}

impl MigrationState {
    pub fn new(config_hash: impl Into<String>) -> Self {
        Self {
            version: STATE_VERSION,
            started_at: Utc::now(),
            config_hash: config_hash.into(),
            total_schemas: 0,
            completed_count: 0,
            failed_count: 0,
            skipped_count: 0,
            migration_order: Vec::new(),
            completed_schemas: HashMap::new(),
            failed_schemas: HashMap::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed_count + self.failed_count + self.skipped_count >= self.total_schemas
    }

    /// Progress as a percentage
    pub fn progress(&self) -> f64 {
        if self.total_schemas == 0 {
            return 0.0;
        }
        (self.completed_count + self.failed_count + self.skipped_count) as f64
            / self.total_schemas as f64
            * 100.0
    }
}

/// A successfully migrated schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedSchema {
    pub source_registry: String,
    pub source_schema: String,
    pub target_subject: String,
    pub versions: usize,
    pub completed_at: DateTime<Utc>,
}

/// A schema that failed to migrate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedSchema {
    pub source_registry: String,
    pub source_schema: String,
    pub error: String,
    pub attempts: u32,
    pub last_attempt: DateTime<Utc>,
}

/// One level of the topologically sorted dependency graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyLevel {
    pub level: usize,
    pub schemas: Vec<SchemaMapping>,
}

/// Two or more sources mapping to the same target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collision {
    /// The contested `(context, subject)` target
    pub target: String,
    /// Sources (as `registry.schema`) that map to it
    pub source_schemas: Vec<String>,
}

/// A validation finding attached to a schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanIssue {
    pub schema: String,
    pub message: String,
}

/// The complete migration plan as produced by the planning phases
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationPlan {
    pub source_registries: Vec<String>,
    pub total_schemas: usize,
    pub total_versions: usize,
    pub total_references: usize,

    pub mappings: Vec<SchemaMapping>,
    pub levels: Vec<DependencyLevel>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collisions: Vec<Collision>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<PlanIssue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<PlanIssue>,

    pub summary: MigrationSummary,
}

/// Aggregate counts over a plan
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MigrationSummary {
    pub registries: usize,
    pub schemas: usize,
    pub versions: usize,
    pub references: usize,
    pub ready: usize,
    pub warnings: usize,
    pub errors: usize,
    pub skipped: usize,
    pub collisions: usize,
    pub llm_calls: usize,
    pub estimated_llm_cost: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_counts() {
        let mut state = MigrationState::new("abc");
        state.total_schemas = 4;
        assert!(!state.is_complete());
        assert_eq!(state.progress(), 0.0);

        state.completed_count = 2;
        state.failed_count = 1;
        state.skipped_count = 1;
        assert!(state.is_complete());
        assert_eq!(state.progress(), 100.0);
    }

    #[test]
    fn test_state_json_roundtrip() {
        let mut state = MigrationState::new("deadbeef");
        state.total_schemas = 2;
        state.completed_count = 1;
        state.migration_order = vec!["reg:a".into(), "reg:b".into()];
        state.completed_schemas.insert(
            "reg:a".into(),
            CompletedSchema {
                source_registry: "reg".into(),
                source_schema: "a".into(),
                target_subject: "a-value".into(),
                versions: 3,
                completed_at: Utc::now(),
            },
        );
        state.failed_schemas.insert(
            "reg:b".into(),
            FailedSchema {
                source_registry: "reg".into(),
                source_schema: "b".into(),
                error: "boom".into(),
                attempts: 2,
                last_attempt: Utc::now(),
            },
        );

        let json = serde_json::to_string_pretty(&state).unwrap();
        let restored: MigrationState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.version, STATE_VERSION);
        assert_eq!(restored.config_hash, "deadbeef");
        assert_eq!(restored.total_schemas, 2);
        assert_eq!(restored.migration_order, state.migration_order);
        assert_eq!(restored.completed_schemas.len(), 1);
        assert_eq!(restored.failed_schemas["reg:b"].attempts, 2);
    }

    #[test]
    fn test_state_maps_default_when_absent() {
        // A hand-edited checkpoint may omit the maps entirely
        let json = r#"{"version":1,"started_at":"2025-01-01T00:00:00Z"}"#;
        let state: MigrationState = serde_json::from_str(json).unwrap();
        assert!(state.completed_schemas.is_empty());
        assert!(state.failed_schemas.is_empty());
    }
}
