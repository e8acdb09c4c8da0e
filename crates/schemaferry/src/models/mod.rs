//! Data model for the migration pipeline
//!
//! Source-side types mirror what the Glue registry returns; mapping types are
//! produced by the naming pipeline; state types back the checkpoint file.

pub mod migration;
pub mod report;
pub mod schema;

pub use migration::{
    Collision, CompletedSchema, DependencyLevel, FailedSchema, MigrationPlan, MigrationState,
    MigrationSummary, PlanIssue,
};
pub use report::{
    ConfigReport, MigrationReport, ResultsReport, SchemaReport, SourceReport, TargetReport,
};
pub use schema::{
    schema_key, Field, MappingStatus, ParsedSchema, SchemaMapping, SchemaRole, SchemaType,
    SchemaVersion, SourceRegistry, SourceSchema, SubjectMetadata,
};
