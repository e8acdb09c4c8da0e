//! Report rendering — table, JSON, and CSV output plus the console
//! dry-run report

use crate::config::ReportFormat;
use crate::error::MigrateResult;
use crate::models::{MigrationPlan, MigrationReport, MappingStatus};
use std::path::Path;

/// Render a report in the requested format
pub fn render(report: &MigrationReport, format: ReportFormat) -> MigrateResult<String> {
    match format {
        ReportFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        ReportFormat::Csv => Ok(render_csv(report)),
        ReportFormat::Table => Ok(render_table(report)),
    }
}

/// Render and write a report to a file
pub fn write_report(
    report: &MigrationReport,
    format: ReportFormat,
    path: impl AsRef<Path>,
) -> MigrateResult<()> {
    let rendered = render(report, format)?;
    std::fs::write(path.as_ref(), rendered)?;
    Ok(())
}

fn render_table(report: &MigrationReport) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "Migration report ({})\n",
        if report.dry_run { "dry-run" } else { "executed" }
    ));
    out.push_str(&format!(
        "  {} -> {}\n",
        report.source.registries.join(", "),
        report.target.url
    ));
    out.push_str(&format!("  duration: {}\n\n", report.duration));

    // Column widths sized to content
    let source_width = report
        .schemas
        .iter()
        .map(|s| s.source_registry.len() + s.source_schema.len() + 1)
        .max()
        .unwrap_or(6)
        .max(6);
    let target_width = report
        .schemas
        .iter()
        .map(|s| s.target_context.len() + s.target_subject.len() + 1)
        .max()
        .unwrap_or(6)
        .max(6);

    out.push_str(&format!(
        "  {:<source_width$}  {:<target_width$}  {:<8}  {:<10}  STATUS\n",
        "SOURCE", "TARGET", "ROLE", "STRATEGY"
    ));
    for schema in &report.schemas {
        let source = format!("{}.{}", schema.source_registry, schema.source_schema);
        let target = if schema.target_context.is_empty() {
            schema.target_subject.clone()
        } else {
            format!("{}:{}", schema.target_context, schema.target_subject)
        };
        out.push_str(&format!(
            "  {:<source_width$}  {:<target_width$}  {:<8}  {:<10}  {}\n",
            source, target, schema.detected_role, schema.naming_strategy, schema.status
        ));
    }

    out.push_str(&format!(
        "\n  schemas: {}  versions: {}  successful: {}  failed: {}  skipped: {}\n",
        report.results.schemas_processed,
        report.results.versions_processed,
        report.results.successful,
        report.results.failed,
        report.results.skipped,
    ));
    if report.results.llm_calls > 0 {
        out.push_str(&format!(
            "  llm calls: {} (cost ${:.2})\n",
            report.results.llm_calls, report.results.llm_cost
        ));
    }

    out
}

fn render_csv(report: &MigrationReport) -> String {
    let mut out = String::from(
        "source_registry,source_schema,target_context,target_subject,role,strategy,versions,status,error\n",
    );
    for schema in &report.schemas {
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{},{}\n",
            csv_field(&schema.source_registry),
            csv_field(&schema.source_schema),
            csv_field(&schema.target_context),
            csv_field(&schema.target_subject),
            schema.detected_role,
            csv_field(&schema.naming_strategy),
            schema.versions,
            csv_field(&schema.status),
            csv_field(&schema.error),
        ));
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Print the dry-run plan to stdout
pub fn print_dry_run(plan: &MigrationPlan) {
    println!();
    println!("================ MIGRATION PLAN (DRY RUN) ================");
    println!();

    println!("REGISTRY SUMMARY");
    for registry in &plan.source_registries {
        let count = plan
            .mappings
            .iter()
            .filter(|m| &m.source_registry == registry)
            .count();
        println!("  {registry}: {count} schemas");
    }
    println!();

    println!("SCHEMA MAPPINGS");
    for mapping in &plan.mappings {
        let status = match mapping.status {
            MappingStatus::Ready => "[ok]  ",
            MappingStatus::Warning => "[warn]",
            MappingStatus::Error => "[err] ",
            MappingStatus::Skipped => "[skip]",
        };
        println!(
            "  {status} {}.{} -> {} ({}, level {})",
            mapping.source_registry,
            mapping.source_schema_name,
            mapping.full_target(),
            mapping.naming_strategy,
            mapping.dependency_level,
        );
    }
    println!();

    if !plan.collisions.is_empty() {
        println!("COLLISIONS");
        for collision in &plan.collisions {
            println!(
                "  {} <- {}",
                collision.target,
                collision.source_schemas.join(", ")
            );
        }
        println!();
    }

    if !plan.errors.is_empty() {
        println!("ERRORS");
        for issue in &plan.errors {
            println!("  {}: {}", issue.schema, issue.message);
        }
        println!();
    }
    if !plan.warnings.is_empty() {
        println!("WARNINGS");
        for issue in &plan.warnings {
            println!("  {}: {}", issue.schema, issue.message);
        }
        println!();
    }

    let s = &plan.summary;
    println!("SUMMARY");
    println!("  registries: {}", s.registries);
    println!("  schemas:    {}", s.schemas);
    println!("  versions:   {}", s.versions);
    println!("  references: {}", s.references);
    println!("  ready:      {}", s.ready);
    println!("  warnings:   {}", s.warnings);
    println!("  errors:     {}", s.errors);
    println!();
    println!("Run without --dry-run to execute the migration.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ConfigReport, ResultsReport, SchemaReport, SchemaRole, SourceReport, TargetReport,
    };
    use chrono::Utc;

    fn report() -> MigrationReport {
        MigrationReport {
            start_time: Utc::now(),
            end_time: Utc::now(),
            duration: "2s".into(),
            dry_run: true,
            source: SourceReport {
                kind: "aws_glue".into(),
                region: "us-east-1".into(),
                registries: vec!["reg".into()],
            },
            target: TargetReport {
                kind: "confluent_cloud".into(),
                url: "https://sr.example".into(),
            },
            config: ConfigReport::default(),
            results: ResultsReport {
                registries_processed: 1,
                schemas_processed: 2,
                versions_processed: 3,
                successful: 2,
                ..Default::default()
            },
            schemas: vec![SchemaReport {
                source_registry: "reg".into(),
                source_schema: "orders, with comma".into(),
                target_context: String::new(),
                target_subject: "orders-value".into(),
                detected_role: SchemaRole::Value,
                role_reason: String::new(),
                naming_strategy: "topic".into(),
                transformations: vec![],
                versions: 2,
                references: vec![],
                status: "ready".into(),
                error: String::new(),
                warning: String::new(),
            }],
            errors: vec![],
            warnings: vec![],
        }
    }

    #[test]
    fn test_json_roundtrips() {
        let rendered = render(&report(), ReportFormat::Json).unwrap();
        let parsed: MigrationReport = serde_json::from_str(&rendered).unwrap();
        assert!(parsed.dry_run);
        assert_eq!(parsed.schemas.len(), 1);
    }

    #[test]
    fn test_csv_escapes_commas() {
        let rendered = render(&report(), ReportFormat::Csv).unwrap();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("\"orders, with comma\""));
    }

    #[test]
    fn test_table_contains_mapping() {
        let rendered = render(&report(), ReportFormat::Table).unwrap();
        assert!(rendered.contains("reg.orders, with comma"));
        assert!(rendered.contains("orders-value"));
        assert!(rendered.contains("successful: 2"));
    }

    #[test]
    fn test_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        write_report(&report(), ReportFormat::Json, &path).unwrap();
        assert!(path.exists());
    }
}
