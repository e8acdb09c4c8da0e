//! Migration orchestrator
//!
//! Drives the pipeline: extract → dependency graph → naming → collision
//! resolution → validation, then either emits the plan (dry-run) or
//! registers schemas level by level with checkpointed resume. State is
//! mutated only here, from results returned by workers.

use crate::config::{Config, SubjectStrategy, VersionStrategy};
use crate::error::{MigrateError, MigrateResult};
use crate::extractor::{Extractor, GlueClient, SourceRegistryApi};
use crate::graph::{DependencyGraph, Level};
use crate::keyvalue::Detector;
use crate::loader::{ConfluentLoader, TargetRef};
use crate::mapper::NameMapper;
use crate::models::{
    CompletedSchema, ConfigReport, DependencyLevel, FailedSchema, MappingStatus, MigrationPlan,
    MigrationReport, MigrationState, MigrationSummary, ResultsReport, SchemaMapping, SchemaReport,
    SourceReport, SourceSchema, TargetReport,
};
use crate::namer::Namer;
use crate::normalizer::{self, Normalizer};
use crate::report;
use crate::validator::Validator;
use crate::worker::{CheckpointStore, Pool, ProgressFn, RateLimiters};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Aggregate result of one run
#[derive(Debug)]
pub struct MigrationOutcome {
    pub registries: usize,
    pub schemas: usize,
    pub versions: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub llm_calls: usize,
    pub llm_cost: f64,
    pub report: MigrationReport,
}

/// The orchestrator
pub struct Migrator {
    config: Arc<Config>,
    extractor: Extractor,
    loader: ConfluentLoader,
    mapper: NameMapper,
    validator: Validator,
    pool: Pool,
    checkpoint: Option<CheckpointStore>,
    namer: Option<Arc<Namer>>,
    cancel: CancellationToken,
}

impl Migrator {
    /// Production constructor: Glue-backed source
    pub fn new(config: Config, cancel: CancellationToken) -> MigrateResult<Self> {
        let api = Arc::new(GlueClient::new(&config.aws)?);
        Self::with_source_api(config, api, cancel)
    }

    /// Test seam: any source-registry implementation
    pub fn with_source_api(
        config: Config,
        api: Arc<dyn SourceRegistryApi>,
        cancel: CancellationToken,
    ) -> MigrateResult<Self> {
        let config = Arc::new(config);
        let limiters = Arc::new(RateLimiters::new(
            config.concurrency.aws_rate_limit,
            config.concurrency.cc_rate_limit,
            config.concurrency.llm_rate_limit,
        ));

        let namer = if config.naming.subject_strategy == SubjectStrategy::Llm {
            Some(Arc::new(Namer::new(&config.llm, limiters.clone())?))
        } else {
            None
        };

        let extractor = Extractor::new(
            api,
            config.aws.clone(),
            &config.concurrency,
            limiters.clone(),
        );
        let loader = ConfluentLoader::new(
            &config.confluent_cloud,
            config.migration.reference_strategy,
            limiters.clone(),
        )?;

        let detector = Detector::new(&config.key_value)?;
        let norm = Normalizer::new(config.normalization.clone());
        let mapper = NameMapper::new(config.clone(), norm, detector, namer.clone())?;
        let validator = Validator::new(config.migration.reference_strategy);
        let pool = Pool::new(&config.concurrency);
        let checkpoint = if config.checkpoint.file.is_empty() {
            None
        } else {
            Some(CheckpointStore::new(&config.checkpoint.file))
        };

        Ok(Self {
            config,
            extractor,
            loader,
            mapper,
            validator,
            pool,
            checkpoint,
            namer,
            cancel,
        })
    }

    /// Execute the full pipeline
    pub async fn run(&self) -> MigrateResult<MigrationOutcome> {
        let start_time = Utc::now();

        // 1. Extract
        info!("extracting schemas from source registries");
        let schemas = self.extractor.extract_all(&self.cancel).await?;
        let total_versions: usize = schemas.iter().map(|s| s.versions.len()).sum();
        info!(
            schemas = schemas.len(),
            versions = total_versions,
            "extraction complete"
        );

        // 2. Dependency graph; cycles abort here
        let graph = DependencyGraph::build(&schemas)?;
        let mut levels = graph.levels().to_vec();

        // 3. Naming (concurrent)
        info!("deriving target subjects");
        let mut mappings = self.mapper.map_all(&schemas, &self.cancel).await?;

        // 4. Reconcile: naming fields into the level skeletons, graph
        //    fields into the full mappings
        reconcile(&mut levels, &mut mappings);

        // 5. Collision resolution, then reconcile again
        if self.config.normalization.collision_check
            && self.config.normalization.collision_resolution
                != crate::config::CollisionStrategy::Fail
        {
            let collisions = normalizer::detect_collisions(&mappings);
            if !collisions.is_empty() {
                info!(
                    collisions = collisions.len(),
                    strategy = %self.config.normalization.collision_resolution,
                    "resolving naming collisions"
                );
                normalizer::resolve_collisions(
                    &mut mappings,
                    self.config.normalization.collision_resolution,
                );
                reconcile(&mut levels, &mut mappings);
            }
        }

        // 6. Validate
        let validation = self.validator.validate_all(&mappings);
        if validation.has_errors() && !self.config.output.dry_run {
            for issue in &validation.errors {
                error!(schema = %issue.schema, "{}", issue.message);
            }
            return Err(MigrateError::Validation(format!(
                "{} validation errors",
                validation.errors.len()
            )));
        }

        let plan = self.build_plan(&schemas, &mappings, &levels, validation);

        // 7. Dry-run: report and stop
        if self.config.output.dry_run {
            report::print_dry_run(&plan);
            let outcome = self.finish(plan, start_time, true, 0, 0, 0);
            return Ok(outcome);
        }

        // 8. Execute level by level
        let outcome = self.execute(&plan, levels, &mappings, start_time).await?;
        Ok(outcome)
    }

    async fn execute(
        &self,
        plan: &MigrationPlan,
        levels: Vec<Level>,
        mappings: &[SchemaMapping],
        start_time: chrono::DateTime<Utc>,
    ) -> MigrateResult<MigrationOutcome> {
        // Reference rewriting consults the full mapping table
        let targets: HashMap<String, TargetRef> = mappings
            .iter()
            .filter(|m| m.status != MappingStatus::Skipped)
            .map(|m| {
                (
                    m.key(),
                    TargetRef {
                        context: m.target_context.clone(),
                        subject: m.target_subject.clone(),
                    },
                )
            })
            .collect();
        self.loader.set_reference_targets(targets);

        let config_hash = self.config.hash();
        let mut state = self.load_or_create_state(&config_hash);
        state.config_hash = config_hash;
        state.total_schemas = mappings.len();
        state.migration_order = levels
            .iter()
            .flat_map(|l| l.schemas.iter().map(SchemaMapping::key))
            .collect();
        state.skipped_count = mappings
            .iter()
            .filter(|m| matches!(m.status, MappingStatus::Error | MappingStatus::Skipped))
            .count();

        let mut successful = 0usize;
        let mut failed = 0usize;
        let mut skipped = 0usize;

        for level in &levels {
            if self.cancel.is_cancelled() {
                self.save_checkpoint(&state);
                return Err(MigrateError::Cancelled);
            }

            // Filter out schemas already done or not eligible
            let mut to_migrate = Vec::new();
            for mapping in &level.schemas {
                let key = mapping.key();
                if state.completed_schemas.contains_key(&key) {
                    skipped += 1;
                    continue;
                }
                if matches!(mapping.status, MappingStatus::Error | MappingStatus::Skipped) {
                    skipped += 1;
                    continue;
                }
                to_migrate.push(mapping.clone());
            }

            info!(
                level = level.level,
                schemas = to_migrate.len(),
                "processing dependency level"
            );
            if to_migrate.is_empty() {
                continue;
            }

            let done = Arc::new(AtomicUsize::new(0));
            let total = to_migrate.len();
            let progress: ProgressFn = {
                let done = done.clone();
                let level = level.level;
                Arc::new(move || {
                    let n = done.fetch_add(1, Ordering::SeqCst) + 1;
                    tracing::debug!(level, "registered {n}/{total} schemas");
                })
            };

            let extractor = &self.extractor;
            let loader = &self.loader;
            let cancel = &self.cancel;
            let version_strategy = self.config.migration.version_strategy;

            let results = self
                .pool
                .execute(
                    &self.cancel,
                    to_migrate.clone(),
                    move |mapping: SchemaMapping| async move {
                        migrate_schema(extractor, loader, cancel, version_strategy, mapping).await
                    },
                    Some(progress),
                )
                .await;

            // Single writer: fold worker results into the state here
            let mut cancelled = false;
            for (mapping, result) in to_migrate.iter().zip(results) {
                let key = mapping.key();
                match result {
                    None => {
                        state.failed_schemas.remove(&key);
                        state.completed_schemas.insert(
                            key,
                            CompletedSchema {
                                source_registry: mapping.source_registry.clone(),
                                source_schema: mapping.source_schema_name.clone(),
                                target_subject: mapping.target_subject.clone(),
                                versions: match version_strategy {
                                    VersionStrategy::All => mapping.source_versions,
                                    VersionStrategy::Latest => mapping.source_versions.min(1),
                                },
                                completed_at: Utc::now(),
                            },
                        );
                        successful += 1;
                    }
                    Some(e) if e.is_cancelled() => {
                        cancelled = true;
                    }
                    Some(e) => {
                        error!(schema = %key, error = %e, "schema migration failed");
                        state.failed_schemas.insert(
                            key,
                            FailedSchema {
                                source_registry: mapping.source_registry.clone(),
                                source_schema: mapping.source_schema_name.clone(),
                                error: e.to_string(),
                                attempts: self.pool.retry_attempts() + 1,
                                last_attempt: Utc::now(),
                            },
                        );
                        failed += 1;
                    }
                }
            }

            state.completed_count = state.completed_schemas.len();
            state.failed_count = state.failed_schemas.len();
            self.save_checkpoint(&state);

            if cancelled {
                return Err(MigrateError::Cancelled);
            }
        }

        info!(successful, failed, skipped, "migration complete");
        Ok(self.finish(plan.clone(), start_time, false, successful, failed, skipped))
    }

    fn load_or_create_state(&self, config_hash: &str) -> MigrationState {
        if let (Some(store), true) = (&self.checkpoint, self.config.checkpoint.resume) {
            match store.load() {
                Ok(Some(state)) => {
                    if state.config_hash != config_hash {
                        warn!("checkpoint was written with a different configuration");
                    }
                    info!(
                        completed = state.completed_count,
                        total = state.total_schemas,
                        "resuming from checkpoint"
                    );
                    return state;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "could not load checkpoint, starting fresh");
                }
            }
        }
        MigrationState::new(config_hash)
    }

    fn save_checkpoint(&self, state: &MigrationState) {
        if let Some(store) = &self.checkpoint {
            if let Err(e) = store.save(state) {
                warn!(error = %e, "failed to save checkpoint");
            }
        }
    }

    fn build_plan(
        &self,
        schemas: &[SourceSchema],
        mappings: &[SchemaMapping],
        levels: &[Level],
        validation: crate::validator::ValidationOutcome,
    ) -> MigrationPlan {
        let mut registries: Vec<String> = schemas
            .iter()
            .map(|s| s.registry_name.clone())
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        registries.sort();

        let total_versions = schemas.iter().map(|s| s.versions.len()).sum();
        let total_references = mappings.iter().map(|m| m.references.len()).sum();
        let collisions = normalizer::detect_collisions(mappings);

        let mut summary = MigrationSummary {
            registries: registries.len(),
            schemas: schemas.len(),
            versions: total_versions,
            references: total_references,
            collisions: collisions.len(),
            ..Default::default()
        };
        for mapping in mappings {
            match mapping.status {
                MappingStatus::Ready => summary.ready += 1,
                MappingStatus::Warning => summary.warnings += 1,
                MappingStatus::Error => summary.errors += 1,
                MappingStatus::Skipped => summary.skipped += 1,
            }
        }
        if let Some(namer) = &self.namer {
            summary.llm_calls = namer.call_count();
            summary.estimated_llm_cost = namer.total_cost();
        }

        MigrationPlan {
            source_registries: registries,
            total_schemas: schemas.len(),
            total_versions,
            total_references,
            mappings: mappings.to_vec(),
            levels: levels
                .iter()
                .map(|l| DependencyLevel {
                    level: l.level,
                    schemas: l.schemas.clone(),
                })
                .collect(),
            collisions,
            warnings: validation.warnings,
            errors: validation.errors,
            summary,
        }
    }

    fn finish(
        &self,
        plan: MigrationPlan,
        start_time: chrono::DateTime<Utc>,
        dry_run: bool,
        successful: usize,
        failed: usize,
        skipped: usize,
    ) -> MigrationOutcome {
        let end_time = Utc::now();
        let duration = end_time - start_time;

        // Mapping may have made fresh LLM calls in either branch
        if let Some(namer) = &self.namer {
            namer.persist();
        }

        let (llm_calls, llm_cost) = match &self.namer {
            Some(namer) => (namer.call_count(), namer.total_cost()),
            None => (0, 0.0),
        };

        let successful = if dry_run { plan.summary.ready } else { successful };

        let report = MigrationReport {
            start_time,
            end_time,
            duration: format!("{}s", duration.num_seconds()),
            dry_run,
            source: SourceReport {
                kind: "aws_glue".to_string(),
                region: self.config.aws.region.clone(),
                registries: plan.source_registries.clone(),
            },
            target: TargetReport {
                kind: "confluent_cloud".to_string(),
                url: self.config.confluent_cloud.url.clone(),
            },
            config: ConfigReport {
                subject_strategy: format!("{:?}", self.config.naming.subject_strategy)
                    .to_lowercase(),
                context_mapping: format!("{:?}", self.config.naming.context_mapping)
                    .to_lowercase(),
                version_strategy: format!("{:?}", self.config.migration.version_strategy)
                    .to_lowercase(),
                reference_strategy: format!("{:?}", self.config.migration.reference_strategy)
                    .to_lowercase(),
                normalize_dots: format!("{:?}", self.config.normalization.normalize_dots)
                    .to_lowercase(),
                normalize_case: format!("{:?}", self.config.normalization.normalize_case)
                    .to_lowercase(),
                llm_provider: if self.namer.is_some() {
                    self.config.llm.provider.to_string()
                } else {
                    String::new()
                },
                llm_model: if self.namer.is_some() {
                    self.config.llm.model.clone()
                } else {
                    String::new()
                },
            },
            results: ResultsReport {
                registries_processed: plan.summary.registries,
                schemas_processed: plan.summary.schemas,
                versions_processed: plan.summary.versions,
                successful,
                failed,
                skipped,
                llm_calls,
                llm_cost,
            },
            schemas: plan
                .mappings
                .iter()
                .map(|m| SchemaReport {
                    source_registry: m.source_registry.clone(),
                    source_schema: m.source_schema_name.clone(),
                    target_context: m.target_context.clone(),
                    target_subject: m.target_subject.clone(),
                    detected_role: m.detected_role,
                    role_reason: m.naming_reason.clone(),
                    naming_strategy: m.naming_strategy.clone(),
                    transformations: m.transformations.clone(),
                    versions: m.source_versions,
                    references: m.references.clone(),
                    status: format!("{:?}", m.status).to_lowercase(),
                    error: m.error.clone(),
                    warning: m.warning.clone(),
                })
                .collect(),
            errors: plan
                .errors
                .iter()
                .map(|i| crate::models::report::ReportIssue {
                    schema: i.schema.clone(),
                    message: i.message.clone(),
                })
                .collect(),
            warnings: plan
                .warnings
                .iter()
                .map(|i| crate::models::report::ReportIssue {
                    schema: i.schema.clone(),
                    message: i.message.clone(),
                })
                .collect(),
        };

        if !self.config.output.report_file.is_empty() {
            if let Err(e) = report::write_report(
                &report,
                self.config.output.format,
                &self.config.output.report_file,
            ) {
                warn!(error = %e, "failed to write report file");
            }
        }

        MigrationOutcome {
            registries: plan.summary.registries,
            schemas: plan.summary.schemas,
            versions: plan.summary.versions,
            successful,
            failed,
            skipped,
            llm_calls,
            llm_cost,
            report,
        }
    }
}

/// Migrate one schema: re-fetch it in full, then register each selected
/// version sequentially in ascending order
async fn migrate_schema(
    extractor: &Extractor,
    loader: &ConfluentLoader,
    cancel: &CancellationToken,
    version_strategy: VersionStrategy,
    mapping: SchemaMapping,
) -> MigrateResult<()> {
    let key = mapping.key();

    let schema = extractor
        .fetch_schema(&mapping.source_registry, &mapping.source_schema_name, cancel)
        .await
        .map_err(|e| e.for_schema(key.clone()))?;

    let versions: Vec<_> = match version_strategy {
        VersionStrategy::All => schema.versions.iter().collect(),
        VersionStrategy::Latest => schema.versions.last().into_iter().collect(),
    };

    for version in versions {
        loader
            .register(&mapping, version, schema.data_format.as_str(), cancel)
            .await
            .map_err(|e| e.for_schema(key.clone()))?;
    }

    Ok(())
}

/// Copy naming fields into the graph's level skeletons and graph fields
/// into the fully-named mappings, keyed by `registry:schema`
fn reconcile(levels: &mut [Level], mappings: &mut [SchemaMapping]) {
    let named: HashMap<String, SchemaMapping> =
        mappings.iter().map(|m| (m.key(), m.clone())).collect();

    let mut placement: HashMap<String, (Vec<String>, usize)> = HashMap::new();
    for level in levels.iter() {
        for skeleton in &level.schemas {
            placement.insert(
                skeleton.key(),
                (skeleton.references.clone(), skeleton.dependency_level),
            );
        }
    }

    for level in levels.iter_mut() {
        for skeleton in level.schemas.iter_mut() {
            if let Some(full) = named.get(&skeleton.key()) {
                skeleton.target_context = full.target_context.clone();
                skeleton.target_subject = full.target_subject.clone();
                skeleton.detected_role = full.detected_role;
                skeleton.naming_strategy = full.naming_strategy.clone();
                skeleton.naming_reason = full.naming_reason.clone();
                skeleton.transformations = full.transformations.clone();
                skeleton.status = full.status;
                skeleton.warning = full.warning.clone();
                skeleton.error = full.error.clone();
            }
        }
    }

    for mapping in mappings.iter_mut() {
        if let Some((references, level)) = placement.get(&mapping.key()) {
            mapping.references = references.clone();
            mapping.dependency_level = *level;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SchemaRole;

    fn skeleton(name: &str, level: usize, references: Vec<String>) -> SchemaMapping {
        SchemaMapping::skeleton("reg", name, 1, references, level)
    }

    #[test]
    fn test_reconcile_copies_both_ways() {
        let mut levels = vec![
            Level {
                level: 0,
                schemas: vec![skeleton("base", 0, vec![])],
            },
            Level {
                level: 1,
                schemas: vec![skeleton("child", 1, vec!["reg:base".into()])],
            },
        ];

        let mut named_base = skeleton("base", 0, vec![]);
        named_base.target_subject = "base-value".into();
        named_base.naming_strategy = "topic".into();
        named_base.detected_role = SchemaRole::Value;
        let mut named_child = skeleton("child", 0, vec![]);
        named_child.target_subject = "child-key".into();
        named_child.detected_role = SchemaRole::Key;

        let mut mappings = vec![named_base, named_child];
        reconcile(&mut levels, &mut mappings);

        // levels gained naming fields
        assert_eq!(levels[0].schemas[0].target_subject, "base-value");
        assert_eq!(levels[1].schemas[0].target_subject, "child-key");
        assert_eq!(levels[1].schemas[0].detected_role, SchemaRole::Key);
        // mappings gained graph placement
        assert_eq!(mappings[1].dependency_level, 1);
        assert_eq!(mappings[1].references, vec!["reg:base".to_string()]);
    }
}
