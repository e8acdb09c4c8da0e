//! Schema extraction from the source registry
//!
//! The source side is abstracted behind [`SourceRegistryApi`], six
//! operations mirroring the Glue Schema Registry surface; tests swap in an
//! in-memory implementation. [`GlueClient`] is the production adapter,
//! speaking the `X-Amz-Target` JSON protocol. [`Extractor`] drives the
//! fan-out: list schema names, then fetch metadata and every version in
//! parallel under the source-side rate bucket.

use crate::config::{AwsConfig, ConcurrencyConfig};
use crate::error::{MigrateError, MigrateResult};
use crate::models::{SchemaVersion, SourceRegistry, SourceSchema};
use crate::worker::RateLimiters;
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// The six source-registry operations the extractor depends on
///
/// Pagination is an implementation detail: list operations return complete
/// result sets.
#[async_trait]
pub trait SourceRegistryApi: Send + Sync {
    async fn list_registries(&self) -> MigrateResult<Vec<SourceRegistry>>;
    async fn get_registry(&self, name: &str) -> MigrateResult<SourceRegistry>;
    async fn list_schemas(&self, registry: &str) -> MigrateResult<Vec<String>>;
    /// Schema metadata only; `versions` is left empty
    async fn get_schema(&self, registry: &str, name: &str) -> MigrateResult<SourceSchema>;
    async fn list_schema_versions(&self, registry: &str, name: &str) -> MigrateResult<Vec<i64>>;
    async fn get_schema_version(
        &self,
        registry: &str,
        name: &str,
        version: i64,
    ) -> MigrateResult<SchemaVersion>;
}

/// Credentials resolved for the Glue endpoint
///
/// Request signing is delegated to the deployment environment (instance
/// roles, credential proxies, or a LocalStack-style endpoint override);
/// the resolved identity selects which chain applies.
#[allow(dead_code)]
struct AwsCredentials {
    access_key: String,
    secret_key: secrecy::SecretString,
    session_token: Option<secrecy::SecretString>,
}

/// AWS Glue Schema Registry client
///
/// Speaks the Glue `X-Amz-Target` JSON 1.1 protocol directly.
pub struct GlueClient {
    http: reqwest::Client,
    endpoint: String,
}

impl GlueClient {
    pub fn new(config: &AwsConfig) -> MigrateResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| MigrateError::Config(format!("failed to build HTTP client: {e}")))?;

        let endpoint = if config.endpoint_url.is_empty() {
            format!("https://glue.{}.amazonaws.com", config.region)
        } else {
            config.endpoint_url.trim_end_matches('/').to_string()
        };

        match resolve_credentials(config) {
            Some(c) => debug!(access_key = %c.access_key, "resolved AWS credentials"),
            None => debug!("no static AWS credentials, relying on the ambient chain"),
        }

        Ok(Self { http, endpoint })
    }

    async fn call(&self, target: &str, body: Value) -> MigrateResult<Value> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("X-Amz-Target", format!("AWSGlue.{target}"))
            .header("Content-Type", "application/x-amz-json-1.1")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let payload: Value = response.json().await.unwrap_or(Value::Null);

        if !status.is_success() {
            let error_type = payload
                .get("__type")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let message = payload
                .get("Message")
                .or_else(|| payload.get("message"))
                .and_then(Value::as_str)
                .unwrap_or_default();

            return Err(match status.as_u16() {
                401 | 403 => MigrateError::Auth(format!("{target}: {error_type} {message}")),
                429 => MigrateError::Throttled(format!("{target}: {message}")),
                s if error_type.contains("ThrottlingException") => {
                    MigrateError::Throttled(format!("{target} ({s}): {message}"))
                }
                s if s >= 500 => MigrateError::Throttled(format!("{target} ({s}): {message}")),
                s => MigrateError::Source(format!("{target} ({s}): {error_type} {message}")),
            });
        }

        Ok(payload)
    }

    /// Drain a paginated list call, merging the named array across pages
    async fn call_paged(
        &self,
        target: &str,
        base_body: Value,
        list_field: &str,
    ) -> MigrateResult<Vec<Value>> {
        let mut items = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let mut body = base_body.clone();
            if let Some(token) = &next_token {
                body["NextToken"] = json!(token);
            }

            let page = self.call(target, body).await?;
            if let Some(page_items) = page.get(list_field).and_then(Value::as_array) {
                items.extend(page_items.iter().cloned());
            }

            next_token = page
                .get("NextToken")
                .and_then(Value::as_str)
                .map(String::from);
            if next_token.is_none() {
                break;
            }
        }

        Ok(items)
    }
}

/// Static config keys win; otherwise the standard environment variables
fn resolve_credentials(config: &AwsConfig) -> Option<AwsCredentials> {
    if !config.access_key_id.is_empty() && !config.secret_access_key.is_empty() {
        return Some(AwsCredentials {
            access_key: config.access_key_id.clone(),
            secret_key: secrecy::SecretString::from(config.secret_access_key.clone()),
            session_token: None,
        });
    }

    let access_key = std::env::var("AWS_ACCESS_KEY_ID").ok()?;
    let secret_key = std::env::var("AWS_SECRET_ACCESS_KEY").ok()?;
    Some(AwsCredentials {
        access_key,
        secret_key: secrecy::SecretString::from(secret_key),
        session_token: std::env::var("AWS_SESSION_TOKEN")
            .ok()
            .map(secrecy::SecretString::from),
    })
}

fn str_field(value: &Value, field: &str) -> String {
    value
        .get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl SourceRegistryApi for GlueClient {
    async fn list_registries(&self) -> MigrateResult<Vec<SourceRegistry>> {
        let items = self
            .call_paged("ListRegistries", json!({}), "Registries")
            .await?;
        Ok(items
            .iter()
            .map(|r| SourceRegistry {
                name: str_field(r, "RegistryName"),
                arn: str_field(r, "RegistryArn"),
                description: str_field(r, "Description"),
                created_time: None,
                updated_time: None,
            })
            .collect())
    }

    async fn get_registry(&self, name: &str) -> MigrateResult<SourceRegistry> {
        let response = self
            .call(
                "GetRegistry",
                json!({"RegistryId": {"RegistryName": name}}),
            )
            .await?;
        Ok(SourceRegistry {
            name: str_field(&response, "RegistryName"),
            arn: str_field(&response, "RegistryArn"),
            description: str_field(&response, "Description"),
            created_time: None,
            updated_time: None,
        })
    }

    async fn list_schemas(&self, registry: &str) -> MigrateResult<Vec<String>> {
        let items = self
            .call_paged(
                "ListSchemas",
                json!({"RegistryId": {"RegistryName": registry}}),
                "Schemas",
            )
            .await?;
        Ok(items
            .iter()
            .map(|s| str_field(s, "SchemaName"))
            .filter(|n| !n.is_empty())
            .collect())
    }

    async fn get_schema(&self, registry: &str, name: &str) -> MigrateResult<SourceSchema> {
        let response = self
            .call(
                "GetSchema",
                json!({"SchemaId": {"RegistryName": registry, "SchemaName": name}}),
            )
            .await?;

        let data_format = str_field(&response, "DataFormat")
            .parse()
            .map_err(MigrateError::Parse)?;

        Ok(SourceSchema {
            name: str_field(&response, "SchemaName"),
            registry_name: registry.to_string(),
            arn: str_field(&response, "SchemaArn"),
            description: str_field(&response, "Description"),
            data_format,
            compatibility: str_field(&response, "Compatibility"),
            tags: Default::default(),
            latest_version: response
                .get("LatestSchemaVersion")
                .and_then(Value::as_i64)
                .unwrap_or_default(),
            versions: Vec::new(),
        })
    }

    async fn list_schema_versions(&self, registry: &str, name: &str) -> MigrateResult<Vec<i64>> {
        let items = self
            .call_paged(
                "ListSchemaVersions",
                json!({"SchemaId": {"RegistryName": registry, "SchemaName": name}}),
                "Schemas",
            )
            .await?;
        Ok(items
            .iter()
            .filter_map(|v| v.get("VersionNumber").and_then(Value::as_i64))
            .collect())
    }

    async fn get_schema_version(
        &self,
        registry: &str,
        name: &str,
        version: i64,
    ) -> MigrateResult<SchemaVersion> {
        let response = self
            .call(
                "GetSchemaVersion",
                json!({
                    "SchemaId": {"RegistryName": registry, "SchemaName": name},
                    "SchemaVersionNumber": {"VersionNumber": version},
                }),
            )
            .await?;

        Ok(SchemaVersion {
            version_number: version,
            version_id: str_field(&response, "SchemaVersionId"),
            definition: str_field(&response, "SchemaDefinition"),
            status: str_field(&response, "Status"),
            created_time: None,
        })
    }
}

/// Parallel, rate-limited schema extraction
pub struct Extractor {
    api: Arc<dyn SourceRegistryApi>,
    aws: AwsConfig,
    workers: usize,
    limiters: Arc<RateLimiters>,
}

impl Extractor {
    pub fn new(
        api: Arc<dyn SourceRegistryApi>,
        aws: AwsConfig,
        concurrency: &ConcurrencyConfig,
        limiters: Arc<RateLimiters>,
    ) -> Self {
        Self {
            api,
            aws,
            workers: concurrency.workers.max(1),
            limiters,
        }
    }

    /// Extract every schema from every selected registry
    pub async fn extract_all(
        &self,
        cancel: &CancellationToken,
    ) -> MigrateResult<Vec<SourceSchema>> {
        let registries = self.list_registries(cancel).await?;

        let mut all = Vec::new();
        for registry in &registries {
            let schemas = self.extract_registry(&registry.name, cancel).await?;
            all.extend(schemas);
        }
        Ok(all)
    }

    /// Registries to migrate: all minus exclusions, or each named registry
    pub async fn list_registries(
        &self,
        cancel: &CancellationToken,
    ) -> MigrateResult<Vec<SourceRegistry>> {
        if self.aws.registry_all {
            self.limiters.source.acquire(cancel).await?;
            let registries = self.api.list_registries().await?;
            let kept: Vec<SourceRegistry> = registries
                .into_iter()
                .filter(|r| !self.is_excluded(&r.name))
                .collect();
            info!(registries = kept.len(), "listed source registries");
            return Ok(kept);
        }

        let mut registries = Vec::with_capacity(self.aws.registry_names.len());
        for name in &self.aws.registry_names {
            self.limiters.source.acquire(cancel).await?;
            let registry = self
                .api
                .get_registry(name)
                .await
                .map_err(|e| e.for_schema(name.clone()))?;
            registries.push(registry);
        }
        Ok(registries)
    }

    /// List schema names in a registry (respecting the filter), then fan
    /// out to fetch each schema with all versions
    pub async fn extract_registry(
        &self,
        registry: &str,
        cancel: &CancellationToken,
    ) -> MigrateResult<Vec<SourceSchema>> {
        self.limiters.source.acquire(cancel).await?;
        let mut names = self.api.list_schemas(registry).await?;

        if !self.aws.schema_filter.is_empty() {
            let filter = self.aws.schema_filter.clone();
            names.retain(|n| wildcard_match(&filter, n));
        }

        debug!(registry, schemas = names.len(), "fetching schemas");

        let schemas: Vec<SourceSchema> = stream::iter(names.into_iter())
            .map(|name| async move {
                self.fetch_schema(registry, &name, cancel)
                    .await
                    .map_err(|e| e.for_schema(format!("{registry}:{name}")))
            })
            .buffer_unordered(self.workers)
            .try_collect()
            .await?;

        Ok(schemas)
    }

    /// Fetch one schema: metadata, version listing, then all version bodies
    /// in parallel, sorted ascending by version number
    pub async fn fetch_schema(
        &self,
        registry: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> MigrateResult<SourceSchema> {
        self.limiters.source.acquire(cancel).await?;
        let mut schema = self.api.get_schema(registry, name).await?;

        self.limiters.source.acquire(cancel).await?;
        let version_numbers = self.api.list_schema_versions(registry, name).await?;

        let mut versions: Vec<SchemaVersion> = stream::iter(version_numbers.into_iter())
            .map(|number| async move {
                self.limiters.source.acquire(cancel).await?;
                self.api.get_schema_version(registry, name, number).await
            })
            .buffer_unordered(self.workers)
            .try_collect()
            .await?;

        versions.sort_by_key(|v| v.version_number);
        versions.dedup_by_key(|v| v.version_number);
        schema.versions = versions;

        Ok(schema)
    }

    fn is_excluded(&self, name: &str) -> bool {
        self.aws
            .registry_exclude
            .iter()
            .any(|pattern| wildcard_match(pattern, name))
    }
}

/// `*`-wildcard matching, the subset of glob syntax the filters use
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }
    if !pattern.contains('*') {
        return pattern == name;
    }

    let segments: Vec<&str> = pattern.split('*').collect();
    let mut remainder = name;

    // First segment must anchor at the start, last at the end
    if let Some(first) = segments.first() {
        if !first.is_empty() {
            match remainder.strip_prefix(first) {
                Some(rest) => remainder = rest,
                None => return false,
            }
        }
    }
    if let Some(last) = segments.last() {
        if segments.len() > 1 && !last.is_empty() {
            match remainder.strip_suffix(last) {
                Some(rest) => remainder = rest,
                None => return false,
            }
        }
    }

    for segment in &segments[1..segments.len().saturating_sub(1)] {
        if segment.is_empty() {
            continue;
        }
        match remainder.find(segment) {
            Some(pos) => remainder = &remainder[pos + segment.len()..],
            None => return false,
        }
    }

    true
}
