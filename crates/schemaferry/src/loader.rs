//! Confluent Cloud Schema Registry loader
//!
//! Registers schema versions against the target under the target-side rate
//! bucket. Subjects that carry a context are rendered as
//! `.context:subject` and path-escaped as a whole; colons survive the
//! escape. Reference rewriting consults the mapping table computed during
//! planning, so a reference lands on whatever subject its schema was
//! actually mapped to.

use crate::config::{ConfluentCloudConfig, ReferenceStrategy};
use crate::error::{MigrateError, MigrateResult};
use crate::models::{SchemaMapping, SchemaVersion, SubjectMetadata};
use crate::worker::RateLimiters;
use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const CONTENT_TYPE: &str = "application/vnd.schemaregistry.v1+json";

/// Where a planned schema will land at the target
#[derive(Debug, Clone)]
pub struct TargetRef {
    pub context: String,
    pub subject: String,
}

impl TargetRef {
    fn full(&self) -> String {
        if self.context.is_empty() {
            self.subject.clone()
        } else {
            format!("{}:{}", self.context, self.subject)
        }
    }
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    schema: &'a str,
    #[serde(rename = "schemaType", skip_serializing_if = "Option::is_none")]
    schema_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    references: Vec<ReferenceRequest>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ReferenceRequest {
    name: String,
    subject: String,
    version: u32,
}

/// Confluent Cloud Schema Registry client
pub struct ConfluentLoader {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    api_secret: SecretString,
    reference_strategy: ReferenceStrategy,
    limiters: Arc<RateLimiters>,
    /// resolved key → planned target, installed before execution
    reference_targets: RwLock<HashMap<String, TargetRef>>,
}

impl ConfluentLoader {
    pub fn new(
        config: &ConfluentCloudConfig,
        reference_strategy: ReferenceStrategy,
        limiters: Arc<RateLimiters>,
    ) -> MigrateResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| MigrateError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            api_secret: SecretString::from(config.api_secret.clone()),
            reference_strategy,
            limiters,
            reference_targets: RwLock::new(HashMap::new()),
        })
    }

    /// Install the resolved-key → target table used for reference rewriting
    pub fn set_reference_targets(&self, targets: HashMap<String, TargetRef>) {
        *self.reference_targets.write() = targets;
    }

    /// Register one schema version under the mapping's subject
    pub async fn register(
        &self,
        mapping: &SchemaMapping,
        version: &SchemaVersion,
        schema_type: &str,
        cancel: &CancellationToken,
    ) -> MigrateResult<()> {
        self.limiters.target.acquire(cancel).await?;

        let references = if self.reference_strategy == ReferenceStrategy::Rewrite {
            self.build_references(mapping)?
        } else {
            Vec::new()
        };

        let wire_subject = mapping.full_target();
        let url = format!(
            "{}/subjects/{}/versions",
            self.base_url,
            encode_subject(&wire_subject)
        );

        let request = RegisterRequest {
            schema: &version.definition,
            schema_type: Some(schema_type),
            references,
        };

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.api_key, Some(self.api_secret.expose_secret()))
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(target_error(status.as_u16(), &wire_subject, &body));
        }

        debug!(
            subject = %wire_subject,
            version = version.version_number,
            "registered schema version"
        );
        Ok(())
    }

    /// Map source references to target `{name, subject, version}` triples
    /// via the planned mapping table
    fn build_references(&self, mapping: &SchemaMapping) -> MigrateResult<Vec<ReferenceRequest>> {
        if mapping.references.is_empty() {
            return Ok(Vec::new());
        }

        let targets = self.reference_targets.read();
        let mut references = Vec::with_capacity(mapping.references.len());

        for key in &mapping.references {
            let target = targets.get(key).ok_or_else(|| {
                MigrateError::Reference(format!(
                    "referenced schema {key} has no planned target subject"
                ))
            })?;

            let name = key.split_once(':').map(|(_, n)| n).unwrap_or(key);
            references.push(ReferenceRequest {
                name: name.to_string(),
                subject: target.full(),
                version: 1,
            });
        }

        Ok(references)
    }

    /// Set the compatibility level for a subject
    pub async fn set_compatibility(
        &self,
        subject: &str,
        level: &str,
        cancel: &CancellationToken,
    ) -> MigrateResult<()> {
        self.limiters.target.acquire(cancel).await?;

        let url = format!("{}/config/{}", self.base_url, encode_subject(subject));
        let response = self
            .http
            .put(&url)
            .basic_auth(&self.api_key, Some(self.api_secret.expose_secret()))
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .json(&serde_json::json!({"compatibility": level}))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(target_error(status.as_u16(), subject, &body));
        }
        Ok(())
    }

    /// List all subjects at the target
    pub async fn get_subjects(&self, cancel: &CancellationToken) -> MigrateResult<Vec<String>> {
        self.limiters.target.acquire(cancel).await?;

        let url = format!("{}/subjects", self.base_url);
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.api_key, Some(self.api_secret.expose_secret()))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(target_error(status.as_u16(), "subjects", &body));
        }

        Ok(response.json().await?)
    }

    /// Whether a subject already has registered versions
    pub async fn subject_exists(
        &self,
        subject: &str,
        cancel: &CancellationToken,
    ) -> MigrateResult<bool> {
        self.limiters.target.acquire(cancel).await?;

        let url = format!(
            "{}/subjects/{}/versions",
            self.base_url,
            encode_subject(subject)
        );
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.api_key, Some(self.api_secret.expose_secret()))
            .send()
            .await?;

        Ok(response.status().is_success())
    }

    /// Attach metadata to a subject; tolerated as absent on older targets
    pub async fn set_metadata(
        &self,
        subject: &str,
        metadata: &SubjectMetadata,
        cancel: &CancellationToken,
    ) -> MigrateResult<()> {
        self.limiters.target.acquire(cancel).await?;

        let url = format!(
            "{}/subjects/{}/metadata",
            self.base_url,
            encode_subject(subject)
        );
        let response = self
            .http
            .put(&url)
            .basic_auth(&self.api_key, Some(self.api_secret.expose_secret()))
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .json(metadata)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() && status.as_u16() != 404 {
            let body = response.text().await.unwrap_or_default();
            return Err(target_error(status.as_u16(), subject, &body));
        }

        if status.as_u16() == 404 {
            info!(subject, "metadata endpoint not available on target, skipping");
        }
        Ok(())
    }
}

/// Path-escape a wire subject; the context separator colon stays literal
fn encode_subject(subject: &str) -> String {
    urlencoding::encode(subject).replace("%3A", ":")
}

fn target_error(status: u16, subject: &str, body: &str) -> MigrateError {
    match status {
        401 | 403 => MigrateError::Auth(format!("target rejected credentials for {subject}")),
        s => MigrateError::Target {
            status: s,
            message: format!("{subject}: {body}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MappingStatus, SchemaRole};

    fn loader() -> ConfluentLoader {
        ConfluentLoader::new(
            &ConfluentCloudConfig {
                url: "http://localhost:8081".into(),
                api_key: "key".into(),
                api_secret: "secret".into(),
            },
            ReferenceStrategy::Rewrite,
            Arc::new(RateLimiters::new(0, 0, 0)),
        )
        .unwrap()
    }

    fn mapping_with_refs(references: Vec<String>) -> SchemaMapping {
        SchemaMapping {
            source_registry: "reg".into(),
            source_schema_name: "orders".into(),
            source_versions: 1,
            target_context: String::new(),
            target_subject: "orders-value".into(),
            detected_role: SchemaRole::Value,
            naming_strategy: "topic".into(),
            naming_reason: String::new(),
            transformations: vec![],
            references,
            dependency_level: 1,
            status: MappingStatus::Ready,
            warning: String::new(),
            error: String::new(),
        }
    }

    #[test]
    fn test_references_resolved_from_mapping_table() {
        let l = loader();
        l.set_reference_targets(HashMap::from([(
            "reg:Address".to_string(),
            TargetRef {
                context: ".shipping".into(),
                subject: "address-key".into(),
            },
        )]));

        let refs = l
            .build_references(&mapping_with_refs(vec!["reg:Address".into()]))
            .unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].name, "Address");
        // consults the table: role and context come from the actual plan
        assert_eq!(refs[0].subject, ".shipping:address-key");
        assert_eq!(refs[0].version, 1);
    }

    #[test]
    fn test_unknown_reference_is_error() {
        let l = loader();
        let err = l
            .build_references(&mapping_with_refs(vec!["reg:Mystery".into()]))
            .unwrap_err();
        assert!(matches!(err, MigrateError::Reference(_)));
        assert!(err.to_string().contains("reg:Mystery"));
    }

    #[test]
    fn test_no_references_is_empty() {
        let l = loader();
        assert!(l.build_references(&mapping_with_refs(vec![])).unwrap().is_empty());
    }

    #[test]
    fn test_wire_subject_includes_context() {
        let mut mapping = mapping_with_refs(vec![]);
        mapping.target_context = ".payments".into();
        assert_eq!(mapping.full_target(), ".payments:orders-value");
        // the context separator survives path-escaping literally
        assert_eq!(
            encode_subject(".payments:orders-value"),
            ".payments:orders-value"
        );
        assert_eq!(encode_subject("has space:x"), "has%20space:x");
    }

    #[test]
    fn test_target_error_classification() {
        assert!(matches!(target_error(401, "s", ""), MigrateError::Auth(_)));
        assert!(matches!(
            target_error(422, "s", "bad schema"),
            MigrateError::Target { status: 422, .. }
        ));
        assert!(target_error(503, "s", "").is_retryable());
        assert!(!target_error(409, "s", "").is_retryable());
    }
}
