//! Plan validation
//!
//! Enforces target subject/context syntax, surfaces advisory warnings about
//! suspicious source names, and re-detects collisions after resolution. Any
//! collision that survives resolution is fatal.

use crate::config::ReferenceStrategy;
use crate::models::{MappingStatus, PlanIssue, SchemaMapping};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Maximum subject length accepted by the target
const MAX_SUBJECT_LEN: usize = 255;

static SUBJECT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("subject pattern"));

static CONTEXT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("context pattern"));

/// AWS-flavored prefixes worth flagging before they reach the target
const AWS_PREFIXES: &[&str] = &["MSK_", "Glue_", "AWS_"];

/// Version tokens that usually should not survive a migration
const VERSION_TOKENS: &[&str] = &["_v1", "_v2", "-v1", "-v2", "_V1", "_V2"];

/// Validation outcome: fatal errors and advisory warnings
#[derive(Debug, Default)]
pub struct ValidationOutcome {
    pub errors: Vec<PlanIssue>,
    pub warnings: Vec<PlanIssue>,
}

impl ValidationOutcome {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Mapping validator
pub struct Validator {
    reference_strategy: ReferenceStrategy,
}

impl Validator {
    pub fn new(reference_strategy: ReferenceStrategy) -> Self {
        Self { reference_strategy }
    }

    /// Validate every mapping and re-check collisions globally
    pub fn validate_all(&self, mappings: &[SchemaMapping]) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::default();
        let mut by_target: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for mapping in mappings {
            if mapping.status == MappingStatus::Skipped {
                continue;
            }

            self.validate_mapping(mapping, &mut outcome);
            by_target
                .entry(mapping.full_target())
                .or_default()
                .push(format!(
                    "{}.{}",
                    mapping.source_registry, mapping.source_schema_name
                ));
        }

        // Post-resolution collisions are fatal
        for (target, sources) in by_target {
            if sources.len() > 1 {
                outcome.errors.push(PlanIssue {
                    schema: sources.join(", "),
                    message: format!("naming collision: multiple schemas map to {target}"),
                });
            }
        }

        outcome
    }

    /// Validate one mapping's target syntax and collect warnings
    pub fn validate_mapping(&self, mapping: &SchemaMapping, outcome: &mut ValidationOutcome) {
        let source = format!("{}.{}", mapping.source_registry, mapping.source_schema_name);

        if let Err(message) = validate_subject(&mapping.target_subject) {
            outcome.errors.push(PlanIssue {
                schema: source.clone(),
                message,
            });
        }

        if let Err(message) = validate_context(&mapping.target_context) {
            outcome.errors.push(PlanIssue {
                schema: source.clone(),
                message,
            });
        }

        self.collect_warnings(mapping, &source, outcome);
    }

    fn collect_warnings(
        &self,
        mapping: &SchemaMapping,
        source: &str,
        outcome: &mut ValidationOutcome,
    ) {
        // Name drifted beyond mechanical separator/case/suffix changes
        let comparable_source = mapping
            .source_schema_name
            .replace('_', "-")
            .to_lowercase();
        let comparable_target = {
            let lower = mapping.target_subject.to_lowercase();
            let lower = lower.strip_suffix("-key").unwrap_or(&lower).to_string();
            lower.strip_suffix("-value").unwrap_or(&lower).to_string()
        };
        if mapping.source_schema_name != mapping.target_subject
            && comparable_source != comparable_target
        {
            outcome.warnings.push(PlanIssue {
                schema: source.to_string(),
                message: format!(
                    "schema name changed significantly: {} → {}",
                    mapping.source_schema_name, mapping.target_subject
                ),
            });
        }

        if mapping
            .source_schema_name
            .chars()
            .any(|c| matches!(c, '/' | ':' | ' ' | '\\'))
        {
            outcome.warnings.push(PlanIssue {
                schema: source.to_string(),
                message: "source name contains characters the target cannot accept".to_string(),
            });
        }

        if let Some(prefix) = AWS_PREFIXES
            .iter()
            .find(|p| mapping.source_schema_name.starts_with(**p))
        {
            outcome.warnings.push(PlanIssue {
                schema: source.to_string(),
                message: format!("source name carries the AWS-specific prefix {prefix:?}"),
            });
        }

        if VERSION_TOKENS
            .iter()
            .any(|t| mapping.source_schema_name.contains(t))
        {
            outcome.warnings.push(PlanIssue {
                schema: source.to_string(),
                message: "source name contains a versioning token".to_string(),
            });
        }

        if !mapping.references.is_empty() && self.reference_strategy != ReferenceStrategy::Rewrite
        {
            outcome.warnings.push(PlanIssue {
                schema: source.to_string(),
                message: "schema has references but the reference strategy is not 'rewrite'"
                    .to_string(),
            });
        }
    }
}

fn validate_subject(subject: &str) -> Result<(), String> {
    if subject.is_empty() {
        return Err("subject name cannot be empty".to_string());
    }
    if subject.len() > MAX_SUBJECT_LEN {
        return Err(format!(
            "subject name exceeds maximum length of {MAX_SUBJECT_LEN} characters"
        ));
    }
    if !SUBJECT_REGEX.is_match(subject) {
        return Err(
            "subject name contains invalid characters (allowed: alphanumerics, dots, underscores, hyphens)"
                .to_string(),
        );
    }
    if subject.starts_with('_') {
        return Err("subject name cannot start with underscore (reserved)".to_string());
    }
    Ok(())
}

fn validate_context(context: &str) -> Result<(), String> {
    if context.is_empty() {
        // Default context
        return Ok(());
    }
    let Some(name) = context.strip_prefix('.') else {
        return Err("context must start with a dot".to_string());
    };
    if name.is_empty() || !CONTEXT_REGEX.is_match(name) {
        return Err("context name contains invalid characters".to_string());
    }
    Ok(())
}

/// A cleaned-up subject candidate that still fails validation is a bug in
/// the naming pipeline; expose the helper for tests
#[cfg(test)]
pub(crate) fn is_valid_subject(subject: &str) -> bool {
    validate_subject(subject).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SchemaRole;
    use crate::normalizer;

    fn mapping(name: &str, subject: &str, context: &str) -> SchemaMapping {
        let mut m = SchemaMapping::skeleton("reg", name, 1, vec![], 0);
        m.target_subject = subject.to_string();
        m.target_context = context.to_string();
        m.detected_role = SchemaRole::Value;
        m
    }

    fn validator() -> Validator {
        Validator::new(ReferenceStrategy::Rewrite)
    }

    #[test]
    fn test_valid_mapping_passes() {
        let outcome = validator().validate_all(&[mapping("orders", "orders-value", "")]);
        assert!(!outcome.has_errors());
    }

    #[test]
    fn test_empty_subject_fails() {
        let outcome = validator().validate_all(&[mapping("orders", "", "")]);
        assert!(outcome.has_errors());
        assert!(outcome.errors[0].message.contains("empty"));
    }

    #[test]
    fn test_overlong_subject_fails() {
        let outcome = validator().validate_all(&[mapping("orders", &"x".repeat(256), "")]);
        assert!(outcome.has_errors());
    }

    #[test]
    fn test_invalid_chars_fail() {
        let outcome = validator().validate_all(&[mapping("orders", "or ders", "")]);
        assert!(outcome.has_errors());
    }

    #[test]
    fn test_leading_underscore_fails() {
        let outcome = validator().validate_all(&[mapping("orders", "_orders", "")]);
        assert!(outcome.has_errors());
        assert!(outcome.errors[0].message.contains("underscore"));
    }

    #[test]
    fn test_context_syntax() {
        let outcome = validator().validate_all(&[mapping("a", "a-value", ".payments")]);
        assert!(!outcome.has_errors());

        let outcome = validator().validate_all(&[mapping("a", "a-value", "payments")]);
        assert!(outcome.has_errors());
        assert!(outcome.errors[0].message.contains("start with a dot"));

        let outcome = validator().validate_all(&[mapping("a", "a-value", ".pay.ments")]);
        assert!(outcome.has_errors());
    }

    #[test]
    fn test_collision_after_resolution_is_fatal() {
        let outcome = validator().validate_all(&[
            mapping("a", "dup-value", ""),
            mapping("b", "dup-value", ""),
        ]);
        assert!(outcome.has_errors());
        assert!(outcome.errors[0].message.contains("naming collision"));
    }

    #[test]
    fn test_skipped_mappings_do_not_collide() {
        let a = mapping("a", "dup-value", "");
        let mut b = mapping("b", "dup-value", "");
        b.status = MappingStatus::Skipped;
        let outcome = validator().validate_all(&[a, b]);
        assert!(!outcome.has_errors());
    }

    #[test]
    fn test_mechanical_rename_not_warned() {
        // underscore→hyphen + lowercase + role suffix is not "significant"
        let outcome = validator().validate_all(&[mapping("user_events", "user-events-value", "")]);
        assert!(!outcome
            .warnings
            .iter()
            .any(|w| w.message.contains("significantly")));
    }

    #[test]
    fn test_significant_rename_warned() {
        let outcome = validator().validate_all(&[mapping("LegacyThing", "billing-events-value", "")]);
        assert!(outcome
            .warnings
            .iter()
            .any(|w| w.message.contains("significantly")));
    }

    #[test]
    fn test_aws_prefix_warned() {
        let outcome = validator().validate_all(&[mapping("MSK_orders", "msk-orders-value", "")]);
        assert!(outcome
            .warnings
            .iter()
            .any(|w| w.message.contains("AWS-specific prefix")));
    }

    #[test]
    fn test_version_token_warned() {
        let outcome = validator().validate_all(&[mapping("orders_v2", "orders-v2-value", "")]);
        assert!(outcome
            .warnings
            .iter()
            .any(|w| w.message.contains("versioning token")));
    }

    #[test]
    fn test_references_without_rewrite_warned() {
        let v = Validator::new(ReferenceStrategy::Skip);
        let mut m = mapping("orders", "orders-value", "");
        m.references = vec!["reg:Address".into()];
        let outcome = v.validate_all(&[m]);
        assert!(outcome
            .warnings
            .iter()
            .any(|w| w.message.contains("reference strategy")));
    }

    #[test]
    fn test_clean_for_subject_output_is_valid() {
        for raw in ["weird/name:with stuff", "ok.name", "tabs\tand\nnewlines"] {
            let cleaned = normalizer::clean_for_subject(raw);
            assert!(is_valid_subject(&cleaned), "cleaned {cleaned:?} invalid");
        }
    }
}
