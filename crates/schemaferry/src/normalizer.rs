//! Name normalization and collision resolution
//!
//! Normalization runs three ordered phases over a schema name (invalid-char
//! replacement, dot handling, case normalization) and records a short
//! transformation log for the final mapping. Collision handling groups
//! mappings by their full target and rewrites or skips colliding entries
//! according to the configured strategy.

use crate::config::{CaseMode, CollisionStrategy, DotMode, NormalizationConfig};
use crate::models::{Collision, MappingStatus, SchemaMapping};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Characters Confluent subjects cannot contain (colon doubles as the
/// context separator)
const INVALID_CHARS: &[char] = &['/', ':', ' ', '\\', '<', '>', '"', '|', '?', '*'];

static SUBJECT_CLEAN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]").expect("subject clean pattern"));

/// Deterministic schema-name rewriting
#[derive(Debug, Clone)]
pub struct Normalizer {
    config: NormalizationConfig,
}

impl Normalizer {
    pub fn new(config: NormalizationConfig) -> Self {
        Self { config }
    }

    /// Normalize a schema name, returning the result and a transformation
    /// log (one entry per phase that changed the value)
    pub fn normalize(&self, name: &str) -> (String, Vec<String>) {
        let mut transformations = Vec::new();

        let result = self.replace_invalid_chars(name, &mut transformations);
        let result = self.handle_dots(&result, &mut transformations);
        let result = self.normalize_case(&result, &mut transformations);

        (result, transformations)
    }

    fn replace_invalid_chars(&self, name: &str, log: &mut Vec<String>) -> String {
        let replacement = if self.config.invalid_char_replacement.is_empty() {
            "-"
        } else {
            &self.config.invalid_char_replacement
        };

        let mut result = String::with_capacity(name.len());
        let mut replaced = false;
        for c in name.chars() {
            if INVALID_CHARS.contains(&c) {
                result.push_str(replacement);
                replaced = true;
            } else {
                result.push(c);
            }
        }

        if replaced {
            log.push(format!("invalid-chars→{replacement}"));
        }
        result
    }

    fn handle_dots(&self, name: &str, log: &mut Vec<String>) -> String {
        if !name.contains('.') {
            return name.to_string();
        }

        match self.config.normalize_dots {
            DotMode::Keep => name.to_string(),
            DotMode::Replace => {
                let replacement = if self.config.dot_replacement.is_empty() {
                    "-"
                } else {
                    &self.config.dot_replacement
                };
                log.push(format!("dots→{replacement}"));
                name.replace('.', replacement)
            }
            DotMode::ExtractLast => {
                log.push("extract-last-segment".to_string());
                name.rsplit('.').next().unwrap_or(name).to_string()
            }
        }
    }

    fn normalize_case(&self, name: &str, log: &mut Vec<String>) -> String {
        let result = match self.config.normalize_case {
            CaseMode::Keep => return name.to_string(),
            CaseMode::Kebab => split_join(name, '-'),
            CaseMode::Snake => split_join(name, '_'),
            CaseMode::Lower => name.to_lowercase(),
        };

        if result != name {
            log.push(match self.config.normalize_case {
                CaseMode::Kebab => "case→kebab".to_string(),
                CaseMode::Snake => "case→snake".to_string(),
                CaseMode::Lower => "case→lower".to_string(),
                CaseMode::Keep => unreachable!(),
            });
        }
        result
    }
}

/// Split on case transitions and separators, join with `sep`, lowercase
///
/// A run of consecutive uppercase letters is treated as one word, so
/// `HTTPServer` does not split inside the acronym.
fn split_join(s: &str, sep: char) -> String {
    let mut result = String::with_capacity(s.len() + 4);
    let mut prev_was_upper = false;
    let mut prev_was_separator = false;

    for (i, c) in s.chars().enumerate() {
        let is_upper = c.is_uppercase();
        let is_separator = c == '_' || c == '-' || c == ' ';

        if is_separator {
            if !prev_was_separator && !result.is_empty() {
                result.push(sep);
            }
            prev_was_separator = true;
            prev_was_upper = false;
            continue;
        }

        if is_upper && i > 0 && !prev_was_upper && !prev_was_separator {
            result.push(sep);
        }

        result.extend(c.to_lowercase());
        prev_was_upper = is_upper;
        prev_was_separator = false;
    }

    // Collapse runs of the separator and trim the ends
    let doubled: String = [sep, sep].iter().collect();
    let single = sep.to_string();
    let mut collapsed = result;
    while collapsed.contains(&doubled) {
        collapsed = collapsed.replace(&doubled, &single);
    }
    collapsed.trim_matches(sep).to_string()
}

/// Idempotently remove a trailing key suffix (`-key`, `_key`, `Key`, `-k`, `_k`)
pub fn strip_key_suffix(name: &str) -> &str {
    for suffix in ["-key", "_key", "Key", "-k", "_k"] {
        if let Some(stripped) = name.strip_suffix(suffix) {
            return stripped;
        }
    }
    name
}

/// Idempotently remove a trailing value suffix (`-value`, `_value`, `Value`, `-v`, `_v`)
pub fn strip_value_suffix(name: &str) -> &str {
    for suffix in ["-value", "_value", "Value", "-v", "_v"] {
        if let Some(stripped) = name.strip_suffix(suffix) {
            return stripped;
        }
    }
    name
}

/// Replace anything outside `[A-Za-z0-9._-]` with `-`
pub fn clean_for_subject(name: &str) -> String {
    SUBJECT_CLEAN_REGEX.replace_all(name, "-").into_owned()
}

/// Detect many-to-one target mappings among non-skipped mappings
pub fn detect_collisions(mappings: &[SchemaMapping]) -> Vec<Collision> {
    let mut by_target: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for mapping in mappings {
        if mapping.status == MappingStatus::Skipped {
            continue;
        }
        by_target
            .entry(mapping.full_target())
            .or_default()
            .push(format!(
                "{}.{}",
                mapping.source_registry, mapping.source_schema_name
            ));
    }

    by_target
        .into_iter()
        .filter(|(_, sources)| sources.len() > 1)
        .map(|(target, source_schemas)| Collision {
            target,
            source_schemas,
        })
        .collect()
}

/// Rewrite or skip colliding mappings per the configured strategy
///
/// With `suffix`, the grouping pass is re-run after each round so that a
/// rename landing on a pre-existing subject (`foo-1` already taken) is
/// caught and renamed again. The rescan is bounded; pathological inputs
/// cannot loop forever.
pub fn resolve_collisions(mappings: &mut [SchemaMapping], strategy: CollisionStrategy) {
    if strategy == CollisionStrategy::Fail {
        return;
    }

    // Suffix renames can themselves collide, hence the rescan loop. Every
    // other strategy resolves in a single pass.
    let max_rounds = if strategy == CollisionStrategy::Suffix {
        mappings.len().max(1)
    } else {
        1
    };

    for round in 0..max_rounds {
        let groups = collision_groups(mappings);
        if groups.is_empty() {
            return;
        }
        debug!(round, groups = groups.len(), %strategy, "resolving naming collisions");

        for indices in groups.values() {
            apply_strategy(mappings, indices, strategy);
        }
    }

    let remaining = detect_collisions(mappings);
    if !remaining.is_empty() {
        warn!(
            collisions = remaining.len(),
            "collisions remain after resolution; validation will fail"
        );
    }
}

/// Indices of non-skipped mappings grouped by full target, insertion order
/// within each group
fn collision_groups(mappings: &[SchemaMapping]) -> BTreeMap<String, Vec<usize>> {
    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (i, mapping) in mappings.iter().enumerate() {
        if mapping.status == MappingStatus::Skipped {
            continue;
        }
        groups.entry(mapping.full_target()).or_default().push(i);
    }
    groups.retain(|_, indices| indices.len() > 1);
    groups
}

fn apply_strategy(mappings: &mut [SchemaMapping], indices: &[usize], strategy: CollisionStrategy) {
    match strategy {
        CollisionStrategy::Fail => {}

        CollisionStrategy::Suffix => {
            // First mapping keeps its name; the rest get -1, -2, ...
            for (n, &i) in indices.iter().enumerate().skip(1) {
                let mapping = &mut mappings[i];
                mapping.target_subject = format!("{}-{}", mapping.target_subject, n);
                mapping.transformations.push("collision-suffix".to_string());
            }
        }

        CollisionStrategy::RegistryPrefix => {
            for &i in indices {
                let mapping = &mut mappings[i];
                mapping.target_subject =
                    format!("{}-{}", mapping.source_registry, mapping.target_subject);
                mapping
                    .transformations
                    .push("collision-registry-prefix".to_string());
            }
        }

        CollisionStrategy::PreferShorter => {
            // Keep the shortest source name; ties break on registry then name
            let keep = *indices
                .iter()
                .min_by_key(|&&i| {
                    let m = &mappings[i];
                    (
                        m.source_schema_name.len(),
                        m.source_registry.clone(),
                        m.source_schema_name.clone(),
                    )
                })
                .expect("non-empty collision group");
            let kept_target = mappings[keep].full_target();
            for &i in indices {
                if i == keep {
                    continue;
                }
                let mapping = &mut mappings[i];
                mapping.status = MappingStatus::Skipped;
                mapping.warning = format!("skipped: collides with {kept_target} (prefer-shorter)");
                mapping
                    .transformations
                    .push("collision-prefer-shorter".to_string());
            }
        }

        CollisionStrategy::Skip => {
            for &i in indices.iter().skip(1) {
                let mapping = &mut mappings[i];
                mapping.status = MappingStatus::Skipped;
                mapping.warning = "skipped: colliding target already claimed".to_string();
                mapping.transformations.push("collision-skip".to_string());
            }
        }
    }
}
