//! Schema preprocessing for LLM prompts
//!
//! Compresses a schema to a fixed-shape context before any LLM call:
//! identity, format, record metadata, a truncated doc string, and at most
//! ten field summaries. Keeps prompts small and cost predictable.

use crate::models::{ParsedSchema, SourceSchema};
use serde::Serialize;

/// Maximum documentation length forwarded to the LLM
const MAX_DOC_LEN: usize = 200;

/// Maximum number of field summaries forwarded to the LLM
const MAX_FIELDS: usize = 10;

/// The compressed view of a schema sent to the LLM
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchemaContext {
    pub schema_name: String,
    pub registry: String,
    pub schema_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub record_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub documentation: String,
    /// `name (type)` summaries, at most [`MAX_FIELDS`]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub key_fields: Vec<String>,
    pub field_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
}

/// Build the prompt context for a schema
pub fn extract_context(schema: &SourceSchema, parsed: &ParsedSchema) -> SchemaContext {
    let mut context = SchemaContext {
        schema_name: schema.name.clone(),
        registry: schema.registry_name.clone(),
        schema_type: schema.data_format.to_string(),
        record_name: parsed.record_name.clone(),
        namespace: parsed.namespace.clone(),
        documentation: truncate(&parsed.documentation, MAX_DOC_LEN),
        key_fields: Vec::new(),
        field_count: parsed.fields.len(),
        references: parsed.references.clone(),
    };

    for field in parsed.fields.iter().take(MAX_FIELDS) {
        if field.type_name.is_empty() {
            context.key_fields.push(field.name.clone());
        } else {
            context
                .key_fields
                .push(format!("{} ({})", field.name, field.type_name));
        }
    }

    context
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{truncated}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Field, SchemaType};

    fn schema() -> SourceSchema {
        SourceSchema {
            name: "payment-transactions".into(),
            registry_name: "payments".into(),
            arn: String::new(),
            description: String::new(),
            data_format: SchemaType::Avro,
            compatibility: String::new(),
            tags: Default::default(),
            latest_version: 1,
            versions: vec![],
        }
    }

    #[test]
    fn test_context_shape() {
        let parsed = ParsedSchema {
            record_name: "PaymentTransaction".into(),
            namespace: "com.example.payments".into(),
            documentation: "Transactions".into(),
            fields: vec![
                Field {
                    name: "id".into(),
                    type_name: "string".into(),
                    ..Default::default()
                },
                Field {
                    name: "amount".into(),
                    type_name: "double".into(),
                    ..Default::default()
                },
            ],
            references: vec!["Currency".into()],
        };

        let context = extract_context(&schema(), &parsed);
        assert_eq!(context.schema_name, "payment-transactions");
        assert_eq!(context.registry, "payments");
        assert_eq!(context.schema_type, "AVRO");
        assert_eq!(context.field_count, 2);
        assert_eq!(context.key_fields, vec!["id (string)", "amount (double)"]);
        assert_eq!(context.references, vec!["Currency".to_string()]);
    }

    #[test]
    fn test_fields_capped_at_ten() {
        let parsed = ParsedSchema {
            fields: (0..25)
                .map(|i| Field {
                    name: format!("field{i}"),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };
        let context = extract_context(&schema(), &parsed);
        assert_eq!(context.key_fields.len(), 10);
        assert_eq!(context.field_count, 25);
    }

    #[test]
    fn test_documentation_truncated() {
        let parsed = ParsedSchema {
            documentation: "x".repeat(500),
            ..Default::default()
        };
        let context = extract_context(&schema(), &parsed);
        assert_eq!(context.documentation.chars().count(), 200);
        assert!(context.documentation.ends_with("..."));
    }
}
