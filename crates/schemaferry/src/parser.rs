//! Schema parser — uniform metadata extraction for Avro, JSON Schema, and
//! Protobuf definitions
//!
//! The parser is lenient: a malformed definition produces an empty
//! [`ParsedSchema`] with a warning logged, never an error. Downstream then
//! treats the schema as having no record name and no references, which keeps
//! a single bad definition from sinking the whole run.

use crate::models::{Field, ParsedSchema, SchemaType, SourceSchema};
use serde_json::Value;
use tracing::warn;

/// Avro primitive type names; anything else referenced by name is treated
/// as a reference to another schema
const AVRO_PRIMITIVES: &[&str] = &[
    "null", "boolean", "int", "long", "float", "double", "bytes", "string",
];

/// Parse the latest version of a source schema into uniform metadata
pub fn parse(schema: &SourceSchema) -> ParsedSchema {
    let Some(latest) = schema.latest() else {
        return ParsedSchema::default();
    };

    match schema.data_format {
        SchemaType::Avro => parse_avro(&latest.definition).unwrap_or_else(|e| {
            warn!(schema = %schema.key(), error = %e, "failed to parse Avro definition");
            ParsedSchema::default()
        }),
        SchemaType::Json => parse_json(&latest.definition).unwrap_or_else(|e| {
            warn!(schema = %schema.key(), error = %e, "failed to parse JSON Schema definition");
            ParsedSchema::default()
        }),
        SchemaType::Protobuf => parse_protobuf(&latest.definition),
    }
}

fn parse_avro(definition: &str) -> Result<ParsedSchema, serde_json::Error> {
    let root: Value = serde_json::from_str(definition)?;
    let mut parsed = ParsedSchema::default();

    if let Some(name) = root.get("name").and_then(Value::as_str) {
        parsed.record_name = name.to_string();
    }
    if let Some(ns) = root.get("namespace").and_then(Value::as_str) {
        parsed.namespace = ns.to_string();
    }
    if let Some(doc) = root.get("doc").and_then(Value::as_str) {
        parsed.documentation = doc.to_string();
    }

    if let Some(fields) = root.get("fields").and_then(Value::as_array) {
        for field in fields {
            let Some(name) = field.get("name").and_then(Value::as_str) else {
                continue;
            };
            let field_type = field.get("type").unwrap_or(&Value::Null);

            if let Some(reference) = avro_reference(field_type) {
                push_unique(&mut parsed.references, reference);
            }

            parsed.fields.push(Field {
                name: name.to_string(),
                type_name: avro_type_name(field_type),
                required: !avro_is_nullable(field_type),
                doc: field
                    .get("doc")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            });
        }
    }

    Ok(parsed)
}

fn parse_json(definition: &str) -> Result<ParsedSchema, serde_json::Error> {
    let root: Value = serde_json::from_str(definition)?;
    let mut parsed = ParsedSchema::default();

    if let Some(title) = root.get("title").and_then(Value::as_str) {
        parsed.record_name = title.to_string();
    }
    if let Some(desc) = root.get("description").and_then(Value::as_str) {
        parsed.documentation = desc.to_string();
    }

    let required: Vec<&str> = root
        .get("required")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    if let Some(props) = root.get("properties").and_then(Value::as_object) {
        for (name, prop) in props {
            if let Some(reference) = prop.get("$ref").and_then(Value::as_str) {
                push_unique(&mut parsed.references, reference.to_string());
            }
            parsed.fields.push(Field {
                name: name.clone(),
                type_name: prop
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or("object")
                    .to_string(),
                required: required.contains(&name.as_str()),
                doc: prop
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            });
        }
    }

    Ok(parsed)
}

/// Line-based scan; protobuf definitions in registries are single files
fn parse_protobuf(definition: &str) -> ParsedSchema {
    let mut parsed = ParsedSchema::default();

    for line in definition.lines() {
        let line = line.trim();

        if let Some(rest) = line.strip_prefix("package ") {
            parsed.namespace = rest.trim_end_matches(';').trim().to_string();
        }

        if let Some(rest) = line.strip_prefix("message ") {
            if parsed.record_name.is_empty() {
                if let Some(name) = rest.split_whitespace().next() {
                    parsed.record_name = name.trim_end_matches('{').to_string();
                }
            }
        }

        if let Some(rest) = line.strip_prefix("import ") {
            let import = rest.trim_end_matches(';').trim().trim_matches('"');
            if !import.is_empty() {
                push_unique(&mut parsed.references, import.to_string());
            }
        }
    }

    parsed
}

/// Human-readable type name for a field
fn avro_type_name(t: &Value) -> String {
    match t {
        Value::String(s) => s.clone(),
        Value::Object(obj) => obj
            .get("type")
            .and_then(Value::as_str)
            .or_else(|| obj.get("name").and_then(Value::as_str))
            .unwrap_or("complex")
            .to_string(),
        Value::Array(items) => {
            let names: Vec<String> = items.iter().map(avro_type_name).collect();
            names.join("|")
        }
        _ => "unknown".to_string(),
    }
}

/// Extract a referenced type name from a field type, if any
///
/// A non-primitive string type is a name reference; union members are
/// checked in order; an inline object carrying `name` without `type` is a
/// name reference as well.
fn avro_reference(t: &Value) -> Option<String> {
    match t {
        Value::String(s) => {
            if AVRO_PRIMITIVES.contains(&s.as_str()) {
                None
            } else {
                Some(s.clone())
            }
        }
        Value::Object(obj) => {
            if obj.contains_key("type") {
                None
            } else {
                obj.get("name").and_then(Value::as_str).map(String::from)
            }
        }
        Value::Array(items) => items.iter().find_map(avro_reference),
        _ => None,
    }
}

fn avro_is_nullable(t: &Value) -> bool {
    match t {
        Value::String(s) => s == "null",
        Value::Array(items) => items.iter().any(avro_is_nullable),
        _ => false,
    }
}

fn push_unique(refs: &mut Vec<String>, item: String) {
    if !refs.iter().any(|r| *r == item) {
        refs.push(item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SchemaVersion;

    fn avro_schema(definition: &str) -> SourceSchema {
        source_schema(definition, SchemaType::Avro)
    }

    fn source_schema(definition: &str, format: SchemaType) -> SourceSchema {
        SourceSchema {
            name: "test".into(),
            registry_name: "reg".into(),
            arn: String::new(),
            description: String::new(),
            data_format: format,
            compatibility: String::new(),
            tags: Default::default(),
            latest_version: 1,
            versions: vec![SchemaVersion {
                version_number: 1,
                version_id: "v1".into(),
                definition: definition.into(),
                status: "AVAILABLE".into(),
                created_time: None,
            }],
        }
    }

    #[test]
    fn test_avro_basic() {
        let parsed = parse(&avro_schema(
            r#"{
                "type": "record",
                "name": "UserEvent",
                "namespace": "com.example.events",
                "doc": "A user did something",
                "fields": [
                    {"name": "id", "type": "long"},
                    {"name": "email", "type": "string", "doc": "user email"}
                ]
            }"#,
        ));
        assert_eq!(parsed.record_name, "UserEvent");
        assert_eq!(parsed.namespace, "com.example.events");
        assert_eq!(parsed.documentation, "A user did something");
        assert_eq!(parsed.fields.len(), 2);
        assert_eq!(parsed.fields[1].doc, "user email");
        assert!(parsed.references.is_empty());
    }

    #[test]
    fn test_avro_string_reference() {
        let parsed = parse(&avro_schema(
            r#"{
                "type": "record",
                "name": "Order",
                "fields": [
                    {"name": "id", "type": "string"},
                    {"name": "address", "type": "Address"},
                    {"name": "billing", "type": "Address"}
                ]
            }"#,
        ));
        // duplicate-free, first-seen order
        assert_eq!(parsed.references, vec!["Address".to_string()]);
    }

    #[test]
    fn test_avro_union_reference() {
        let parsed = parse(&avro_schema(
            r#"{
                "type": "record",
                "name": "Order",
                "fields": [
                    {"name": "address", "type": ["null", "Address"]},
                    {"name": "customer", "type": ["null", "Customer"]}
                ]
            }"#,
        ));
        assert_eq!(
            parsed.references,
            vec!["Address".to_string(), "Customer".to_string()]
        );
        // union with null is nullable, so not required
        assert!(!parsed.fields[0].required);
    }

    #[test]
    fn test_avro_malformed_yields_empty() {
        let parsed = parse(&avro_schema("{not json"));
        assert!(parsed.record_name.is_empty());
        assert!(parsed.references.is_empty());
        assert!(parsed.fields.is_empty());
    }

    #[test]
    fn test_no_versions_yields_empty() {
        let mut schema = avro_schema("{}");
        schema.versions.clear();
        let parsed = parse(&schema);
        assert!(parsed.record_name.is_empty());
    }

    #[test]
    fn test_json_schema() {
        let parsed = parse(&source_schema(
            r##"{
                "title": "Notification",
                "description": "A notification payload",
                "type": "object",
                "properties": {
                    "id": {"type": "string"},
                    "recipient": {"$ref": "#/definitions/User"}
                },
                "required": ["id"]
            }"##,
            SchemaType::Json,
        ));
        assert_eq!(parsed.record_name, "Notification");
        assert_eq!(parsed.documentation, "A notification payload");
        assert_eq!(parsed.references, vec!["#/definitions/User".to_string()]);
        let id = parsed.fields.iter().find(|f| f.name == "id").unwrap();
        assert!(id.required);
        let rec = parsed.fields.iter().find(|f| f.name == "recipient").unwrap();
        assert!(!rec.required);
    }

    #[test]
    fn test_protobuf() {
        let parsed = parse(&source_schema(
            "syntax = \"proto3\";\npackage com.example;\nimport \"common.proto\";\nimport \"common.proto\";\n\nmessage PaymentEvent {\n  string id = 1;\n}\nmessage Inner {\n}\n",
            SchemaType::Protobuf,
        ));
        assert_eq!(parsed.namespace, "com.example");
        // first message wins
        assert_eq!(parsed.record_name, "PaymentEvent");
        // deduplicated
        assert_eq!(parsed.references, vec!["common.proto".to_string()]);
    }

    #[test]
    fn test_references_order_preserving_dedup() {
        let parsed = parse(&avro_schema(
            r#"{
                "type": "record",
                "name": "Wide",
                "fields": [
                    {"name": "a", "type": "Beta"},
                    {"name": "b", "type": "Alpha"},
                    {"name": "c", "type": "Beta"},
                    {"name": "d", "type": "Alpha"}
                ]
            }"#,
        ));
        assert_eq!(
            parsed.references,
            vec!["Beta".to_string(), "Alpha".to_string()]
        );
    }
}
