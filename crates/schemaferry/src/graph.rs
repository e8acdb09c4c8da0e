//! Schema dependency graph
//!
//! Built once per run from all extracted schemas. Resolves parsed reference
//! tokens to schema identities, rejects cycles, and decomposes the DAG into
//! dependency levels: level 0 holds schemas with no in-run dependencies, and
//! a schema always lands in a strictly higher level than everything it
//! references. Registration at the target walks the levels in ascending
//! order.

use crate::error::{MigrateError, MigrateResult};
use crate::models::{schema_key, ParsedSchema, SchemaMapping, SourceSchema};
use crate::parser;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// One topological level of the graph
#[derive(Debug, Clone)]
pub struct Level {
    pub level: usize,
    pub schemas: Vec<SchemaMapping>,
}

#[derive(Debug)]
struct Node {
    registry: String,
    name: String,
    versions: usize,
    parsed: ParsedSchema,
}

/// Immutable dependency graph over all extracted schemas
#[derive(Debug)]
pub struct DependencyGraph {
    nodes: BTreeMap<String, Node>,
    /// key → resolved keys it references
    edges: BTreeMap<String, Vec<String>>,
    /// key → keys that reference it
    reverse: BTreeMap<String, Vec<String>>,
    levels: Vec<Level>,
}

impl DependencyGraph {
    /// Build the graph: parse latest versions, resolve references, detect
    /// cycles, assign levels
    pub fn build(schemas: &[SourceSchema]) -> MigrateResult<Self> {
        let mut nodes = BTreeMap::new();
        for schema in schemas {
            let key = schema.key();
            let parsed = parser::parse(schema);
            nodes.insert(
                key,
                Node {
                    registry: schema.registry_name.clone(),
                    name: schema.name.clone(),
                    versions: schema.versions.len(),
                    parsed,
                },
            );
        }

        let mut edges: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut reverse: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for key in nodes.keys() {
            edges.insert(key.clone(), Vec::new());
            reverse.insert(key.clone(), Vec::new());
        }

        for (key, node) in &nodes {
            for reference in &node.parsed.references {
                match resolve_reference(&nodes, reference, &node.registry) {
                    Some(target) => {
                        if target == *key {
                            // self-reference (recursive type), not an edge
                            continue;
                        }
                        edges.get_mut(key).expect("node key").push(target.clone());
                        reverse.get_mut(&target).expect("node key").push(key.clone());
                    }
                    None => {
                        // Assumed external to the migrated set
                        debug!(schema = %key, reference = %reference, "unresolved reference, dropping");
                    }
                }
            }
        }

        let mut graph = Self {
            nodes,
            edges,
            reverse,
            levels: Vec::new(),
        };

        graph.detect_cycles()?;
        graph.levels = graph.assign_levels();

        info!(
            schemas = graph.nodes.len(),
            levels = graph.levels.len(),
            "dependency graph built"
        );

        Ok(graph)
    }

    /// Topological levels for ordered migration
    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    /// Parsed metadata for a schema key
    pub fn parsed(&self, key: &str) -> Option<&ParsedSchema> {
        self.nodes.get(key).map(|n| &n.parsed)
    }

    /// Resolved keys this schema references
    pub fn dependencies(&self, registry: &str, name: &str) -> &[String] {
        self.edges
            .get(&schema_key(registry, name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Schemas that reference this one
    pub fn dependents(&self, registry: &str, name: &str) -> &[String] {
        self.reverse
            .get(&schema_key(registry, name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// DFS with tri-coloring; a gray→gray edge is a back edge
    fn detect_cycles(&self) -> MigrateResult<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        let mut color: BTreeMap<&str, Color> =
            self.nodes.keys().map(|k| (k.as_str(), Color::White)).collect();

        // Iterative DFS so deep reference chains cannot overflow the stack.
        // The explicit stack holds (node, next-child-index).
        for start in self.nodes.keys() {
            if color[start.as_str()] != Color::White {
                continue;
            }

            let mut stack: Vec<(&str, usize)> = vec![(start.as_str(), 0)];
            color.insert(start.as_str(), Color::Gray);

            while let Some(&(node, next)) = stack.last() {
                let children = self.edges.get(node).map(Vec::as_slice).unwrap_or(&[]);
                if next < children.len() {
                    stack.last_mut().expect("stack non-empty").1 += 1;
                    let child = children[next].as_str();
                    match color[child] {
                        Color::Gray => {
                            // Back edge: the cycle is the gray path from the
                            // child back to the top of the stack
                            let mut path: Vec<String> = stack
                                .iter()
                                .map(|&(n, _)| n.to_string())
                                .skip_while(|n| n != child)
                                .collect();
                            path.push(child.to_string());
                            return Err(MigrateError::Cycle { path });
                        }
                        Color::White => {
                            color.insert(child, Color::Gray);
                            stack.push((child, 0));
                        }
                        Color::Black => {}
                    }
                } else {
                    color.insert(node, Color::Black);
                    stack.pop();
                }
            }
        }

        Ok(())
    }

    /// Kahn-style level assignment
    ///
    /// In-degree of a schema is the number of schemas it references, so
    /// level 0 contains dependency-free schemas and every schema sits above
    /// all of its references.
    fn assign_levels(&self) -> Vec<Level> {
        let mut in_degree: BTreeMap<&str, usize> = self
            .nodes
            .keys()
            .map(|k| (k.as_str(), self.edges[k].len()))
            .collect();

        let mut remaining: BTreeMap<&str, ()> =
            self.nodes.keys().map(|k| (k.as_str(), ())).collect();

        let mut levels = Vec::new();
        let mut level = 0usize;

        while !remaining.is_empty() {
            let current: Vec<&str> = remaining
                .keys()
                .copied()
                .filter(|k| in_degree[k] == 0)
                .collect();

            if current.is_empty() {
                // Unreachable after cycle detection
                break;
            }

            let mut schemas = Vec::with_capacity(current.len());
            for key in &current {
                let node = &self.nodes[*key];
                schemas.push(SchemaMapping::skeleton(
                    &node.registry,
                    &node.name,
                    node.versions,
                    self.edges[*key].clone(),
                    level,
                ));

                remaining.remove(key);
                for dependent in &self.reverse[*key] {
                    if let Some(d) = in_degree.get_mut(dependent.as_str()) {
                        *d = d.saturating_sub(1);
                    }
                }
            }

            levels.push(Level { level, schemas });
            level += 1;
        }

        levels
    }
}

/// Resolve a reference token to an existing node key
///
/// Tried in order: exact `registry:schema` match, the token within the
/// referencing schema's registry, then any node whose schema-name part
/// equals the token.
fn resolve_reference(
    nodes: &BTreeMap<String, Node>,
    reference: &str,
    current_registry: &str,
) -> Option<String> {
    if nodes.contains_key(reference) {
        return Some(reference.to_string());
    }

    let qualified = schema_key(current_registry, reference);
    if nodes.contains_key(&qualified) {
        return Some(qualified);
    }

    nodes
        .keys()
        .find(|key| {
            key.split_once(':')
                .map(|(_, name)| name == reference)
                .unwrap_or(false)
        })
        .cloned()
}
