//! Relationship traversals and path queries.
//!
//! Traversals append `MATCH (from)-[:TYPE]->(to)` patterns to a [`QueryBuilder`]; path queries
//! are standalone statements returning `path`. Neither fails on missing context: an unknown
//! source or target becomes an unlabeled node pattern.
//!
//! [`QueryBuilder`]: super::builder::QueryBuilder

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::hydrate::Model;
use crate::cypher_generator::column::quote_identifier;
use crate::cypher_generator::context::DEFAULT_ALIAS;
use crate::cypher_generator::{CompiledQuery, Parameters};

/// Depth bound applied to `all_paths` when none is given.
pub const DEFAULT_MAX_DEPTH: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

impl Direction {
    /// Variable name bound by a traversal in this direction.
    pub fn base_alias(&self) -> &'static str {
        match self {
            Direction::Outgoing => "target",
            Direction::Incoming => "source",
            Direction::Both => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Traversal {
    pub direction: Direction,
    pub rel_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Traversal {
    pub fn new(direction: Direction, rel_type: &str, label: Option<&str>) -> Self {
        Self {
            direction,
            rel_type: rel_type.to_string(),
            label: label.map(str::to_string),
        }
    }

    /// `(from)-[:TYPE]->(alias:Label)` with the arrow set by the direction.
    pub fn pattern(&self, from: &str, alias: &str) -> String {
        let rel = relationship(Some(&self.rel_type), "");
        let node = node_pattern(alias, self.label.as_deref(), None);
        match self.direction {
            Direction::Outgoing => format!("({})-{}->{}", from, rel, node),
            Direction::Incoming => format!("({})<-{}-{}", from, rel, node),
            Direction::Both => format!("({})-{}-{}", from, rel, node),
        }
    }
}

/// Aliases bound by a traversal chain: `target`, `target1`, `source`, ...
pub fn traversal_aliases(traversals: &[Traversal]) -> Vec<String> {
    let mut aliases = Vec::with_capacity(traversals.len());
    for (i, traversal) in traversals.iter().enumerate() {
        let base = traversal.direction.base_alias();
        let seen = traversals[..i]
            .iter()
            .filter(|t| t.direction == traversal.direction)
            .count();
        aliases.push(if seen == 0 {
            base.to_string()
        } else {
            format!("{}{}", base, seen)
        });
    }
    aliases
}

/// `MATCH` clauses for a traversal chain starting at `start`, plus the alias the chain ends on.
pub fn traversal_clauses(traversals: &[Traversal], start: &str) -> (Vec<String>, String) {
    let aliases = traversal_aliases(traversals);
    let mut from = start.to_string();
    let mut clauses = Vec::with_capacity(traversals.len());

    for (traversal, alias) in traversals.iter().zip(aliases) {
        clauses.push(format!("MATCH {}", traversal.pattern(&from, &alias)));
        from = alias;
    }

    (clauses, from)
}

fn relationship(rel_type: Option<&str>, length: &str) -> String {
    match rel_type.filter(|t| !t.is_empty()) {
        Some(rel_type) => format!("[:{}{}]", quote_identifier(rel_type), length),
        None if length.is_empty() => "[]".to_string(),
        None => format!("[{}]", length),
    }
}

fn node_pattern(alias: &str, label: Option<&str>, key: Option<(&str, &str)>) -> String {
    let mut pattern = alias.to_string();
    if let Some(label) = label.filter(|l| !l.is_empty()) {
        pattern.push(':');
        pattern.push_str(&quote_identifier(label));
    }
    if let Some((key, param)) = key {
        pattern.push_str(&format!(" {{{}: ${}}}", quote_identifier(key), param));
    }
    format!("({})", pattern)
}

/// A node identified by label and key value. Any part may be missing.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRef {
    pub label: Option<String>,
    pub key: String,
    pub id: Option<Value>,
}

impl NodeRef {
    pub fn new(label: &str, id: impl Into<Value>) -> Self {
        Self {
            label: Some(label.to_string()),
            key: "id".to_string(),
            id: Some(id.into()),
        }
    }

    pub fn with_key(mut self, key: &str) -> Self {
        self.key = key.to_string();
        self
    }

    pub fn from_model<T: Model>(model: &T) -> Self {
        Self {
            label: Some(T::label().to_string()),
            key: T::key_name().to_string(),
            id: model.key().filter(|id| !id.is_null()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathTarget {
    Node(NodeRef),
    /// Bare identifier: same label and key as the source.
    Id(Value),
}

impl<T: Model> From<&T> for PathTarget {
    fn from(model: &T) -> Self {
        PathTarget::Node(NodeRef::from_model(model))
    }
}

/// Path statements anchored at an optional source node.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PathQuery {
    source: Option<NodeRef>,
}

impl PathQuery {
    pub fn new(source: Option<NodeRef>) -> Self {
        Self { source }
    }

    /// `shortestPath` between source and target; unbounded when `max_depth` is `None`.
    pub fn shortest_path(
        &self,
        target: PathTarget,
        rel_type: Option<&str>,
        max_depth: Option<u32>,
    ) -> CompiledQuery {
        let length = match max_depth {
            Some(depth) => format!("*..{}", depth.max(1)),
            None => "*".to_string(),
        };
        let (pattern, parameters) = self.path_pattern(target, rel_type, &length);
        CompiledQuery::new(
            format!("MATCH path = shortestPath({}) RETURN path", pattern),
            parameters,
        )
    }

    /// Every path up to `max_depth` hops (default 5, at least 1).
    pub fn all_paths(
        &self,
        target: PathTarget,
        rel_type: Option<&str>,
        max_depth: Option<u32>,
    ) -> CompiledQuery {
        let depth = max_depth.unwrap_or(DEFAULT_MAX_DEPTH).max(1);
        let (pattern, parameters) = self.path_pattern(target, rel_type, &format!("*1..{}", depth));
        CompiledQuery::new(format!("MATCH path = {} RETURN path", pattern), parameters)
    }

    fn path_pattern(
        &self,
        target: PathTarget,
        rel_type: Option<&str>,
        length: &str,
    ) -> (String, Parameters) {
        let mut parameters = Parameters::new();

        let source = match &self.source {
            Some(NodeRef {
                label,
                key,
                id: Some(id),
            }) => {
                parameters.insert("source_id", id.clone());
                node_pattern(DEFAULT_ALIAS, label.as_deref(), Some((key.as_str(), "source_id")))
            }
            Some(NodeRef { label, .. }) => node_pattern(DEFAULT_ALIAS, label.as_deref(), None),
            None => node_pattern(DEFAULT_ALIAS, None, None),
        };

        let target = match target {
            PathTarget::Node(NodeRef { label, key, id }) => match id {
                Some(id) => {
                    parameters.insert("target_id", id);
                    node_pattern("target", label.as_deref(), Some((key.as_str(), "target_id")))
                }
                None => node_pattern("target", label.as_deref(), None),
            },
            PathTarget::Id(id) => {
                parameters.insert("target_id", id);
                let label = self.source.as_ref().and_then(|s| s.label.as_deref());
                let key = self
                    .source
                    .as_ref()
                    .map(|s| s.key.as_str())
                    .unwrap_or("id");
                node_pattern("target", label, Some((key, "target_id")))
            }
        };

        (
            format!("{}-{}-{}", source, relationship(rel_type, length), target),
            parameters,
        )
    }
}
