//! Per-level compilation state threaded through the recursive clause compiler.
//!
//! A context is never mutated in place: descending into a nested group or an EXISTS body builds
//! a new context from the current one, so sibling branches never see each other's aliases.

use std::collections::BTreeMap;

/// Default variable bound to the queried node.
pub const DEFAULT_ALIAS: &str = "n";

/// Base name of EXISTS sub-query variables (`sub`, `sub1`, `sub2`, ...).
pub const SUBQUERY_ALIAS: &str = "sub";

/// Connection-level capabilities that change the emitted Cypher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// `apoc.convert.fromJsonMap` / `fromJsonList` are callable.
    pub apoc: bool,
    /// Without APOC, emit an always-true placeholder for JSON length checks that cannot be
    /// decided instead of failing compilation.
    pub lenient_json_length: bool,
}

impl Capabilities {
    pub fn with_apoc() -> Self {
        Self {
            apoc: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompilationContext {
    pub depth: usize,
    pub current_alias: String,
    pub parent_alias: Option<String>,
    /// Labels/tables bound to `current_alias` at this level.
    pub tables: Vec<String>,
    /// Tables bound by enclosing EXISTS levels → their alias; the nearest level wins.
    pub outer_tables: BTreeMap<String, String>,
    /// Join table → join-assigned alias.
    pub joins: BTreeMap<String, String>,
    pub capabilities: Capabilities,
}

impl CompilationContext {
    pub fn new(table: Option<&str>, capabilities: Capabilities) -> Self {
        Self {
            depth: 0,
            current_alias: DEFAULT_ALIAS.to_string(),
            parent_alias: None,
            tables: table.map(|t| vec![t.to_string()]).unwrap_or_default(),
            outer_tables: BTreeMap::new(),
            joins: BTreeMap::new(),
            capabilities,
        }
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.current_alias = alias.to_string();
        self
    }

    pub fn with_joins(mut self, joins: impl IntoIterator<Item = (String, String)>) -> Self {
        self.joins.extend(joins);
        self
    }

    /// Context for a parenthesized group: same variables, one level deeper.
    pub fn nested(&self) -> Self {
        Self {
            depth: self.depth + 1,
            ..self.clone()
        }
    }

    /// Alias an EXISTS body opened at this depth binds.
    pub fn subquery_alias(&self) -> String {
        if self.depth == 0 {
            SUBQUERY_ALIAS.to_string()
        } else {
            format!("{}{}", SUBQUERY_ALIAS, self.depth)
        }
    }

    /// Context for an EXISTS body matching `label`. The current alias becomes the parent.
    pub fn exists_scope(&self, label: Option<&str>) -> Self {
        let mut outer_tables = self.outer_tables.clone();
        outer_tables.extend(
            self.tables
                .iter()
                .map(|t| (t.clone(), self.current_alias.clone())),
        );
        Self {
            depth: self.depth + 1,
            current_alias: self.subquery_alias(),
            parent_alias: Some(self.current_alias.clone()),
            tables: label.map(|l| vec![l.to_string()]).unwrap_or_default(),
            outer_tables,
            joins: self.joins.clone(),
            capabilities: self.capabilities,
        }
    }
}

impl Default for CompilationContext {
    fn default() -> Self {
        Self::new(None, Capabilities::default())
    }
}
