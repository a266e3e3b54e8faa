//! Column references: parsing `table.column->json->path`, validation, and alias resolution.
//!
//! `resolve_alias` is the single place that decides which Cypher variable a dotted reference
//! points at, across joins and arbitrarily nested EXISTS bodies.

use std::sync::LazyLock;

use regex::Regex;

use super::clause::ClauseType;
use super::context::CompilationContext;
use super::errors::CompilationError;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

static INDEXED_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)((?:\[\d+\])+)$").expect("valid indexed segment regex")
});

pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// Labels, relationship types and map keys: plain identifiers pass through, anything else is
/// backtick-quoted with embedded backticks doubled.
///
/// # Examples
/// ```
/// use neoquent::cypher_generator::column::quote_identifier;
///
/// assert_eq!(quote_identifier("User"), "User");
/// assert_eq!(quote_identifier("blog posts"), "`blog posts`");
/// assert_eq!(quote_identifier("a`b"), "`a``b`");
/// ```
pub fn quote_identifier(name: &str) -> String {
    if is_identifier(name) {
        name.to_string()
    } else {
        format!("`{}`", name.replace('`', "``"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub property: String,
    pub json_path: Vec<PathSegment>,
}

impl ColumnRef {
    pub fn has_json_path(&self) -> bool {
        !self.json_path.is_empty()
    }

    /// Last named key of the JSON path, if any.
    pub fn last_key(&self) -> Option<&str> {
        match self.json_path.last() {
            Some(PathSegment::Key(key)) => Some(key),
            _ => None,
        }
    }
}

/// Parse `[table.]property[->segment...]`. Segments may carry `[n]` indexes or be bare numbers.
pub fn parse_column(column: &str, clause: ClauseType) -> Result<ColumnRef, CompilationError> {
    let invalid = |identifier: &str| CompilationError::InvalidIdentifier {
        clause,
        identifier: identifier.to_string(),
    };

    let mut parts = column.trim().split("->");
    let head = parts.next().unwrap_or_default().trim();

    let (table, property) = match head.rsplit_once('.') {
        Some((table, property)) => (Some(table.trim()), property.trim()),
        None => (None, head),
    };

    if let Some(table) = table {
        if !is_identifier(table) {
            return Err(invalid(table));
        }
    }
    if !is_identifier(property) {
        return Err(invalid(property));
    }

    let mut json_path = Vec::new();
    for raw in parts {
        let segment = raw.trim();
        if let Ok(index) = segment.parse::<usize>() {
            json_path.push(PathSegment::Index(index));
        } else if is_identifier(segment) {
            json_path.push(PathSegment::Key(segment.to_string()));
        } else if let Some(captures) = INDEXED_SEGMENT.captures(segment) {
            json_path.push(PathSegment::Key(captures[1].to_string()));
            for index in captures[2]
                .split(|c: char| c == '[' || c == ']')
                .filter(|s| !s.is_empty())
            {
                let index = index.parse().map_err(|_| invalid(segment))?;
                json_path.push(PathSegment::Index(index));
            }
        } else {
            return Err(invalid(segment));
        }
    }

    Ok(ColumnRef {
        table: table.map(str::to_string),
        property: property.to_string(),
        json_path,
    })
}

/// Pick the variable a (possibly table-qualified) reference belongs to.
///
/// 1. Inside an EXISTS body: tables bound at this level resolve to the current alias, tables
///    bound by an enclosing level to that level's alias, join tables to their join alias,
///    anything else to the parent alias.
/// 2. Outside: join tables resolve to their join alias.
/// 3. Otherwise the prefix is dropped and the current alias is used.
///
/// A qualifier that already names a bound variable is kept as-is.
pub fn resolve_alias<'a>(table: Option<&'a str>, ctx: &'a CompilationContext) -> &'a str {
    let Some(table) = table else {
        return &ctx.current_alias;
    };

    if table == ctx.current_alias || ctx.tables.iter().any(|t| t == table) {
        return &ctx.current_alias;
    }
    if ctx.parent_alias.as_deref() == Some(table) {
        return table;
    }
    if let Some(alias) = ctx.outer_tables.get(table) {
        return alias;
    }
    if let Some(alias) = ctx.joins.get(table) {
        return alias;
    }
    if ctx.joins.values().any(|alias| alias == table) {
        return table;
    }

    match &ctx.parent_alias {
        Some(parent) => parent,
        None => &ctx.current_alias,
    }
}

/// `alias.property` for a reference; JSON path segments are not applied here.
pub fn property_reference(column: &ColumnRef, ctx: &CompilationContext) -> String {
    format!(
        "{}.{}",
        resolve_alias(column.table.as_deref(), ctx),
        column.property
    )
}

/// Parse and resolve a column that must not carry a JSON path.
pub fn resolve_plain_column(
    column: &str,
    clause: ClauseType,
    ctx: &CompilationContext,
) -> Result<String, CompilationError> {
    let parsed = parse_column(column, clause)?;
    if parsed.has_json_path() {
        return Err(CompilationError::unsupported_value(
            clause,
            column,
            "JSON path columns are only supported by basic, json contains and json length clauses",
        ));
    }
    Ok(property_reference(&parsed, ctx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cypher_generator::context::Capabilities;

    fn ctx() -> CompilationContext {
        CompilationContext::new(Some("users"), Capabilities::default())
    }

    #[test]
    fn test_parse_plain_and_qualified() {
        let plain = parse_column("age", ClauseType::Basic).unwrap();
        assert_eq!(plain.table, None);
        assert_eq!(plain.property, "age");

        let qualified = parse_column("users.email", ClauseType::Basic).unwrap();
        assert_eq!(qualified.table.as_deref(), Some("users"));
        assert_eq!(qualified.property, "email");
    }

    #[test]
    fn test_parse_json_path_with_indexes() {
        let parsed = parse_column("options->languages[0]->code", ClauseType::Basic).unwrap();
        assert_eq!(parsed.property, "options");
        assert_eq!(
            parsed.json_path,
            vec![
                PathSegment::Key("languages".into()),
                PathSegment::Index(0),
                PathSegment::Key("code".into()),
            ]
        );
        assert_eq!(parsed.last_key(), Some("code"));
    }

    #[test]
    fn test_parse_rejects_injection() {
        let err = parse_column("name) DETACH DELETE n //", ClauseType::Basic).unwrap_err();
        assert!(matches!(err, CompilationError::InvalidIdentifier { .. }));
        assert!(parse_column("settings->a b", ClauseType::JsonContains).is_err());
    }

    #[test]
    fn test_resolve_top_level_strips_prefix() {
        let ctx = ctx();
        assert_eq!(resolve_alias(Some("users"), &ctx), "n");
        assert_eq!(resolve_alias(Some("unknown"), &ctx), "n");
        assert_eq!(resolve_alias(None, &ctx), "n");
    }

    #[test]
    fn test_resolve_join_alias() {
        let ctx = ctx().with_joins([("posts".to_string(), "posts".to_string())]);
        assert_eq!(resolve_alias(Some("posts"), &ctx), "posts");
        assert_eq!(resolve_alias(Some("users"), &ctx), "n");
    }

    #[test]
    fn test_resolve_inside_exists() {
        let scope = ctx().exists_scope(Some("posts"));
        assert_eq!(resolve_alias(Some("posts"), &scope), "sub");
        assert_eq!(resolve_alias(Some("users"), &scope), "n");
        assert_eq!(resolve_alias(Some("anything_else"), &scope), "n");
        assert_eq!(resolve_alias(None, &scope), "sub");
    }

    #[test]
    fn test_resolve_plain_column_rejects_json_path() {
        let err = resolve_plain_column("meta->a", ClauseType::In, &ctx()).unwrap_err();
        assert!(matches!(err, CompilationError::UnsupportedValue { .. }));
    }
}
