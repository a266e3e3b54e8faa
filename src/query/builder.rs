//! Fluent query surface and full statement compilation.
//!
//! A [`QueryBuilder`] is plain data: the clause list plus joins, traversals, projection,
//! ordering and paging. Compiling it produces one statement:
//!
//! ```text
//! MATCH (n:Label)[, (j:Join)...] [MATCH (n)-[:TYPE]->(target)]...
//! [WHERE <join conditions> AND (<wheres>)]
//! RETURN [DISTINCT] <projection> [ORDER BY ...] [SKIP k] [LIMIT m]
//! ```
//!
//! With left joins the filter moves after the optional matches:
//!
//! ```text
//! MATCH (n:Label) [WHERE <join conditions>]
//! [OPTIONAL MATCH (l:LeftJoin) WHERE <condition>]... [MATCH (n)-[:TYPE]->(target)]...
//! [WITH * WHERE <wheres>]
//! RETURN [DISTINCT] <projection> [ORDER BY ...] [SKIP k] [LIMIT m]
//! ```
//!
//! The `RETURN` clause is produced per [`ReturnMode`], so count and aggregate queries are
//! compiled directly rather than rewritten from the row query.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::hydrate::{normalize, row_properties, Model, ModelQuery};
use super::pattern::{traversal_aliases, traversal_clauses, Direction, Traversal};
use crate::connection::driver::{GraphValue, Row};
use crate::connection::{Connection, ExecutionError};
use crate::cypher_generator::column::{is_identifier, quote_identifier, resolve_plain_column};
use crate::cypher_generator::context::DEFAULT_ALIAS;
use crate::cypher_generator::{
    compile_where, Capabilities, Clause, ClauseKind, ClauseType, ClauseValue, CompilationContext,
    CompilationError, CompiledQuery, Operator, ParameterBinder, Parameters, SubQuery,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
}

/// `JOIN table ON first <operator> second`. The table name is both the label and the variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join {
    #[serde(default)]
    pub kind: JoinKind,
    pub table: String,
    pub first: String,
    pub operator: String,
    pub second: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    fn as_cypher(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub column: String,
    #[serde(default)]
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregate {
    Sum,
    Avg,
    Min,
    Max,
}

impl Aggregate {
    fn as_cypher(&self) -> &'static str {
        match self {
            Aggregate::Sum => "sum",
            Aggregate::Avg => "avg",
            Aggregate::Min => "min",
            Aggregate::Max => "max",
        }
    }
}

/// What the `RETURN` clause yields.
#[derive(Debug, Clone, PartialEq)]
pub enum ReturnMode {
    Rows,
    /// `RETURN count(*) AS count`
    Count,
    /// `RETURN <fn>(<column>) AS aggregate`
    Aggregate(Aggregate, String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryBuilder {
    pub label: Option<String>,
    pub wheres: Vec<Clause>,
    pub joins: Vec<Join>,
    pub traversals: Vec<Traversal>,
    pub columns: Vec<String>,
    pub distinct: bool,
    pub orders: Vec<Order>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// Caller-supplied parameters (`with_parameter`), merged before compilation.
    pub parameters: Parameters,
    #[serde(skip)]
    pub capabilities: Capabilities,
}

impl QueryBuilder {
    pub fn new(label: &str) -> Self {
        Self {
            label: Some(label.to_string()),
            ..Self::default()
        }
    }

    pub fn for_model<T: Model>() -> Self {
        Self::new(T::label())
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_parameter(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(name, value);
        self
    }

    /// Hydrate results into `T` instead of returning property maps.
    pub fn with_model<T: Model>(self) -> ModelQuery<T> {
        ModelQuery::new(self)
    }

    pub fn push(mut self, clause: Clause) -> Self {
        self.wheres.push(clause);
        self
    }

    pub fn where_op(self, column: &str, operator: &str, value: impl Into<ClauseValue>) -> Self {
        self.push(Clause::and(Clause::basic(column, operator, value)))
    }

    pub fn or_where_op(self, column: &str, operator: &str, value: impl Into<ClauseValue>) -> Self {
        self.push(Clause::or(Clause::basic(column, operator, value)))
    }

    pub fn where_eq(self, column: &str, value: impl Into<ClauseValue>) -> Self {
        self.where_op(column, "=", value)
    }

    pub fn or_where_eq(self, column: &str, value: impl Into<ClauseValue>) -> Self {
        self.or_where_op(column, "=", value)
    }

    pub fn where_in<V: Into<ClauseValue>>(
        self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.push(Clause::and(ClauseKind::In {
            column: column.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        }))
    }

    pub fn where_not_in<V: Into<ClauseValue>>(
        self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.push(Clause::and(ClauseKind::NotIn {
            column: column.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        }))
    }

    pub fn where_null(self, column: &str) -> Self {
        self.push(Clause::and(ClauseKind::Null {
            column: column.to_string(),
        }))
    }

    pub fn or_where_null(self, column: &str) -> Self {
        self.push(Clause::or(ClauseKind::Null {
            column: column.to_string(),
        }))
    }

    pub fn where_not_null(self, column: &str) -> Self {
        self.push(Clause::and(ClauseKind::NotNull {
            column: column.to_string(),
        }))
    }

    pub fn where_between(
        self,
        column: &str,
        low: impl Into<ClauseValue>,
        high: impl Into<ClauseValue>,
    ) -> Self {
        self.push(Clause::and(ClauseKind::Between {
            column: column.to_string(),
            values: vec![low.into(), high.into()],
        }))
    }

    pub fn where_not_between(
        self,
        column: &str,
        low: impl Into<ClauseValue>,
        high: impl Into<ClauseValue>,
    ) -> Self {
        self.push(Clause::and(ClauseKind::NotBetween {
            column: column.to_string(),
            values: vec![low.into(), high.into()],
        }))
    }

    pub fn where_column(self, first: &str, operator: &str, second: &str) -> Self {
        self.push(Clause::and(ClauseKind::Column {
            first: first.to_string(),
            operator: operator.to_string(),
            second: second.to_string(),
        }))
    }

    /// Parenthesized group built by `build` on an empty builder.
    pub fn where_nested(self, build: impl FnOnce(QueryBuilder) -> QueryBuilder) -> Self {
        let group = build(QueryBuilder::default());
        self.push(Clause::and(ClauseKind::Nested {
            query: SubQuery::new(None, group.wheres),
        }))
    }

    pub fn or_where_nested(self, build: impl FnOnce(QueryBuilder) -> QueryBuilder) -> Self {
        let group = build(QueryBuilder::default());
        self.push(Clause::or(ClauseKind::Nested {
            query: SubQuery::new(None, group.wheres),
        }))
    }

    /// `EXISTS { MATCH (sub:label) WHERE ... }` with the body built by `build`.
    pub fn where_exists(self, label: &str, build: impl FnOnce(QueryBuilder) -> QueryBuilder) -> Self {
        let body = build(QueryBuilder::new(label));
        self.push(Clause::and(ClauseKind::Exists {
            query: SubQuery::new(Some(label), body.wheres),
            not: false,
        }))
    }

    pub fn where_not_exists(
        self,
        label: &str,
        build: impl FnOnce(QueryBuilder) -> QueryBuilder,
    ) -> Self {
        let body = build(QueryBuilder::new(label));
        self.push(Clause::and(ClauseKind::Exists {
            query: SubQuery::new(Some(label), body.wheres),
            not: true,
        }))
    }

    pub fn where_date(self, column: &str, operator: &str, value: impl Into<ClauseValue>) -> Self {
        self.push(Clause::and(ClauseKind::Date {
            column: column.to_string(),
            operator: operator.to_string(),
            value: value.into(),
        }))
    }

    pub fn where_month(self, column: &str, operator: &str, value: impl Into<ClauseValue>) -> Self {
        self.push(Clause::and(ClauseKind::Month {
            column: column.to_string(),
            operator: operator.to_string(),
            value: value.into(),
        }))
    }

    pub fn where_day(self, column: &str, operator: &str, value: impl Into<ClauseValue>) -> Self {
        self.push(Clause::and(ClauseKind::Day {
            column: column.to_string(),
            operator: operator.to_string(),
            value: value.into(),
        }))
    }

    pub fn where_year(self, column: &str, operator: &str, value: impl Into<ClauseValue>) -> Self {
        self.push(Clause::and(ClauseKind::Year {
            column: column.to_string(),
            operator: operator.to_string(),
            value: value.into(),
        }))
    }

    pub fn where_time(self, column: &str, operator: &str, value: impl Into<ClauseValue>) -> Self {
        self.push(Clause::and(ClauseKind::Time {
            column: column.to_string(),
            operator: operator.to_string(),
            value: value.into(),
        }))
    }

    pub fn where_json_contains(self, column: &str, value: impl Into<ClauseValue>) -> Self {
        self.push(Clause::and(ClauseKind::JsonContains {
            column: column.to_string(),
            value: value.into(),
            not: false,
        }))
    }

    pub fn where_json_doesnt_contain(self, column: &str, value: impl Into<ClauseValue>) -> Self {
        self.push(Clause::and(ClauseKind::JsonContains {
            column: column.to_string(),
            value: value.into(),
            not: true,
        }))
    }

    pub fn where_json_length(self, column: &str, operator: &str, length: i64) -> Self {
        self.push(Clause::and(ClauseKind::JsonLength {
            column: column.to_string(),
            operator: operator.to_string(),
            value: length.into(),
        }))
    }

    /// Raw predicate text, emitted unmodified. The caller is responsible for its safety.
    pub fn where_raw(self, cypher: &str, bindings: Parameters) -> Self {
        self.push(Clause::and(ClauseKind::Raw {
            sql: cypher.to_string(),
            bindings,
        }))
    }

    pub fn or_where_raw(self, cypher: &str, bindings: Parameters) -> Self {
        self.push(Clause::or(ClauseKind::Raw {
            sql: cypher.to_string(),
            bindings,
        }))
    }

    pub fn join(mut self, table: &str, first: &str, operator: &str, second: &str) -> Self {
        self.joins.push(Join {
            kind: JoinKind::Inner,
            table: table.to_string(),
            first: first.to_string(),
            operator: operator.to_string(),
            second: second.to_string(),
        });
        self
    }

    pub fn left_join(mut self, table: &str, first: &str, operator: &str, second: &str) -> Self {
        self.joins.push(Join {
            kind: JoinKind::Left,
            table: table.to_string(),
            first: first.to_string(),
            operator: operator.to_string(),
            second: second.to_string(),
        });
        self
    }

    pub fn outgoing(mut self, rel_type: &str, target_label: Option<&str>) -> Self {
        self.traversals
            .push(Traversal::new(Direction::Outgoing, rel_type, target_label));
        self
    }

    pub fn incoming(mut self, rel_type: &str, source_label: Option<&str>) -> Self {
        self.traversals
            .push(Traversal::new(Direction::Incoming, rel_type, source_label));
        self
    }

    pub fn bidirectional(mut self, rel_type: &str, label: Option<&str>) -> Self {
        self.traversals
            .push(Traversal::new(Direction::Both, rel_type, label));
        self
    }

    /// Columns to return, optionally aliased (`"posts.title as post_title"`).
    pub fn select<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn order_by(mut self, column: &str, direction: SortDirection) -> Self {
        self.orders.push(Order {
            column: column.to_string(),
            direction,
        });
        self
    }

    pub fn order_by_desc(self, column: &str) -> Self {
        self.order_by(column, SortDirection::Desc)
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Row query text, for inspection.
    pub fn to_cypher(&self) -> Result<String, CompilationError> {
        Ok(self.compile(&ReturnMode::Rows)?.cypher)
    }

    pub fn compile(&self, mode: &ReturnMode) -> Result<CompiledQuery, CompilationError> {
        self.compile_with(mode, self.capabilities)
    }

    /// Compile with explicit capabilities (a connection's, typically).
    pub fn compile_with(
        &self,
        mode: &ReturnMode,
        capabilities: Capabilities,
    ) -> Result<CompiledQuery, CompilationError> {
        for join in &self.joins {
            validate_variable(&join.table)?;
        }

        let traversal_vars = traversal_aliases(&self.traversals);
        let ctx = CompilationContext::new(self.label.as_deref(), capabilities).with_joins(
            self.joins
                .iter()
                .map(|j| (j.table.clone(), j.table.clone()))
                .chain(traversal_vars.iter().map(|a| (a.clone(), a.clone()))),
        );
        let mut binder = ParameterBinder::with_parameters(self.parameters.clone());

        let (inner, left): (Vec<&Join>, Vec<&Join>) =
            self.joins.iter().partition(|j| j.kind == JoinKind::Inner);

        let mut parts = Vec::new();

        let mut patterns = vec![node_pattern(DEFAULT_ALIAS, self.label.as_deref())];
        patterns.extend(
            inner
                .iter()
                .map(|j| node_pattern(&j.table, Some(j.table.as_str()))),
        );
        parts.push(format!("MATCH {}", patterns.join(", ")));

        let mut conditions = inner
            .iter()
            .map(|j| join_condition(j, &ctx))
            .collect::<Result<Vec<_>, _>>()?;
        let filter = compile_where(&self.wheres, &ctx, &mut binder)?;
        let (traversal_matches, return_alias) = traversal_clauses(&self.traversals, DEFAULT_ALIAS);

        // Traversal aliases must be bound before the filter can reference them.
        if left.is_empty() {
            parts.extend(traversal_matches);
            if !filter.is_empty() {
                conditions.push(if conditions.is_empty() {
                    filter
                } else {
                    format!("({})", filter)
                });
            }
            if !conditions.is_empty() {
                parts.push(format!("WHERE {}", conditions.join(" AND ")));
            }
        } else {
            if !conditions.is_empty() {
                parts.push(format!("WHERE {}", conditions.join(" AND ")));
            }
            for join in &left {
                parts.push(format!(
                    "OPTIONAL MATCH {} WHERE {}",
                    node_pattern(&join.table, Some(join.table.as_str())),
                    join_condition(join, &ctx)?
                ));
            }
            parts.extend(traversal_matches);
            if !filter.is_empty() {
                parts.push(format!("WITH * WHERE {}", filter));
            }
        }

        parts.push(self.return_clause(mode, &return_alias, &ctx)?);

        if *mode == ReturnMode::Rows {
            if !self.orders.is_empty() {
                let orders = self
                    .orders
                    .iter()
                    .map(|o| {
                        resolve_plain_column(&o.column, ClauseType::Select, &ctx)
                            .map(|p| format!("{} {}", p, o.direction.as_cypher()))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                parts.push(format!("ORDER BY {}", orders.join(", ")));
            }
            if let Some(offset) = self.offset {
                parts.push(format!("SKIP {}", offset));
            }
            if let Some(limit) = self.limit {
                parts.push(format!("LIMIT {}", limit));
            }
        }

        let cypher = parts.join(" ");
        log::debug!("Compiled query: {}", cypher);
        Ok(CompiledQuery::new(cypher, binder.into_parameters()))
    }

    fn return_clause(
        &self,
        mode: &ReturnMode,
        return_alias: &str,
        ctx: &CompilationContext,
    ) -> Result<String, CompilationError> {
        match mode {
            ReturnMode::Rows => {
                let projection = if self.columns.is_empty() {
                    return_alias.to_string()
                } else {
                    self.columns
                        .iter()
                        .map(|c| projection(c, return_alias, ctx))
                        .collect::<Result<Vec<_>, _>>()?
                        .join(", ")
                };
                let distinct = if self.distinct { "DISTINCT " } else { "" };
                Ok(format!("RETURN {}{}", distinct, projection))
            }
            ReturnMode::Count => {
                if !self.distinct {
                    return Ok("RETURN count(*) AS count".to_string());
                }
                let target = match self.columns.as_slice() {
                    [column] => resolve_plain_column(column, ClauseType::Select, ctx)?,
                    _ => return_alias.to_string(),
                };
                Ok(format!("RETURN count(DISTINCT {}) AS count", target))
            }
            ReturnMode::Aggregate(function, column) => Ok(format!(
                "RETURN {}({}) AS aggregate",
                function.as_cypher(),
                resolve_plain_column(column, ClauseType::Select, ctx)?
            )),
        }
    }

    pub(crate) async fn rows(&self, connection: &Connection) -> Result<Vec<Row>, ExecutionError> {
        let query = self.compile_with(&ReturnMode::Rows, connection.capabilities())?;
        connection.select(&query).await
    }

    /// Run the row query and hydrate each row to a property map.
    pub async fn get(
        &self,
        connection: &Connection,
    ) -> Result<Vec<serde_json::Map<String, Value>>, ExecutionError> {
        Ok(self.rows(connection).await?.iter().map(row_properties).collect())
    }

    pub async fn first(
        &self,
        connection: &Connection,
    ) -> Result<Option<serde_json::Map<String, Value>>, ExecutionError> {
        let rows = self.clone().limit(1).rows(connection).await?;
        Ok(rows.first().map(row_properties))
    }

    pub async fn count(&self, connection: &Connection) -> Result<i64, ExecutionError> {
        let query = self.compile_with(&ReturnMode::Count, connection.capabilities())?;
        let rows = connection.select(&query).await?;
        rows.first()
            .and_then(|row| row.get("count"))
            .and_then(GraphValue::as_i64)
            .ok_or_else(|| ExecutionError::UnexpectedResult("count query returned no count".into()))
    }

    /// `sum`/`avg`/`min`/`max` over `column`; `Null` when no rows match.
    pub async fn aggregate(
        &self,
        connection: &Connection,
        function: Aggregate,
        column: &str,
    ) -> Result<Value, ExecutionError> {
        let mode = ReturnMode::Aggregate(function, column.to_string());
        let query = self.compile_with(&mode, connection.capabilities())?;
        let rows = connection.select(&query).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get("aggregate"))
            .map(normalize)
            .unwrap_or(Value::Null))
    }
}

fn node_pattern(alias: &str, label: Option<&str>) -> String {
    match label.filter(|l| !l.is_empty()) {
        Some(label) => format!("({}:{})", alias, quote_identifier(label)),
        None => format!("({})", alias),
    }
}

/// Join tables double as Cypher variables.
fn validate_variable(name: &str) -> Result<(), CompilationError> {
    if is_identifier(name) && name != DEFAULT_ALIAS {
        Ok(())
    } else {
        Err(CompilationError::InvalidIdentifier {
            clause: ClauseType::Join,
            identifier: name.to_string(),
        })
    }
}

fn join_condition(join: &Join, ctx: &CompilationContext) -> Result<String, CompilationError> {
    let operator = Operator::parse(&join.operator)
        .filter(Operator::is_column_operator)
        .ok_or_else(|| {
            CompilationError::unsupported_operator(ClauseType::Join, &join.first, &join.operator)
        })?;
    Ok(format!(
        "{} {} {}",
        resolve_plain_column(&join.first, ClauseType::Join, ctx)?,
        operator.as_cypher(),
        resolve_plain_column(&join.second, ClauseType::Join, ctx)?
    ))
}

/// `column [as alias]` → `alias.property AS name`; `*` returns the whole node.
fn projection(
    column: &str,
    return_alias: &str,
    ctx: &CompilationContext,
) -> Result<String, CompilationError> {
    let column = column.trim();
    if column == "*" {
        return Ok(return_alias.to_string());
    }

    let lowered = column.to_ascii_lowercase();
    let (expression, alias) = match lowered.find(" as ") {
        Some(at) => (column[..at].trim(), Some(column[at + 4..].trim())),
        None => (column, None),
    };

    let property = resolve_plain_column(expression, ClauseType::Select, ctx)?;
    let name = match alias {
        Some(alias) => alias,
        None => expression.rsplit('.').next().unwrap_or(expression),
    };
    if !is_identifier(name) {
        return Err(CompilationError::InvalidIdentifier {
            clause: ClauseType::Select,
            identifier: name.to_string(),
        });
    }
    Ok(format!("{} AS {}", property, name))
}
