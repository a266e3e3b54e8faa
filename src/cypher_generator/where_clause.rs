//! Recursive WHERE compiler.
//!
//! Clauses are compiled in input order and joined with their own combinator. Fragments that
//! compile to nothing (empty nested groups, `NOT IN []` joined by `AND`) are dropped together
//! with their combinator, so the output never contains a dangling `AND`/`OR`. A `NOT IN []`
//! that takes part in an `OR` compiles to `1 = 1` instead.

use serde_json::Value;

use super::clause::{Boolean, Clause, ClauseKind, ClauseType, ClauseValue, SubQuery};
use super::column::{parse_column, property_reference, quote_identifier, resolve_plain_column};
use super::context::CompilationContext;
use super::errors::CompilationError;
use super::json_path::{self, JsonTarget};
use super::operators::Operator;
use super::parameters::ParameterBinder;
use super::temporal::{compile_temporal, TemporalPart};

/// Compile a clause list into a WHERE body (without the `WHERE` keyword).
///
/// The result is not parenthesized; callers embedding it as a sub-expression wrap it themselves.
pub fn compile_where(
    clauses: &[Clause],
    ctx: &CompilationContext,
    binder: &mut ParameterBinder,
) -> Result<String, CompilationError> {
    let mut out = String::new();

    for (index, clause) in clauses.iter().enumerate() {
        let mut fragment = compile_clause(&clause.kind, index, ctx, binder)?;
        if fragment.is_empty() {
            if !is_empty_not_in(&clause.kind) || !in_disjunction(clauses, index) {
                continue;
            }
            fragment = "1 = 1".to_string();
        }
        if !out.is_empty() {
            out.push(' ');
            out.push_str(clause.boolean.as_cypher());
            out.push(' ');
        }
        out.push_str(&fragment);
    }

    Ok(out)
}

fn is_empty_not_in(kind: &ClauseKind) -> bool {
    matches!(kind, ClauseKind::NotIn { values, .. } if values.is_empty())
}

/// Whether the clause at `index` is an operand of an `OR`, either its own or the next clause's.
fn in_disjunction(clauses: &[Clause], index: usize) -> bool {
    let own = index > 0 && clauses[index].boolean == Boolean::Or;
    let next = clauses
        .get(index + 1)
        .is_some_and(|c| c.boolean == Boolean::Or);
    own || next
}

fn compile_clause(
    kind: &ClauseKind,
    index: usize,
    ctx: &CompilationContext,
    binder: &mut ParameterBinder,
) -> Result<String, CompilationError> {
    match kind {
        ClauseKind::Basic {
            column,
            operator,
            value,
        } => compile_basic(column, operator, value, index, ctx, binder),
        ClauseKind::Column {
            first,
            operator,
            second,
        } => compile_column(first, operator, second, ctx),
        ClauseKind::Nested { query } => compile_nested(query, ctx, binder),
        ClauseKind::Exists { query, not } => compile_exists(query, *not, ctx, binder),
        ClauseKind::In { column, values } => compile_in(column, values, false, index, ctx, binder),
        ClauseKind::NotIn { column, values } => {
            compile_in(column, values, true, index, ctx, binder)
        }
        ClauseKind::Null { column } => Ok(format!(
            "{} IS NULL",
            resolve_plain_column(column, ClauseType::Null, ctx)?
        )),
        ClauseKind::NotNull { column } => Ok(format!(
            "{} IS NOT NULL",
            resolve_plain_column(column, ClauseType::NotNull, ctx)?
        )),
        ClauseKind::Between { column, values } => {
            compile_between(column, values, false, index, ctx, binder)
        }
        ClauseKind::NotBetween { column, values } => {
            compile_between(column, values, true, index, ctx, binder)
        }
        ClauseKind::Date {
            column,
            operator,
            value,
        } => compile_part(TemporalPart::Date, column, operator, value, index, ctx, binder),
        ClauseKind::Month {
            column,
            operator,
            value,
        } => compile_part(TemporalPart::Month, column, operator, value, index, ctx, binder),
        ClauseKind::Day {
            column,
            operator,
            value,
        } => compile_part(TemporalPart::Day, column, operator, value, index, ctx, binder),
        ClauseKind::Year {
            column,
            operator,
            value,
        } => compile_part(TemporalPart::Year, column, operator, value, index, ctx, binder),
        ClauseKind::Time {
            column,
            operator,
            value,
        } => compile_part(TemporalPart::Time, column, operator, value, index, ctx, binder),
        ClauseKind::JsonContains { column, value, not } => {
            let reference = parse_column(column, ClauseType::JsonContains)?;
            let property = property_reference(&reference, ctx);
            let target = JsonTarget {
                column,
                reference: &reference,
                property: &property,
                index,
                capabilities: ctx.capabilities,
            };
            json_path::compile_json_contains(&target, value, *not, binder)
        }
        ClauseKind::JsonLength {
            column,
            operator,
            value,
        } => {
            let op = parse_operator(ClauseType::JsonLength, column, operator)?;
            let reference = parse_column(column, ClauseType::JsonLength)?;
            let property = property_reference(&reference, ctx);
            let target = JsonTarget {
                column,
                reference: &reference,
                property: &property,
                index,
                capabilities: ctx.capabilities,
            };
            json_path::compile_json_length(&target, op, value, binder)
        }
        // Trusted escape hatch: the text is emitted as given.
        ClauseKind::Raw { sql, bindings } => {
            binder.merge(bindings)?;
            Ok(sql.trim().to_string())
        }
    }
}

fn parse_operator(
    clause: ClauseType,
    column: &str,
    token: &str,
) -> Result<Operator, CompilationError> {
    Operator::parse(token)
        .ok_or_else(|| CompilationError::unsupported_operator(clause, column, token.trim()))
}

fn compile_basic(
    column: &str,
    operator: &str,
    value: &ClauseValue,
    index: usize,
    ctx: &CompilationContext,
    binder: &mut ParameterBinder,
) -> Result<String, CompilationError> {
    let op = parse_operator(ClauseType::Basic, column, operator)?;
    let reference = parse_column(column, ClauseType::Basic)?;

    if reference.has_json_path() {
        let property = property_reference(&reference, ctx);
        let target = JsonTarget {
            column,
            reference: &reference,
            property: &property,
            index,
            capabilities: ctx.capabilities,
        };
        return json_path::compile_json_compare(&target, op, value, binder);
    }

    let property = property_reference(&reference, ctx);

    if value.is_null() {
        return match op {
            Operator::Eq => Ok(format!("{} IS NULL", property)),
            Operator::NotEq => Ok(format!("{} IS NOT NULL", property)),
            other => Err(CompilationError::NullComparison {
                column: column.to_string(),
                operator: other.as_cypher().to_string(),
            }),
        };
    }

    if let Some(values) = value.as_list() {
        return match op {
            Operator::Eq | Operator::In => compile_in(column, &values, false, index, ctx, binder),
            Operator::NotEq | Operator::NotIn => {
                compile_in(column, &values, true, index, ctx, binder)
            }
            other => Err(CompilationError::unsupported_value(
                ClauseType::Basic,
                column,
                format!("a list cannot be compared with '{}'", other),
            )),
        };
    }

    match op {
        Operator::Like | Operator::NotLike => {
            let needle = match value.as_str() {
                Some(text) => Value::String(text.replace('%', "")),
                None => value.to_parameter(),
            };
            let param = binder.bind(column, index, needle);
            if op == Operator::Like {
                Ok(format!("{} CONTAINS ${}", property, param))
            } else {
                Ok(format!("NOT ({} CONTAINS ${})", property, param))
            }
        }
        Operator::In => compile_in(column, std::slice::from_ref(value), false, index, ctx, binder),
        Operator::NotIn => compile_in(column, std::slice::from_ref(value), true, index, ctx, binder),
        other => {
            let param = binder.bind(column, index, value.to_parameter());
            Ok(format!("{} {} ${}", property, other.as_cypher(), param))
        }
    }
}

/// `a = b` also holds when both sides are NULL, matching SQL's null-safe column comparison
/// used by the query builder.
fn compile_column(
    first: &str,
    operator: &str,
    second: &str,
    ctx: &CompilationContext,
) -> Result<String, CompilationError> {
    let op = parse_operator(ClauseType::Column, first, operator)?;
    if !op.is_column_operator() {
        return Err(CompilationError::unsupported_operator(
            ClauseType::Column,
            first,
            op.as_cypher(),
        ));
    }

    let left = resolve_plain_column(first, ClauseType::Column, ctx)?;
    let right = resolve_plain_column(second, ClauseType::Column, ctx)?;

    if op == Operator::Eq {
        Ok(format!(
            "({l} = {r} OR ({l} IS NULL AND {r} IS NULL))",
            l = left,
            r = right
        ))
    } else {
        Ok(format!("{} {} {}", left, op.as_cypher(), right))
    }
}

fn compile_nested(
    query: &SubQuery,
    ctx: &CompilationContext,
    binder: &mut ParameterBinder,
) -> Result<String, CompilationError> {
    let inner = compile_where(&query.wheres, &ctx.nested(), binder)?;
    if inner.is_empty() {
        Ok(String::new())
    } else {
        Ok(format!("({})", inner))
    }
}

fn compile_exists(
    query: &SubQuery,
    not: bool,
    ctx: &CompilationContext,
    binder: &mut ParameterBinder,
) -> Result<String, CompilationError> {
    let label = query.label.as_deref().filter(|l| !l.trim().is_empty());
    let scope = ctx.exists_scope(label);

    let pattern = match label {
        Some(label) => format!("({}:{})", scope.current_alias, quote_identifier(label)),
        None => format!("({})", scope.current_alias),
    };

    let body = compile_where(&query.wheres, &scope, binder)?;
    let block = if body.is_empty() {
        format!("EXISTS {{ MATCH {} }}", pattern)
    } else {
        format!("EXISTS {{ MATCH {} WHERE {} }}", pattern, body)
    };

    Ok(if not { format!("NOT ({})", block) } else { block })
}

fn compile_in(
    column: &str,
    values: &[ClauseValue],
    negated: bool,
    index: usize,
    ctx: &CompilationContext,
    binder: &mut ParameterBinder,
) -> Result<String, CompilationError> {
    let clause = if negated {
        ClauseType::NotIn
    } else {
        ClauseType::In
    };
    let property = resolve_plain_column(column, clause, ctx)?;

    if values.is_empty() {
        // IN [] matches nothing, NOT IN [] constrains nothing.
        return Ok(if negated {
            String::new()
        } else {
            "1 = 0".to_string()
        });
    }

    let mut list = Vec::with_capacity(values.len());
    for value in values {
        let bound = value.to_parameter();
        if bound.is_array() || bound.is_object() {
            return Err(CompilationError::unsupported_value(
                clause,
                column,
                "list elements must be scalars",
            ));
        }
        list.push(bound);
    }

    if negated {
        let param = binder.bind_suffixed(column, index, "notin", Value::Array(list));
        Ok(format!("NOT ({} IN ${})", property, param))
    } else {
        let param = binder.bind_suffixed(column, index, "in", Value::Array(list));
        Ok(format!("{} IN ${}", property, param))
    }
}

fn compile_between(
    column: &str,
    values: &[ClauseValue],
    negated: bool,
    index: usize,
    ctx: &CompilationContext,
    binder: &mut ParameterBinder,
) -> Result<String, CompilationError> {
    let clause = if negated {
        ClauseType::NotBetween
    } else {
        ClauseType::Between
    };
    let [low, high] = values else {
        return Err(CompilationError::InvalidBetweenArity {
            clause,
            column: column.to_string(),
            found: values.len(),
        });
    };

    let property = resolve_plain_column(column, clause, ctx)?;
    let (min, max) = binder.bind_range(column, index, low.to_parameter(), high.to_parameter());
    let range = format!(
        "{p} >= ${min} AND {p} <= ${max}",
        p = property,
        min = min,
        max = max
    );

    Ok(if negated {
        format!("NOT ({})", range)
    } else {
        range
    })
}

fn compile_part(
    part: TemporalPart,
    column: &str,
    operator: &str,
    value: &ClauseValue,
    index: usize,
    ctx: &CompilationContext,
    binder: &mut ParameterBinder,
) -> Result<String, CompilationError> {
    let clause = part.clause_type();
    let op = parse_operator(clause, column, operator)?;
    let property = resolve_plain_column(column, clause, ctx)?;
    compile_temporal(part, &property, column, op, value, index, binder)
}
