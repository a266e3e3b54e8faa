//! Hybrid JSON/array resolution.
//!
//! Flat arrays are stored as native lists, nested or associative structures as JSON strings, and
//! a single property may hold either representation depending on the row. Every expression built
//! here therefore branches at query time:
//!
//! - outer branch on the stored type (`NULL`, native `LIST`/scalar, `STRING`)
//! - inner branch on the parsed or native value (`LIST` → membership, scalar → equality)
//!
//! With APOC the `STRING` branch parses via `apoc.convert.fromJsonMap` / `fromJsonList`.
//! Without it, the `STRING` branch falls back to substring matching on the raw JSON text, which
//! misses matches that differ only by number formatting or key order.
//!
//! Branches are nested `CASE` expressions rather than `AND` chains: Cypher does not promise
//! short-circuit evaluation, and `trim()` on a list is a type error.

use serde_json::Value;

use super::clause::{ClauseType, ClauseValue};
use super::column::{ColumnRef, PathSegment};
use super::context::Capabilities;
use super::errors::CompilationError;
use super::operators::Operator;
use super::parameters::ParameterBinder;

/// Keys whose JSON value is conventionally an array; the no-APOC fallback searches for the bare
/// element instead of `"key":value`.
pub const ARRAY_LIKE_KEYS: &[&str] = &[
    "tags",
    "roles",
    "permissions",
    "categories",
    "items",
    "ids",
    "languages",
    "skills",
    "keywords",
    "labels",
    "groups",
    "scopes",
];

/// Inputs shared by the JSON sub-compilers.
pub struct JsonTarget<'a> {
    /// Raw column text as written by the caller (drives parameter naming).
    pub column: &'a str,
    /// Parsed reference (JSON path segments).
    pub reference: &'a ColumnRef,
    /// Resolved `alias.property` of the stored value.
    pub property: &'a str,
    pub index: usize,
    pub capabilities: Capabilities,
}

fn is_list(expr: &str) -> String {
    format!("valueType({}) STARTS WITH 'LIST'", expr)
}

fn is_string(expr: &str) -> String {
    format!("valueType({}) STARTS WITH 'STRING'", expr)
}

fn is_map(expr: &str) -> String {
    format!("valueType({}) STARTS WITH 'MAP'", expr)
}

/// Opening character of the JSON document a path navigates into.
fn document_open(path: &[PathSegment]) -> char {
    match path.first() {
        Some(PathSegment::Index(_)) => '[',
        _ => '{',
    }
}

/// APOC access expression for a path inside the JSON string stored at `property`.
fn parsed_path_access(property: &str, path: &[PathSegment]) -> String {
    let document = match document_open(path) {
        '[' => format!("apoc.convert.fromJsonList({})", property),
        _ => format!("apoc.convert.fromJsonMap({})", property),
    };
    apply_path(document, path)
}

/// Direct access into a native LIST property, for paths that start with an index.
fn native_list_access(property: &str, path: &[PathSegment]) -> Option<String> {
    match path.first() {
        Some(PathSegment::Index(_)) => Some(apply_path(property.to_string(), path)),
        _ => None,
    }
}

fn apply_path(mut expr: String, path: &[PathSegment]) -> String {
    for segment in path {
        match segment {
            PathSegment::Key(key) => {
                expr = format!("({}).{}", expr, key);
            }
            PathSegment::Index(index) => {
                expr = format!("({})[{}]", expr, index);
            }
        }
    }
    expr
}

/// Membership/equality test on a value that is already parsed or native.
fn membership_test(target: &str, param: &str, value_is_list: bool) -> String {
    let hit = if value_is_list {
        format!("all(json_item IN ${} WHERE json_item IN {})", param, target)
    } else {
        format!("${} IN {}", param, target)
    };
    let scalar = if value_is_list {
        "false".to_string()
    } else {
        format!("{} = ${}", target, param)
    };
    format!(
        "CASE WHEN {t} IS NULL THEN false WHEN {list} THEN {hit} ELSE {scalar} END",
        t = target,
        list = is_list(target),
        hit = hit,
        scalar = scalar,
    )
}

/// Value bound for containment. Lists stay lists; maps cannot be bound.
fn containment_value(target: &JsonTarget<'_>, value: &ClauseValue) -> Result<(Value, bool), CompilationError> {
    match value {
        ClauseValue::Json(Value::Object(_)) => Err(CompilationError::unsupported_value(
            ClauseType::JsonContains,
            target.column,
            "object values cannot be bound; pass a scalar or a list of scalars",
        )),
        ClauseValue::Json(Value::Array(items)) => {
            if items.iter().any(|v| v.is_object() || v.is_array()) {
                return Err(CompilationError::unsupported_value(
                    ClauseType::JsonContains,
                    target.column,
                    "list values must contain scalars only",
                ));
            }
            Ok((Value::Array(items.clone()), true))
        }
        other => Ok((other.to_parameter(), false)),
    }
}

/// Substring needles searched in the raw JSON text when APOC is unavailable.
fn fallback_needles(reference: &ColumnRef, value: &Value) -> Vec<Value> {
    let elements: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    let encode = |v: &Value| serde_json::to_string(v).unwrap_or_default();

    let key_search = match reference.json_path.last() {
        Some(PathSegment::Key(key)) => !ARRAY_LIKE_KEYS.contains(&key.as_str()) && !value.is_array(),
        _ => false,
    };

    if key_search {
        let key = reference.last_key().unwrap_or_default();
        let key = encode(&Value::String(key.to_string()));
        let encoded = encode(value);
        vec![
            Value::String(format!("{}:{}", key, encoded)),
            Value::String(format!("{}: {}", key, encoded)),
        ]
    } else {
        elements
            .into_iter()
            .map(|v| Value::String(encode(v)))
            .collect()
    }
}

/// `JSON_CONTAINS(column[->path], value)` equivalent.
pub fn compile_json_contains(
    target: &JsonTarget<'_>,
    value: &ClauseValue,
    not: bool,
    binder: &mut ParameterBinder,
) -> Result<String, CompilationError> {
    if value.is_null() {
        return Err(CompilationError::unsupported_value(
            ClauseType::JsonContains,
            target.column,
            "cannot test containment of NULL",
        ));
    }
    let (bound, value_is_list) = containment_value(target, value)?;
    let property = target.property;
    let path = &target.reference.json_path;

    let expr = if target.capabilities.apoc {
        let param = binder.bind(target.column, target.index, bound);
        if path.is_empty() {
            format!(
                "CASE WHEN {p} IS NULL THEN false WHEN {string} THEN CASE WHEN trim({p}) STARTS WITH '[' THEN {parsed} ELSE {p} = ${param} END ELSE {native} END",
                p = property,
                string = is_string(property),
                parsed = membership_test(
                    &format!("apoc.convert.fromJsonList({})", property),
                    &param,
                    value_is_list
                ),
                param = param,
                native = membership_test(property, &param, value_is_list),
            )
        } else {
            let native = match native_list_access(property, path) {
                Some(access) => format!(
                    "CASE WHEN {list} THEN {hit} ELSE false END",
                    list = is_list(property),
                    hit = membership_test(&access, &param, value_is_list),
                ),
                None => "false".to_string(),
            };
            format!(
                "CASE WHEN {p} IS NULL THEN false WHEN {string} THEN CASE WHEN trim({p}) STARTS WITH '{open}' THEN {parsed} ELSE false END ELSE {native} END",
                p = property,
                string = is_string(property),
                open = document_open(path),
                parsed = membership_test(&parsed_path_access(property, path), &param, value_is_list),
                native = native,
            )
        }
    } else {
        let needles = Value::Array(fallback_needles(target.reference, &bound));
        let quantifier = if value_is_list { "all" } else { "any" };
        if path.is_empty() {
            let (param, json_param) =
                binder.bind_with_companion(target.column, target.index, bound, "json", needles);
            format!(
                "CASE WHEN {p} IS NULL THEN false WHEN {list} THEN {native} WHEN {string} THEN ({p} = ${param} OR {q}(needle IN ${json} WHERE {p} CONTAINS needle)) ELSE {p} = ${param} END",
                p = property,
                list = is_list(property),
                native = if value_is_list {
                    format!("all(json_item IN ${} WHERE json_item IN {})", param, property)
                } else {
                    format!("${} IN {}", param, property)
                },
                string = is_string(property),
                param = param,
                q = quantifier,
                json = json_param,
            )
        } else if let Some(access) = native_list_access(property, path) {
            let (param, json_param) =
                binder.bind_with_companion(target.column, target.index, bound, "json", needles);
            format!(
                "CASE WHEN {p} IS NULL THEN false WHEN {list} THEN {native} WHEN {string} THEN {q}(needle IN ${json} WHERE {p} CONTAINS needle) ELSE false END",
                p = property,
                list = is_list(property),
                native = membership_test(&access, &param, value_is_list),
                string = is_string(property),
                q = quantifier,
                json = json_param,
            )
        } else {
            let json_param = binder.bind_suffixed(target.column, target.index, "json", needles);
            format!(
                "CASE WHEN {p} IS NULL THEN false WHEN {string} THEN {q}(needle IN ${json} WHERE {p} CONTAINS needle) ELSE false END",
                p = property,
                string = is_string(property),
                q = quantifier,
                json = json_param,
            )
        }
    };

    Ok(if not { format!("NOT ({})", expr) } else { expr })
}

/// Size of a parsed or native value: lists and maps by element count, scalars count as 1.
fn size_of(target: &str) -> String {
    format!(
        "CASE WHEN {t} IS NULL THEN 0 WHEN {list} THEN size({t}) WHEN {map} THEN size(keys({t})) ELSE 1 END",
        t = target,
        list = is_list(target),
        map = is_map(target),
    )
}

/// Whether `length <op> n` over non-negative lengths reduces to an emptiness test.
/// `Some(true)`: holds exactly for empty values. `Some(false)`: exactly for non-empty ones.
fn emptiness_check(operator: Operator, n: i64) -> Option<bool> {
    match (operator, n) {
        (Operator::Eq, 0) | (Operator::Lte, 0) | (Operator::Lt, 1) => Some(true),
        (Operator::Gt, 0) | (Operator::Gte, 1) | (Operator::NotEq, 0) => Some(false),
        _ => None,
    }
}

fn degrade_length(target: &JsonTarget<'_>, reason: &str) -> Result<String, CompilationError> {
    if target.capabilities.lenient_json_length {
        log::warn!(
            "JSON length check on '{}' cannot be evaluated without APOC ({}); emitting always-true placeholder",
            target.column,
            reason
        );
        Ok("true".to_string())
    } else {
        Err(CompilationError::RequiresExtendedJson {
            clause: ClauseType::JsonLength,
            column: target.column.to_string(),
            reason: reason.to_string(),
        })
    }
}

/// `JSON_LENGTH(column[->path]) <op> value` equivalent.
pub fn compile_json_length(
    target: &JsonTarget<'_>,
    operator: Operator,
    value: &ClauseValue,
    binder: &mut ParameterBinder,
) -> Result<String, CompilationError> {
    if !operator.is_comparison() {
        return Err(CompilationError::unsupported_operator(
            ClauseType::JsonLength,
            target.column,
            operator.as_cypher(),
        ));
    }
    let n = value.as_i64().ok_or_else(|| {
        CompilationError::unsupported_value(
            ClauseType::JsonLength,
            target.column,
            "length must be an integer",
        )
    })?;
    let property = target.property;
    let path = &target.reference.json_path;
    let op = operator.as_cypher();

    if target.capabilities.apoc {
        let length = if path.is_empty() {
            format!(
                "CASE WHEN {p} IS NULL THEN 0 WHEN {list} THEN size({p}) WHEN {string} THEN CASE WHEN trim({p}) STARTS WITH '[' THEN size(apoc.convert.fromJsonList({p})) WHEN trim({p}) STARTS WITH '{{' THEN size(keys(apoc.convert.fromJsonMap({p}))) ELSE 1 END ELSE 1 END",
                p = property,
                list = is_list(property),
                string = is_string(property),
            )
        } else {
            format!(
                "CASE WHEN {p} IS NULL THEN 0 WHEN {string} THEN CASE WHEN trim({p}) STARTS WITH '{open}' THEN {size} ELSE 0 END ELSE 0 END",
                p = property,
                string = is_string(property),
                open = document_open(path),
                size = size_of(&parsed_path_access(property, path)),
            )
        };
        let param = binder.bind_suffixed(target.column, target.index, "length", Value::from(n));
        return Ok(format!("({}) {} ${}", length, op, param));
    }

    if !path.is_empty() {
        return degrade_length(target, "nested path lengths need JSON parsing");
    }

    let string_branch = match emptiness_check(operator, n) {
        Some(true) => format!("trim({}) IN ['[]', '{{}}', '']", property),
        Some(false) => format!("NOT trim({}) IN ['[]', '{{}}', '']", property),
        None => degrade_length(target, "only empty/non-empty checks are exact on JSON strings")?,
    };
    let param = binder.bind_suffixed(target.column, target.index, "length", Value::from(n));
    Ok(format!(
        "CASE WHEN {p} IS NULL THEN 0 {op} ${param} WHEN {list} THEN size({p}) {op} ${param} WHEN {string} THEN {string_branch} ELSE 1 {op} ${param} END",
        p = property,
        op = op,
        param = param,
        list = is_list(property),
        string = is_string(property),
        string_branch = string_branch,
    ))
}

/// Basic comparison on `column->path`. With APOC the path value is extracted and compared;
/// without it only `=` and `<>` are expressible (as substring containment).
pub fn compile_json_compare(
    target: &JsonTarget<'_>,
    operator: Operator,
    value: &ClauseValue,
    binder: &mut ParameterBinder,
) -> Result<String, CompilationError> {
    let property = target.property;
    let path = &target.reference.json_path;

    if target.capabilities.apoc {
        let extracted = format!(
            "CASE WHEN {p} IS NULL THEN null WHEN {string} THEN CASE WHEN trim({p}) STARTS WITH '{open}' THEN {access} ELSE null END ELSE null END",
            p = property,
            string = is_string(property),
            open = document_open(path),
            access = parsed_path_access(property, path),
        );
        if value.is_null() {
            return match operator {
                Operator::Eq => Ok(format!("({}) IS NULL", extracted)),
                Operator::NotEq => Ok(format!("({}) IS NOT NULL", extracted)),
                _ => Err(CompilationError::NullComparison {
                    column: target.column.to_string(),
                    operator: operator.as_cypher().to_string(),
                }),
            };
        }
        let param = binder.bind(target.column, target.index, value.to_parameter());
        return Ok(format!("({}) {} ${}", extracted, operator.as_cypher(), param));
    }

    match operator {
        Operator::Eq => compile_json_contains(target, value, false, binder),
        Operator::NotEq => compile_json_contains(target, value, true, binder),
        other => Err(CompilationError::RequiresExtendedJson {
            clause: ClauseType::Basic,
            column: target.column.to_string(),
            reason: format!("operator '{}' on a JSON path needs JSON parsing", other),
        }),
    }
}
