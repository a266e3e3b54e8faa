//! Date / Month / Day / Year / Time extraction predicates.
//!
//! Stored values may be ISO datetimes (`2024-03-09T10:00:00`, native temporals render the same
//! way through `toString`) or plain strings (`2024-03-09 10:00:00`, `2024-03-09`, `10:00:00`).
//! The emitted `CASE` uses the native temporal functions when the `T` marker is present and
//! fixed-offset substrings otherwise. `NULL` never matches.
//!
//! Time-only values (`10:00:00`, `10:00:00.123`, or a native zoned time rendered as
//! `10:00:00Z`) are told apart from date-prefixed strings by the `-` after the year, not by
//! length.

use serde_json::Value;

use super::clause::{ClauseType, ClauseValue};
use super::errors::CompilationError;
use super::operators::Operator;
use super::parameters::ParameterBinder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalPart {
    Date,
    Month,
    Day,
    Year,
    Time,
}

impl TemporalPart {
    pub(crate) fn clause_type(&self) -> ClauseType {
        match self {
            TemporalPart::Date => ClauseType::Date,
            TemporalPart::Month => ClauseType::Month,
            TemporalPart::Day => ClauseType::Day,
            TemporalPart::Year => ClauseType::Year,
            TemporalPart::Time => ClauseType::Time,
        }
    }

    /// Value to bind, normalized to what the emitted expression compares against.
    fn bind_value(&self, column: &str, value: &ClauseValue) -> Result<Value, CompilationError> {
        let invalid = |reason: &str| {
            CompilationError::unsupported_value(self.clause_type(), column, reason.to_string())
        };

        match self {
            TemporalPart::Date => match value {
                ClauseValue::Date(_) => Ok(value.to_parameter()),
                ClauseValue::DateTime(dt) => {
                    Ok(ClauseValue::Date(dt.date()).to_parameter())
                }
                ClauseValue::Json(Value::String(s)) => {
                    Ok(Value::String(s.chars().take(10).collect()))
                }
                _ => Err(invalid("expected a date or a YYYY-MM-DD string")),
            },
            TemporalPart::Year | TemporalPart::Month | TemporalPart::Day => {
                if let Some((year, month, day)) = value.date_parts() {
                    let part = match self {
                        TemporalPart::Year => i64::from(year),
                        TemporalPart::Month => i64::from(month),
                        _ => i64::from(day),
                    };
                    return Ok(Value::from(part));
                }
                value
                    .as_i64()
                    .map(Value::from)
                    .ok_or_else(|| invalid("expected an integer"))
            }
            TemporalPart::Time => value
                .time_string()
                .map(Value::String)
                .ok_or_else(|| invalid("expected a time or an HH:MM:SS string")),
        }
    }
}

pub fn compile_temporal(
    part: TemporalPart,
    property: &str,
    column: &str,
    operator: Operator,
    value: &ClauseValue,
    index: usize,
    binder: &mut ParameterBinder,
) -> Result<String, CompilationError> {
    if !operator.is_comparison() {
        return Err(CompilationError::unsupported_operator(
            part.clause_type(),
            column,
            operator.as_cypher(),
        ));
    }
    let bound = part.bind_value(column, value)?;
    let param = binder.bind(column, index, bound);
    let op = operator.as_cypher();
    let text = format!("toString({})", property);

    let branches = match part {
        TemporalPart::Date => format!(
            "WHEN {s} CONTAINS 'T' THEN date(datetime({s})) {op} date(${param}) ELSE substring({s}, 0, 10) {op} ${param}",
            s = text,
            op = op,
            param = param,
        ),
        TemporalPart::Year => format!(
            "WHEN {s} CONTAINS 'T' THEN datetime({s}).year {op} ${param} ELSE toInteger(substring({s}, 0, 4)) {op} ${param}",
            s = text,
            op = op,
            param = param,
        ),
        TemporalPart::Month => format!(
            "WHEN {s} CONTAINS 'T' THEN datetime({s}).month {op} ${param} ELSE toInteger(substring({s}, 5, 2)) {op} ${param}",
            s = text,
            op = op,
            param = param,
        ),
        TemporalPart::Day => format!(
            "WHEN {s} CONTAINS 'T' THEN datetime({s}).day {op} ${param} ELSE toInteger(substring({s}, 8, 2)) {op} ${param}",
            s = text,
            op = op,
            param = param,
        ),
        TemporalPart::Time => format!(
            "WHEN {s} CONTAINS 'T' THEN localtime(datetime({s})) {op} localtime(${param}) WHEN substring({s}, 4, 1) = '-' THEN substring({s}, 11, 8) {op} ${param} ELSE substring({s}, 0, 8) {op} ${param}",
            s = text,
            op = op,
            param = param,
        ),
    };

    Ok(format!(
        "CASE WHEN {} IS NULL THEN false {} END",
        property, branches
    ))
}
