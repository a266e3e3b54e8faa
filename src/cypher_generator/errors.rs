use thiserror::Error;

use super::clause::ClauseType;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompilationError {
    #[error("Invalid identifier '{identifier}' in {clause} clause (allowed: letters, digits, underscores; must not start with a digit)")]
    InvalidIdentifier {
        clause: ClauseType,
        identifier: String,
    },
    #[error("Unsupported operator '{operator}' in {clause} clause on column '{column}'")]
    UnsupportedOperator {
        clause: ClauseType,
        column: String,
        operator: String,
    },
    #[error("{clause} clause on column '{column}' expects exactly 2 values, got {found}")]
    InvalidBetweenArity {
        clause: ClauseType,
        column: String,
        found: usize,
    },
    #[error("Cannot compare column '{column}' against NULL with operator '{operator}' (only = and <> are allowed)")]
    NullComparison { column: String, operator: String },
    #[error("Unsupported value for {clause} clause on column '{column}': {reason}")]
    UnsupportedValue {
        clause: ClauseType,
        column: String,
        reason: String,
    },
    #[error("{clause} clause on column '{column}' requires extended JSON procedures (APOC): {reason}")]
    RequiresExtendedJson {
        clause: ClauseType,
        column: String,
        reason: String,
    },
    #[error("Parameter '{name}' is bound twice with different values")]
    ParameterConflict { name: String },
    #[error("Record {record} has no value for merge key '{key}'")]
    MissingMergeKey { key: String, record: usize },
}

impl CompilationError {
    pub(crate) fn unsupported_value(
        clause: ClauseType,
        column: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        CompilationError::UnsupportedValue {
            clause,
            column: column.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported_operator(
        clause: ClauseType,
        column: impl Into<String>,
        operator: impl Into<String>,
    ) -> Self {
        CompilationError::UnsupportedOperator {
            clause,
            column: column.into(),
            operator: operator.into(),
        }
    }
}
