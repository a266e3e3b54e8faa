use std::fmt;

use serde::Serialize;
use thiserror::Error;

use super::classify::ErrorClass;
use super::driver::{DriverError, Endpoint};
use crate::cypher_generator::{CompilationError, CompiledQuery, Parameters};

/// The compiled text and parameters of the statement that failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryDiagnostics {
    pub cypher: String,
    pub parameters: Parameters,
}

impl QueryDiagnostics {
    pub fn new(cypher: impl Into<String>, parameters: Parameters) -> Self {
        Self {
            cypher: cypher.into(),
            parameters,
        }
    }
}

impl From<&CompiledQuery> for QueryDiagnostics {
    fn from(query: &CompiledQuery) -> Self {
        Self::new(query.cypher.clone(), query.parameters.clone())
    }
}

impl fmt::Display for QueryDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parameters =
            serde_json::to_string(&self.parameters).unwrap_or_else(|_| "<unprintable>".to_string());
        write!(f, "cypher: {} | parameters: {}", self.cypher, parameters)
    }
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Query compilation failed: {0}")]
    Compilation(#[from] CompilationError),

    #[error("Transient failure after {attempts} attempt(s): {source} ({diagnostics})")]
    Transient {
        source: DriverError,
        attempts: u32,
        diagnostics: QueryDiagnostics,
    },

    #[error("Query failed: {source} ({diagnostics})")]
    Permanent {
        source: DriverError,
        diagnostics: QueryDiagnostics,
    },

    #[error("Connection to {host}:{port} failed: {source}")]
    Connection {
        host: String,
        port: u16,
        source: DriverError,
        diagnostics: Option<QueryDiagnostics>,
    },

    #[error("Cannot hydrate row {row}: {message}")]
    Hydration { row: usize, message: String },

    #[error("Batch chunk {chunk} ({records} record(s)) failed: {source}")]
    Batch {
        chunk: usize,
        records: usize,
        source: Box<ExecutionError>,
    },

    #[error("Transaction already committed or rolled back")]
    TransactionClosed,

    #[error("Unexpected result shape: {0}")]
    UnexpectedResult(String),
}

impl ExecutionError {
    /// Wrap a driver failure according to its classification.
    pub fn from_driver(
        source: DriverError,
        class: ErrorClass,
        endpoint: &Endpoint,
        diagnostics: QueryDiagnostics,
    ) -> Self {
        match class {
            ErrorClass::Transient => ExecutionError::Transient {
                source,
                attempts: 1,
                diagnostics,
            },
            ErrorClass::Connection | ErrorClass::Authentication => ExecutionError::Connection {
                host: endpoint.host.clone(),
                port: endpoint.port,
                source,
                diagnostics: Some(diagnostics),
            },
            ErrorClass::Permanent => ExecutionError::Permanent {
                source,
                diagnostics,
            },
        }
    }

    /// Whether the retry manager may run the unit of work again.
    pub fn is_retryable(&self) -> bool {
        match self {
            ExecutionError::Transient { .. } => true,
            ExecutionError::Connection { source, .. } => {
                matches!(source, DriverError::Connection { .. })
            }
            _ => false,
        }
    }

    pub fn diagnostics(&self) -> Option<&QueryDiagnostics> {
        match self {
            ExecutionError::Transient { diagnostics, .. }
            | ExecutionError::Permanent { diagnostics, .. } => Some(diagnostics),
            ExecutionError::Connection { diagnostics, .. } => diagnostics.as_ref(),
            ExecutionError::Batch { source, .. } => source.diagnostics(),
            _ => None,
        }
    }

    /// Attach the statement to a connection failure raised outside any statement (a failed
    /// reconnect between attempts). Errors that already carry diagnostics are left alone.
    pub(crate) fn with_diagnostics(self, diagnostics: QueryDiagnostics) -> Self {
        match self {
            ExecutionError::Connection {
                host,
                port,
                source,
                diagnostics: None,
            } => ExecutionError::Connection {
                host,
                port,
                source,
                diagnostics: Some(diagnostics),
            },
            other => other,
        }
    }

    pub(crate) fn with_attempts(self, attempts: u32) -> Self {
        match self {
            ExecutionError::Transient {
                source,
                diagnostics,
                ..
            } => ExecutionError::Transient {
                source,
                attempts,
                diagnostics,
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn diagnostics() -> QueryDiagnostics {
        QueryDiagnostics::new(
            "MATCH (n:User) WHERE n.age > $age_0 RETURN n",
            [("age_0", json!(25))].into_iter().collect(),
        )
    }

    #[test]
    fn test_permanent_error_carries_query() {
        let err = ExecutionError::from_driver(
            DriverError::database("Neo.ClientError.Statement.SyntaxError", "bad input"),
            ErrorClass::Permanent,
            &Endpoint::new("localhost", 7687),
            diagnostics(),
        );
        let message = err.to_string();
        assert!(message.contains("MATCH (n:User) WHERE n.age > $age_0 RETURN n"));
        assert!(message.contains("\"age_0\":25"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_connection_error_carries_host_and_port() {
        let err = ExecutionError::from_driver(
            DriverError::Connection {
                host: "db.internal".into(),
                port: 7687,
                message: "connection refused".into(),
            },
            ErrorClass::Connection,
            &Endpoint::new("db.internal", 7687),
            diagnostics(),
        );
        assert!(err.to_string().starts_with("Connection to db.internal:7687 failed"));
        assert!(err.is_retryable());
        assert!(err.diagnostics().is_some());
    }

    #[test]
    fn test_reconnect_failure_gains_statement_diagnostics() {
        let err = ExecutionError::Connection {
            host: "db.internal".into(),
            port: 7687,
            source: DriverError::Connection {
                host: "db.internal".into(),
                port: 7687,
                message: "connection refused".into(),
            },
            diagnostics: None,
        }
        .with_diagnostics(diagnostics());
        assert_eq!(err.diagnostics(), Some(&diagnostics()));

        let permanent = ExecutionError::from_driver(
            DriverError::database("Neo.ClientError.Statement.SyntaxError", "bad input"),
            ErrorClass::Permanent,
            &Endpoint::new("localhost", 7687),
            diagnostics(),
        )
        .with_diagnostics(QueryDiagnostics::new("BEGIN", Parameters::new()));
        assert_eq!(
            permanent.diagnostics().map(|d| d.cypher.as_str()),
            Some("MATCH (n:User) WHERE n.age > $age_0 RETURN n")
        );
    }

    #[test]
    fn test_authentication_failure_not_retryable() {
        let err = ExecutionError::from_driver(
            DriverError::database("Neo.ClientError.Security.Unauthorized", "bad credentials"),
            ErrorClass::Authentication,
            &Endpoint::new("localhost", 7687),
            diagnostics(),
        );
        assert!(matches!(err, ExecutionError::Connection { .. }));
        assert!(!err.is_retryable());
    }
}
