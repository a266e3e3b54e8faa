//! Transient vs permanent failure classification.
//!
//! The retry manager never inspects driver errors itself; it asks an [`ErrorClassifier`].
//! [`Neo4jErrorClassifier`] reads Neo4j status codes
//! (`Neo.<Classification>.<Category>.<Title>`).

use super::driver::DriverError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Deadlocks, lock timeouts, leader changes: retry.
    Transient,
    /// The server could not be reached: reconnect and retry.
    Connection,
    /// Bad credentials: surfaced immediately as a connection failure.
    Authentication,
    /// Syntax errors, constraint violations and everything unknown: never retried.
    Permanent,
}

impl ErrorClass {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorClass::Transient | ErrorClass::Connection)
    }
}

pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, error: &DriverError) -> ErrorClass;
}

/// Transient codes that must not be retried: the transaction was stopped on purpose.
const TERMINAL_TRANSIENT_CODES: &[&str] = &[
    "Neo.TransientError.Transaction.Terminated",
    "Neo.TransientError.Transaction.LockClientStopped",
];

/// Client-error codes that clusters raise during leader switches.
const CLUSTER_RETRYABLE_CODES: &[&str] = &[
    "Neo.ClientError.Cluster.NotALeader",
    "Neo.ClientError.General.ForbiddenOnReadOnlyDatabase",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct Neo4jErrorClassifier;

impl ErrorClassifier for Neo4jErrorClassifier {
    fn classify(&self, error: &DriverError) -> ErrorClass {
        let code = match error {
            DriverError::Connection { .. } => return ErrorClass::Connection,
            DriverError::Protocol(_) => return ErrorClass::Permanent,
            DriverError::Database { code, .. } => code.as_str(),
        };

        if TERMINAL_TRANSIENT_CODES.contains(&code) {
            ErrorClass::Permanent
        } else if code.starts_with("Neo.TransientError.") || CLUSTER_RETRYABLE_CODES.contains(&code)
        {
            ErrorClass::Transient
        } else if code.starts_with("Neo.ClientError.Security.") {
            ErrorClass::Authentication
        } else {
            ErrorClass::Permanent
        }
    }
}
