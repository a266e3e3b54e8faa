//! Explicit transaction handle passed to managed units of work.

use std::sync::Arc;

use tokio::sync::Mutex;

use super::classify::ErrorClassifier;
use super::driver::{DriverError, DriverTransaction, Endpoint, Row};
use super::errors::{ExecutionError, QueryDiagnostics};
use crate::cypher_generator::{CompiledQuery, Parameters};

/// Handle to an open transaction. Clones share the same transaction.
///
/// Statements run through [`run`](Transaction::run) are classified like auto-commit ones, so
/// a transient failure inside a managed unit of work makes the whole unit retryable.
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<Mutex<Option<Box<dyn DriverTransaction>>>>,
    classifier: Arc<dyn ErrorClassifier>,
    endpoint: Endpoint,
}

impl Transaction {
    pub(crate) fn new(
        transaction: Box<dyn DriverTransaction>,
        classifier: Arc<dyn ErrorClassifier>,
        endpoint: Endpoint,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(transaction))),
            classifier,
            endpoint,
        }
    }

    pub async fn run(&self, query: &CompiledQuery) -> Result<Vec<Row>, ExecutionError> {
        self.run_cypher(&query.cypher, &query.parameters).await
    }

    pub async fn run_cypher(
        &self,
        cypher: &str,
        parameters: &Parameters,
    ) -> Result<Vec<Row>, ExecutionError> {
        let mut guard = self.inner.lock().await;
        let transaction = guard.as_mut().ok_or(ExecutionError::TransactionClosed)?;
        log::debug!("Transaction statement: {}", cypher);

        transaction
            .execute(cypher, parameters)
            .await
            .map_err(|source| {
                self.classify(source, QueryDiagnostics::new(cypher, parameters.clone()))
            })
    }

    pub(crate) async fn commit(&self) -> Result<(), ExecutionError> {
        let transaction = self
            .inner
            .lock()
            .await
            .take()
            .ok_or(ExecutionError::TransactionClosed)?;
        transaction
            .commit()
            .await
            .map_err(|source| self.classify(source, QueryDiagnostics::new("COMMIT", Parameters::new())))
    }

    /// Roll back if still open. Rollback failures are logged, not returned: the error that
    /// caused the rollback is the one the caller needs.
    pub(crate) async fn rollback(&self) {
        let Some(transaction) = self.inner.lock().await.take() else {
            return;
        };
        if let Err(err) = transaction.rollback().await {
            log::warn!("Rollback on {} failed: {}", self.endpoint, err);
        }
    }

    fn classify(&self, source: DriverError, diagnostics: QueryDiagnostics) -> ExecutionError {
        let class = self.classifier.classify(&source);
        ExecutionError::from_driver(source, class, &self.endpoint, diagnostics)
    }
}
