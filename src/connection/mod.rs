//! Execution against Neo4j: the [`Connection`] façade, retries, transactions and batching.
//!
//! The driver itself sits behind [`GraphDriver`]; everything here is driver-agnostic.

use std::future::Future;
use std::sync::Arc;

pub mod batch;
pub mod classify;
pub mod driver;
pub mod errors;
pub mod retry;
pub mod transaction;

pub use batch::{BatchReport, BatchStatement};
pub use classify::{ErrorClass, ErrorClassifier, Neo4jErrorClassifier};
pub use driver::{DriverError, DriverTransaction, Endpoint, GraphDriver, GraphValue, Row};
pub use errors::{ExecutionError, QueryDiagnostics};
pub use retry::{RetryPolicy, RetryState};
pub use transaction::Transaction;

use crate::config::{BatchConfig, Neo4jConfig};
use crate::cypher_generator::{Capabilities, CompiledQuery};
use crate::query::builder::{Aggregate, QueryBuilder};

/// A driver bound to its retry, batching and compiler settings.
#[derive(Clone)]
pub struct Connection {
    driver: Arc<dyn GraphDriver>,
    classifier: Arc<dyn ErrorClassifier>,
    retry: RetryPolicy,
    batch: BatchConfig,
    capabilities: Capabilities,
}

impl Connection {
    pub fn new(driver: Arc<dyn GraphDriver>, config: &Neo4jConfig) -> Self {
        log::info!(
            "Connection to {} (apoc: {}, batch size: {})",
            driver.endpoint(),
            config.apoc_available,
            config.batch.batch_size
        );
        Self {
            driver,
            classifier: Arc::new(Neo4jErrorClassifier),
            retry: config.retry_policy(),
            batch: config.batch.clone(),
            capabilities: config.capabilities(),
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_batch_config(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn batch_config(&self) -> &BatchConfig {
        &self.batch
    }

    pub fn driver(&self) -> &Arc<dyn GraphDriver> {
        &self.driver
    }

    /// Start a query on `label` compiled with this connection's capabilities.
    pub fn query(&self, label: &str) -> QueryBuilder {
        QueryBuilder::new(label).with_capabilities(self.capabilities)
    }

    pub async fn get(
        &self,
        query: &QueryBuilder,
    ) -> Result<Vec<serde_json::Map<String, serde_json::Value>>, ExecutionError> {
        query.get(self).await
    }

    pub async fn first(
        &self,
        query: &QueryBuilder,
    ) -> Result<Option<serde_json::Map<String, serde_json::Value>>, ExecutionError> {
        query.first(self).await
    }

    pub async fn count(&self, query: &QueryBuilder) -> Result<i64, ExecutionError> {
        query.count(self).await
    }

    pub async fn aggregate(
        &self,
        query: &QueryBuilder,
        function: Aggregate,
        column: &str,
    ) -> Result<serde_json::Value, ExecutionError> {
        query.aggregate(self, function, column).await
    }

    /// Run a read under the retry policy.
    pub async fn select(&self, query: &CompiledQuery) -> Result<Vec<Row>, ExecutionError> {
        self.retry
            .run(self.driver.as_ref(), |_| self.run_once(query))
            .await
            .map_err(|err| err.with_diagnostics(QueryDiagnostics::from(query)))
    }

    /// Run an auto-commit write once. Writes are retried only inside
    /// [`transaction`](Connection::transaction).
    pub async fn statement(&self, query: &CompiledQuery) -> Result<Vec<Row>, ExecutionError> {
        self.run_once(query).await
    }

    pub(crate) async fn run_once(&self, query: &CompiledQuery) -> Result<Vec<Row>, ExecutionError> {
        log::debug!("Executing: {}", query.cypher);
        self.driver
            .execute(&query.cypher, &query.parameters)
            .await
            .map_err(|source| {
                let class = self.classifier.classify(&source);
                ExecutionError::from_driver(
                    source,
                    class,
                    &self.driver.endpoint(),
                    QueryDiagnostics::from(query),
                )
            })
    }

    /// Run `work` inside a transaction, committing on success and rolling back on error.
    ///
    /// Retryable failures (from `work` or from the commit) roll back and rerun the whole unit,
    /// so `work` must be safe to repeat.
    pub async fn transaction<T, F, Fut>(&self, mut work: F) -> Result<T, ExecutionError>
    where
        F: FnMut(Transaction) -> Fut,
        Fut: Future<Output = Result<T, ExecutionError>>,
    {
        let mut attempt = 1;

        loop {
            let outcome = if attempt > 1 {
                match retry::ensure_connected(self.driver.as_ref()).await {
                    Ok(()) => self.attempt_transaction(&mut work).await,
                    Err(err) => Err(err.with_diagnostics(QueryDiagnostics::new(
                        "BEGIN",
                        Default::default(),
                    ))),
                }
            } else {
                self.attempt_transaction(&mut work).await
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !self.retry.backoff(attempt, &err).await {
                        return Err(err.with_attempts(attempt));
                    }
                    attempt += 1;
                }
            }
        }
    }

    async fn attempt_transaction<T, F, Fut>(&self, work: &mut F) -> Result<T, ExecutionError>
    where
        F: FnMut(Transaction) -> Fut,
        Fut: Future<Output = Result<T, ExecutionError>>,
    {
        let endpoint = self.driver.endpoint();
        let handle = self.driver.begin().await.map_err(|source| {
            let class = self.classifier.classify(&source);
            ExecutionError::from_driver(
                source,
                class,
                &endpoint,
                QueryDiagnostics::new("BEGIN", Default::default()),
            )
        })?;
        let tx = Transaction::new(handle, self.classifier.clone(), endpoint);

        match work(tx.clone()).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                tx.rollback().await;
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.driver.endpoint())
            .field("retry", &self.retry)
            .field("batch", &self.batch)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}
