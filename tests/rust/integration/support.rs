//! Scripted drivers shared by the integration tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mockall::mock;
use neoquent::config::Neo4jConfig;
use neoquent::connection::driver::Node;
use neoquent::connection::{
    Connection, DriverError, DriverTransaction, Endpoint, GraphDriver, GraphValue, RetryPolicy,
    Row,
};
use neoquent::cypher_generator::Parameters;

#[derive(Default)]
struct Script {
    statements: Vec<(String, Parameters)>,
    responses: VecDeque<Result<Vec<Row>, DriverError>>,
    events: Vec<String>,
}

/// Records every statement and answers from a queue of scripted responses. An empty queue
/// answers with no rows.
#[derive(Clone, Default)]
pub struct RecordingDriver {
    script: Arc<Mutex<Script>>,
    stale: Arc<AtomicBool>,
    reconnects: Arc<AtomicUsize>,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, response: Result<Vec<Row>, DriverError>) -> &Self {
        self.script.lock().unwrap().responses.push_back(response);
        self
    }

    pub fn fail_times(&self, error: DriverError, times: usize) -> &Self {
        for _ in 0..times {
            self.respond(Err(error.clone()));
        }
        self
    }

    /// Make the next `ping()` report a stale connection.
    pub fn go_stale(&self) {
        self.stale.store(true, Ordering::SeqCst);
    }

    pub fn statements(&self) -> Vec<(String, Parameters)> {
        self.script.lock().unwrap().statements.clone()
    }

    pub fn cypher(&self) -> Vec<String> {
        self.statements().into_iter().map(|(cypher, _)| cypher).collect()
    }

    pub fn events(&self) -> Vec<String> {
        self.script.lock().unwrap().events.clone()
    }

    pub fn reconnects(&self) -> usize {
        self.reconnects.load(Ordering::SeqCst)
    }

    fn record(&self, cypher: &str, parameters: &Parameters) -> Result<Vec<Row>, DriverError> {
        let mut script = self.script.lock().unwrap();
        script
            .statements
            .push((cypher.to_string(), parameters.clone()));
        script.responses.pop_front().unwrap_or(Ok(Vec::new()))
    }

    fn event(&self, event: &str) {
        self.script.lock().unwrap().events.push(event.to_string());
    }
}

#[async_trait]
impl GraphDriver for RecordingDriver {
    async fn execute(
        &self,
        cypher: &str,
        parameters: &Parameters,
    ) -> Result<Vec<Row>, DriverError> {
        self.record(cypher, parameters)
    }

    async fn begin(&self) -> Result<Box<dyn DriverTransaction>, DriverError> {
        self.event("BEGIN");
        Ok(Box::new(RecordingTransaction {
            driver: self.clone(),
        }))
    }

    async fn ping(&self) -> bool {
        !self.stale.load(Ordering::SeqCst)
    }

    async fn reconnect(&self) -> Result<(), DriverError> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        self.stale.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint::new("localhost", 7687)
    }
}

pub struct RecordingTransaction {
    driver: RecordingDriver,
}

#[async_trait]
impl DriverTransaction for RecordingTransaction {
    async fn execute(
        &mut self,
        cypher: &str,
        parameters: &Parameters,
    ) -> Result<Vec<Row>, DriverError> {
        self.driver.record(cypher, parameters)
    }

    async fn commit(self: Box<Self>) -> Result<(), DriverError> {
        self.driver.event("COMMIT");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DriverError> {
        self.driver.event("ROLLBACK");
        Ok(())
    }
}

mock! {
    pub Driver {}

    #[async_trait]
    impl GraphDriver for Driver {
        async fn execute(&self, cypher: &str, parameters: &Parameters) -> Result<Vec<Row>, DriverError>;
        async fn begin(&self) -> Result<Box<dyn DriverTransaction>, DriverError>;
        async fn ping(&self) -> bool;
        async fn reconnect(&self) -> Result<(), DriverError>;
        fn endpoint(&self) -> Endpoint;
    }
}

/// Three attempts, no real waiting.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        multiplier: 1.0,
        max_delay: Duration::from_millis(1),
        jitter: false,
    }
}

pub fn connection(driver: Arc<dyn GraphDriver>) -> Connection {
    Connection::new(driver, &Neo4jConfig::default()).with_retry_policy(fast_retry())
}

pub fn deadlock() -> DriverError {
    DriverError::database(
        "Neo.TransientError.Transaction.DeadlockDetected",
        "deadlock detected",
    )
}

pub fn syntax_error() -> DriverError {
    DriverError::database("Neo.ClientError.Statement.SyntaxError", "invalid input")
}

pub fn unreachable_server() -> DriverError {
    DriverError::Connection {
        host: "localhost".to_string(),
        port: 7687,
        message: "connection refused".to_string(),
    }
}

pub fn user_row(id: i64, name: &str) -> Row {
    let properties = HashMap::from([
        ("id".to_string(), GraphValue::Integer(id)),
        ("name".to_string(), GraphValue::String(name.to_string())),
    ]);
    Row::new(
        vec!["n".to_string()],
        vec![GraphValue::Node(Node::new(
            id,
            vec!["User".to_string()],
            properties,
            format!("4:test:{}", id),
        ))],
    )
}
