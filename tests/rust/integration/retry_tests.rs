use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use neoquent::connection::{DriverError, Endpoint, ExecutionError, RetryPolicy};
use neoquent::cypher_generator::{CompiledQuery, Parameters};
use test_case::test_case;

use super::support::{
    connection, deadlock, syntax_error, unreachable_server, MockDriver, RecordingDriver,
};

fn read_query() -> CompiledQuery {
    CompiledQuery::new("MATCH (n:User) RETURN n", Parameters::new())
}

#[tokio::test]
async fn test_transient_failures_exhaust_after_max_attempts() {
    let driver = RecordingDriver::new();
    driver.fail_times(deadlock(), 10);
    let conn = connection(Arc::new(driver.clone()));

    let err = conn.select(&read_query()).await.unwrap_err();

    assert_eq!(driver.statements().len(), 3);
    match err {
        ExecutionError::Transient {
            attempts, source, ..
        } => {
            assert_eq!(attempts, 3);
            assert_eq!(
                source.code(),
                Some("Neo.TransientError.Transaction.DeadlockDetected")
            );
        }
        other => panic!("Expected transient error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_transient_failure_then_success() {
    let driver = RecordingDriver::new();
    driver.fail_times(deadlock(), 2);
    let conn = connection(Arc::new(driver.clone()));

    let rows = conn.select(&read_query()).await.unwrap();

    assert!(rows.is_empty());
    assert_eq!(driver.statements().len(), 3);
}

#[test_case(syntax_error() ; "syntax error")]
#[test_case(DriverError::database("Neo.ClientError.Schema.ConstraintValidationFailed", "exists") ; "constraint violation")]
#[test_case(DriverError::database("Neo.TransientError.Transaction.Terminated", "terminated") ; "terminated transaction")]
#[test_case(DriverError::Protocol("unexpected message".into()) ; "protocol error")]
#[tokio::test]
async fn test_permanent_failures_are_not_retried(error: DriverError) {
    let driver = RecordingDriver::new();
    driver.fail_times(error, 3);
    let conn = connection(Arc::new(driver.clone()));

    let err = conn.select(&read_query()).await.unwrap_err();

    assert_eq!(driver.statements().len(), 1);
    assert!(matches!(err, ExecutionError::Permanent { .. }));
}

#[tokio::test]
async fn test_authentication_failure_is_not_retried() {
    let driver = RecordingDriver::new();
    driver.fail_times(
        DriverError::database("Neo.ClientError.Security.Unauthorized", "bad credentials"),
        3,
    );
    let conn = connection(Arc::new(driver.clone()));

    let err = conn.select(&read_query()).await.unwrap_err();

    assert_eq!(driver.statements().len(), 1);
    assert!(matches!(err, ExecutionError::Connection { port: 7687, .. }));
}

#[tokio::test]
async fn test_auto_commit_writes_run_once() {
    let driver = RecordingDriver::new();
    driver.fail_times(deadlock(), 3);
    let conn = connection(Arc::new(driver.clone()));

    let write = CompiledQuery::new("CREATE (n:User) SET n = $properties", Parameters::new());
    let err = conn.statement(&write).await.unwrap_err();

    assert_eq!(driver.statements().len(), 1);
    assert!(matches!(err, ExecutionError::Transient { attempts: 1, .. }));
}

#[tokio::test]
async fn test_no_retry_policy_runs_once() {
    let driver = RecordingDriver::new();
    driver.fail_times(deadlock(), 3);
    let conn = connection(Arc::new(driver.clone())).with_retry_policy(RetryPolicy::no_retry());

    assert!(conn.select(&read_query()).await.is_err());
    assert_eq!(driver.statements().len(), 1);
}

#[tokio::test]
async fn test_stale_connection_reconnects_before_retry() {
    let driver = RecordingDriver::new();
    driver.respond(Err(unreachable_server()));
    driver.go_stale();
    let conn = connection(Arc::new(driver.clone()));

    conn.select(&read_query()).await.unwrap();

    assert_eq!(driver.statements().len(), 2);
    assert_eq!(driver.reconnects(), 1);
}

#[tokio::test]
async fn test_retry_pings_and_reconnects_through_driver() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut driver = MockDriver::new();

    let counter = calls.clone();
    driver.expect_execute().times(2).returning(move |_, _| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(unreachable_server())
        } else {
            Ok(Vec::new())
        }
    });
    driver.expect_ping().times(1).returning(|| false);
    driver.expect_reconnect().times(1).returning(|| Ok(()));
    driver
        .expect_endpoint()
        .returning(|| Endpoint::new("localhost", 7687));

    let conn = connection(Arc::new(driver));
    conn.select(&read_query()).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_failed_reconnect_surfaces_connection_error() {
    let mut driver = MockDriver::new();
    driver
        .expect_execute()
        .times(1)
        .returning(|_, _| Err(deadlock()));
    driver.expect_ping().returning(|| false);
    driver
        .expect_reconnect()
        .returning(|| Err(unreachable_server()));
    driver
        .expect_endpoint()
        .returning(|| Endpoint::new("db.internal", 7687));

    let conn = connection(Arc::new(driver));
    let err = conn.select(&read_query()).await.unwrap_err();

    match err {
        ExecutionError::Connection {
            host,
            port,
            diagnostics,
            ..
        } => {
            assert_eq!(host, "db.internal");
            assert_eq!(port, 7687);
            let diagnostics = diagnostics.expect("reconnect failure keeps the statement");
            assert_eq!(diagnostics.cypher, "MATCH (n:User) RETURN n");
        }
        other => panic!("Expected connection error, got {:?}", other),
    }
}
