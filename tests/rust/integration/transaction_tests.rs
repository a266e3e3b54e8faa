use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use neoquent::connection::{ExecutionError, Transaction};
use neoquent::cypher_generator::{CompiledQuery, Parameters};
use neoquent::query::{QueryBuilder, ReturnMode};
use serde_json::json;

use super::support::{connection, deadlock, syntax_error, RecordingDriver};

fn rename() -> CompiledQuery {
    CompiledQuery::new(
        "MATCH (n:User {id: $id}) SET n.name = $name",
        [("id", json!(1)), ("name", json!("Ada"))]
            .into_iter()
            .collect::<Parameters>(),
    )
}

#[tokio::test]
async fn test_successful_unit_commits() {
    let driver = RecordingDriver::new();
    let conn = connection(Arc::new(driver.clone()));

    let query = rename();
    let rows = conn
        .transaction(|tx: Transaction| {
            let query = query.clone();
            async move { tx.run(&query).await }
        })
        .await
        .unwrap();

    assert!(rows.is_empty());
    assert_eq!(driver.events(), vec!["BEGIN", "COMMIT"]);
    assert_eq!(driver.statements()[0].1.get("name"), Some(&json!("Ada")));
}

#[tokio::test]
async fn test_failed_unit_rolls_back_without_retry() {
    let driver = RecordingDriver::new();
    driver.respond(Err(syntax_error()));
    let conn = connection(Arc::new(driver.clone()));

    let query = rename();
    let err = conn
        .transaction(|tx: Transaction| {
            let query = query.clone();
            async move { tx.run(&query).await }
        })
        .await
        .unwrap_err();

    assert!(matches!(err, ExecutionError::Permanent { .. }));
    assert_eq!(driver.events(), vec!["BEGIN", "ROLLBACK"]);
}

#[tokio::test]
async fn test_transient_failure_reruns_whole_unit() {
    let driver = RecordingDriver::new();
    // First statement of the first run succeeds, the second deadlocks.
    driver.respond(Ok(Vec::new()));
    driver.respond(Err(deadlock()));
    let conn = connection(Arc::new(driver.clone()));

    let runs = Arc::new(AtomicUsize::new(0));
    let query = rename();
    let lookup = QueryBuilder::new("User")
        .where_eq("id", 1)
        .compile(&ReturnMode::Rows)
        .unwrap();

    conn.transaction(|tx: Transaction| {
        let (query, lookup) = (query.clone(), lookup.clone());
        let runs = runs.clone();
        async move {
            runs.fetch_add(1, Ordering::SeqCst);
            tx.run(&query).await?;
            tx.run(&lookup).await
        }
    })
    .await
    .unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(driver.events(), vec!["BEGIN", "ROLLBACK", "BEGIN", "COMMIT"]);
    assert_eq!(driver.statements().len(), 4);
}

#[tokio::test]
async fn test_transient_exhaustion_reports_attempts() {
    let driver = RecordingDriver::new();
    driver.fail_times(deadlock(), 5);
    let conn = connection(Arc::new(driver.clone()));

    let query = rename();
    let err = conn
        .transaction(|tx: Transaction| {
            let query = query.clone();
            async move { tx.run(&query).await }
        })
        .await
        .unwrap_err();

    assert!(matches!(err, ExecutionError::Transient { attempts: 3, .. }));
    assert_eq!(
        driver.events(),
        vec!["BEGIN", "ROLLBACK", "BEGIN", "ROLLBACK", "BEGIN", "ROLLBACK"]
    );
}

#[tokio::test]
async fn test_handle_is_closed_after_commit() {
    let driver = RecordingDriver::new();
    let conn = connection(Arc::new(driver.clone()));

    let leaked = conn
        .transaction(|tx: Transaction| async move { Ok(tx) })
        .await
        .unwrap();

    let err = leaked.run(&rename()).await.unwrap_err();
    assert!(matches!(err, ExecutionError::TransactionClosed));
}
