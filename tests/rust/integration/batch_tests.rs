use std::sync::Arc;

use neoquent::config::BatchConfig;
use neoquent::connection::{BatchReport, ExecutionError};
use serde_json::{json, Map, Value};

use super::support::{connection, deadlock, RecordingDriver};

fn records(n: usize) -> Vec<Map<String, Value>> {
    (0..n)
        .map(|i| {
            let mut record = Map::new();
            record.insert("id".to_string(), json!(i));
            record.insert("email".to_string(), json!(format!("user{}@example.com", i)));
            record
        })
        .collect()
}

fn rows_sent(statement: &(String, neoquent::cypher_generator::Parameters)) -> usize {
    statement
        .1
        .get("rows")
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(1)
}

#[tokio::test]
async fn test_insert_250_records_in_chunks_of_100() {
    let driver = RecordingDriver::new();
    let conn = connection(Arc::new(driver.clone())).with_batch_config(BatchConfig {
        enabled: true,
        batch_size: 100,
    });

    let report = conn.insert_many("User", &records(250)).await.unwrap();

    assert_eq!(
        report,
        BatchReport {
            requests: 3,
            records: 250
        }
    );
    let sizes: Vec<usize> = driver.statements().iter().map(rows_sent).collect();
    assert_eq!(sizes, vec![100, 100, 50]);
}

#[tokio::test]
async fn test_empty_batch_issues_no_requests() {
    let driver = RecordingDriver::new();
    let conn = connection(Arc::new(driver.clone()));

    let report = conn.insert_many("User", &[]).await.unwrap();

    assert_eq!(report, BatchReport::default());
    assert!(driver.statements().is_empty());
}

#[tokio::test]
async fn test_disabled_batching_sends_one_request_per_record() {
    let driver = RecordingDriver::new();
    let conn = connection(Arc::new(driver.clone())).with_batch_config(BatchConfig {
        enabled: false,
        batch_size: 100,
    });

    let report = conn.upsert_many("User", "email", &records(5)).await.unwrap();

    assert_eq!(report.requests, 5);
    assert!(driver
        .cypher()
        .iter()
        .all(|c| c == "MERGE (n:User {email: $key}) SET n += $properties"));
}

#[tokio::test]
async fn test_failed_insert_chunk_is_reported_and_not_retried() {
    let driver = RecordingDriver::new();
    driver.respond(Ok(Vec::new()));
    driver.respond(Err(deadlock()));
    let conn = connection(Arc::new(driver.clone())).with_batch_config(BatchConfig {
        enabled: true,
        batch_size: 100,
    });

    let err = conn.insert_many("User", &records(250)).await.unwrap_err();

    match err {
        ExecutionError::Batch {
            chunk,
            records,
            source,
        } => {
            assert_eq!(chunk, 1);
            assert_eq!(records, 100);
            assert!(matches!(*source, ExecutionError::Transient { .. }));
        }
        other => panic!("Expected batch error, got {:?}", other),
    }
    assert_eq!(driver.statements().len(), 2);
}

#[tokio::test]
async fn test_upsert_chunks_are_retried() {
    let driver = RecordingDriver::new();
    driver.respond(Ok(Vec::new()));
    driver.respond(Err(deadlock()));
    let conn = connection(Arc::new(driver.clone())).with_batch_config(BatchConfig {
        enabled: true,
        batch_size: 100,
    });

    let report = conn.upsert_many("User", "id", &records(250)).await.unwrap();

    assert_eq!(report.requests, 3);
    assert_eq!(driver.statements().len(), 4);
    assert_eq!(
        driver.cypher()[0],
        "UNWIND $rows AS row MERGE (n:User {id: row.id}) SET n += row"
    );
}

#[tokio::test]
async fn test_upsert_without_key_fails_before_sending() {
    let driver = RecordingDriver::new();
    let conn = connection(Arc::new(driver.clone()));

    let mut input = records(3);
    input[2].insert("id".to_string(), Value::Null);

    let err = conn.upsert_many("User", "id", &input).await.unwrap_err();

    assert!(matches!(err, ExecutionError::Compilation(_)));
    assert!(driver.statements().is_empty());
}
