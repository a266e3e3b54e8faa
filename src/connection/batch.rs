//! Chunked writes.
//!
//! With batching on, `n` records become `ceil(n / batch_size)` statements, each carrying its
//! chunk as `$rows` and expanding it with `UNWIND`. With batching off, every record is its own
//! statement. A failed chunk reports its index and size, not the offending record.

use serde_json::{Map, Value};

use super::errors::ExecutionError;
use super::Connection;
use crate::config::BatchConfig;
use crate::cypher_generator::column::quote_identifier;
use crate::cypher_generator::{CompilationError, CompiledQuery, Parameters};
use crate::query::hydrate::prepare_properties;

/// Outcome of a batched write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Statements sent to the server.
    pub requests: usize,
    pub records: usize,
}

/// One planned statement and the number of records it writes.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchStatement {
    pub query: CompiledQuery,
    pub records: usize,
}

fn chunk_size(config: &BatchConfig) -> usize {
    if config.enabled {
        config.batch_size.max(1)
    } else {
        1
    }
}

fn rows_parameter(chunk: &[Map<String, Value>]) -> Parameters {
    let rows = chunk
        .iter()
        .map(|record| Value::Object(prepare_properties(record)))
        .collect::<Vec<_>>();
    Parameters::from_iter([("rows", Value::Array(rows))])
}

/// `CREATE` statements for `records`.
pub fn plan_insert(
    label: &str,
    records: &[Map<String, Value>],
    config: &BatchConfig,
) -> Vec<BatchStatement> {
    let label = quote_identifier(label);

    if !config.enabled {
        return records
            .iter()
            .map(|record| BatchStatement {
                query: CompiledQuery::new(
                    format!("CREATE (n:{}) SET n = $properties", label),
                    Parameters::from_iter([(
                        "properties",
                        Value::Object(prepare_properties(record)),
                    )]),
                ),
                records: 1,
            })
            .collect();
    }

    records
        .chunks(chunk_size(config))
        .map(|chunk| BatchStatement {
            query: CompiledQuery::new(
                format!("UNWIND $rows AS row CREATE (n:{}) SET n = row", label),
                rows_parameter(chunk),
            ),
            records: chunk.len(),
        })
        .collect()
}

/// `MERGE` statements for `records`, matched on `key`. Every record must carry a non-null key.
pub fn plan_upsert(
    label: &str,
    key: &str,
    records: &[Map<String, Value>],
    config: &BatchConfig,
) -> Result<Vec<BatchStatement>, CompilationError> {
    for (index, record) in records.iter().enumerate() {
        if record.get(key).is_none_or(Value::is_null) {
            return Err(CompilationError::MissingMergeKey {
                key: key.to_string(),
                record: index,
            });
        }
    }

    let label = quote_identifier(label);
    let key_name = quote_identifier(key);

    if !config.enabled {
        return Ok(records
            .iter()
            .map(|record| {
                let mut parameters = Parameters::new();
                parameters.insert("key", record.get(key).cloned().unwrap_or(Value::Null));
                parameters.insert("properties", Value::Object(prepare_properties(record)));
                BatchStatement {
                    query: CompiledQuery::new(
                        format!(
                            "MERGE (n:{} {{{}: $key}}) SET n += $properties",
                            label, key_name
                        ),
                        parameters,
                    ),
                    records: 1,
                }
            })
            .collect());
    }

    Ok(records
        .chunks(chunk_size(config))
        .map(|chunk| BatchStatement {
            query: CompiledQuery::new(
                format!(
                    "UNWIND $rows AS row MERGE (n:{} {{{}: row.{}}}) SET n += row",
                    label, key_name, key_name
                ),
                rows_parameter(chunk),
            ),
            records: chunk.len(),
        })
        .collect())
}

impl Connection {
    /// Create one node per record. Never retried: a partially applied `CREATE` is not
    /// idempotent.
    pub async fn insert_many(
        &self,
        label: &str,
        records: &[Map<String, Value>],
    ) -> Result<BatchReport, ExecutionError> {
        let statements = plan_insert(label, records, self.batch_config());
        self.run_batch(statements, false).await
    }

    /// Merge one node per record on `key`. Chunks are retried under the connection's policy.
    pub async fn upsert_many(
        &self,
        label: &str,
        key: &str,
        records: &[Map<String, Value>],
    ) -> Result<BatchReport, ExecutionError> {
        let statements = plan_upsert(label, key, records, self.batch_config())?;
        self.run_batch(statements, true).await
    }

    async fn run_batch(
        &self,
        statements: Vec<BatchStatement>,
        retry: bool,
    ) -> Result<BatchReport, ExecutionError> {
        let total = statements.len();
        let mut report = BatchReport::default();

        for (chunk, statement) in statements.into_iter().enumerate() {
            log::debug!(
                "Batch chunk {}/{}: {} record(s)",
                chunk + 1,
                total,
                statement.records
            );

            let outcome = if retry {
                self.select(&statement.query).await
            } else {
                self.statement(&statement.query).await
            };

            outcome.map_err(|source| ExecutionError::Batch {
                chunk,
                records: statement.records,
                source: Box::new(source),
            })?;

            report.requests += 1;
            report.records += statement.records;
        }

        Ok(report)
    }
}
