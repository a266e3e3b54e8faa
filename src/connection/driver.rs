//! Driver seam.
//!
//! The actual Bolt client lives outside this crate. Anything that can run Cypher text with a
//! parameter map, open an explicit transaction and report its own liveness can back a
//! [`Connection`](super::Connection).
//!
//! # Graph values
//!
//! Result cells are [`GraphValue`]s, a driver-neutral mirror of the Bolt value model:
//!
//! ```text
//! Null | Boolean | Integer | Float | String | List | Map
//! Node { id, labels, properties, element_id }
//! Relationship { id, start/end ids, rel_type, properties, element ids }
//! Path { nodes, relationships }
//! Date | Time | LocalTime | DateTime | LocalDateTime | Duration
//! ```

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value;
use thiserror::Error;

use crate::cypher_generator::Parameters;

/// A node as returned by the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Legacy integer id
    pub id: i64,
    pub labels: Vec<String>,
    pub properties: HashMap<String, GraphValue>,
    /// Neo4j 5.x string element id
    pub element_id: String,
}

impl Node {
    pub fn new(
        id: i64,
        labels: Vec<String>,
        properties: HashMap<String, GraphValue>,
        element_id: String,
    ) -> Self {
        Node {
            id,
            labels,
            properties,
            element_id,
        }
    }
}

/// A relationship as returned by the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    pub id: i64,
    pub start_node_id: i64,
    pub end_node_id: i64,
    pub rel_type: String,
    pub properties: HashMap<String, GraphValue>,
    pub element_id: String,
    pub start_node_element_id: String,
    pub end_node_element_id: String,
}

/// Alternating sequence of nodes and relationships.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub nodes: Vec<Node>,
    pub relationships: Vec<Relationship>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GraphValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<GraphValue>),
    Map(HashMap<String, GraphValue>),
    Node(Node),
    Relationship(Relationship),
    Path(Path),
    Date(NaiveDate),
    Time(NaiveTime, FixedOffset),
    LocalTime(NaiveTime),
    DateTime(DateTime<FixedOffset>),
    LocalDateTime(NaiveDateTime),
    /// ISO-8601 duration text as produced by the server (`P1DT2H`)
    Duration(String),
}

impl GraphValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            GraphValue::Integer(i) => Some(*i),
            GraphValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            GraphValue::Node(node) => Some(node),
            _ => None,
        }
    }
}

impl From<Value> for GraphValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => GraphValue::Null,
            Value::Bool(b) => GraphValue::Boolean(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => GraphValue::Integer(i),
                None => GraphValue::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => GraphValue::String(s),
            Value::Array(items) => GraphValue::List(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => {
                GraphValue::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<&str> for GraphValue {
    fn from(value: &str) -> Self {
        GraphValue::String(value.to_string())
    }
}

impl From<i64> for GraphValue {
    fn from(value: i64) -> Self {
        GraphValue::Integer(value)
    }
}

/// One result record: column names and the values in the same order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub columns: Vec<String>,
    pub values: Vec<GraphValue>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<GraphValue>) -> Self {
        Row { columns, values }
    }

    /// Build a row from `(column, value)` pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<GraphValue>,
    {
        let (columns, values) = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .unzip();
        Row { columns, values }
    }

    pub fn get(&self, column: &str) -> Option<&GraphValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Host/port of the server a driver talks to, carried by connection errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Endpoint {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Errors reported by the driver, before classification.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DriverError {
    #[error("Cannot reach {host}:{port}: {message}")]
    Connection {
        host: String,
        port: u16,
        message: String,
    },
    /// Server-side failure with its Neo4j status code (`Neo.TransientError.Transaction.DeadlockDetected`).
    #[error("{code}: {message}")]
    Database { code: String, message: String },
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl DriverError {
    pub fn database(code: impl Into<String>, message: impl Into<String>) -> Self {
        DriverError::Database {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            DriverError::Database { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// An explicit transaction opened by [`GraphDriver::begin`].
#[async_trait]
pub trait DriverTransaction: Send {
    async fn execute(
        &mut self,
        cypher: &str,
        parameters: &Parameters,
    ) -> Result<Vec<Row>, DriverError>;

    async fn commit(self: Box<Self>) -> Result<(), DriverError>;

    async fn rollback(self: Box<Self>) -> Result<(), DriverError>;
}

/// The database driver.
///
/// Implementations own their pooling and liveness state; the retry manager only calls
/// [`ping`](GraphDriver::ping) and [`reconnect`](GraphDriver::reconnect).
#[async_trait]
pub trait GraphDriver: Send + Sync {
    /// Run one auto-commit statement.
    async fn execute(&self, cypher: &str, parameters: &Parameters)
        -> Result<Vec<Row>, DriverError>;

    async fn begin(&self) -> Result<Box<dyn DriverTransaction>, DriverError>;

    /// `true` while the underlying connection is usable.
    async fn ping(&self) -> bool;

    async fn reconnect(&self) -> Result<(), DriverError>;

    fn endpoint(&self) -> Endpoint;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_row_lookup_by_column() {
        let row = Row::from_pairs([("name", GraphValue::from("Ada")), ("age", GraphValue::from(36i64))]);
        assert_eq!(row.get("age"), Some(&GraphValue::Integer(36)));
        assert_eq!(row.get("missing"), None);
        assert_eq!(row.len(), 2);
    }

    #[test]
    fn test_graph_value_from_json() {
        let value = GraphValue::from(json!({"tags": ["a", "b"], "score": 1.5}));
        match value {
            GraphValue::Map(map) => {
                assert_eq!(
                    map.get("tags"),
                    Some(&GraphValue::List(vec!["a".into(), "b".into()]))
                );
                assert_eq!(map.get("score"), Some(&GraphValue::Float(1.5)));
            }
            other => panic!("Expected map, got {:?}", other),
        }
    }

    #[test]
    fn test_database_error_code() {
        let err = DriverError::database("Neo.ClientError.Statement.SyntaxError", "bad");
        assert_eq!(err.code(), Some("Neo.ClientError.Statement.SyntaxError"));
        assert_eq!(err.to_string(), "Neo.ClientError.Statement.SyntaxError: bad");
    }
}
