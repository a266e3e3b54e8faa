//! Result hydration and write-side property normalization.
//!
//! Reads: driver [`GraphValue`]s become plain `serde_json` values. Nodes and relationships
//! collapse to their property maps, temporal values become ISO-8601 strings, and a row holding a
//! single node column hydrates straight to that node's properties.
//!
//! Writes: graph properties hold scalars or flat scalar lists only, so nested structures are
//! stored as JSON strings. [`prepare_properties`] applies that rule before a write.

use std::collections::BTreeMap;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};

use super::builder::QueryBuilder;
use crate::connection::driver::{GraphValue, Node, Relationship, Row};
use crate::connection::{Connection, ExecutionError};
use crate::cypher_generator::CompilationError;

/// An entity rows can be hydrated into.
pub trait Model: DeserializeOwned + Send {
    /// Node label the entity is stored under.
    fn label() -> &'static str;

    fn key_name() -> &'static str {
        "id"
    }

    fn key(&self) -> Option<Value>;

    /// Build an entity from a hydrated property map.
    fn new_from_builder(properties: Map<String, Value>) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(properties))
    }
}

fn properties_to_json(properties: &std::collections::HashMap<String, GraphValue>) -> Value {
    // HashMap order is unspecified; sort for stable output.
    let sorted: BTreeMap<&String, &GraphValue> = properties.iter().collect();
    Value::Object(
        sorted
            .into_iter()
            .map(|(k, v)| (k.clone(), normalize(v)))
            .collect(),
    )
}

fn node_to_json(node: &Node) -> Value {
    properties_to_json(&node.properties)
}

fn relationship_to_json(relationship: &Relationship) -> Value {
    properties_to_json(&relationship.properties)
}

/// Convert a driver value into plain JSON.
pub fn normalize(value: &GraphValue) -> Value {
    match value {
        GraphValue::Null => Value::Null,
        GraphValue::Boolean(b) => Value::Bool(*b),
        GraphValue::Integer(i) => Value::from(*i),
        GraphValue::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        GraphValue::String(s) => Value::String(s.clone()),
        GraphValue::List(items) => Value::Array(items.iter().map(normalize).collect()),
        GraphValue::Map(map) => properties_to_json(map),
        GraphValue::Node(node) => node_to_json(node),
        GraphValue::Relationship(rel) => relationship_to_json(rel),
        GraphValue::Path(path) => {
            let mut object = Map::new();
            object.insert(
                "nodes".to_string(),
                Value::Array(path.nodes.iter().map(node_to_json).collect()),
            );
            object.insert(
                "relationships".to_string(),
                Value::Array(path.relationships.iter().map(relationship_to_json).collect()),
            );
            Value::Object(object)
        }
        GraphValue::Date(date) => Value::String(date.to_string()),
        GraphValue::Time(time, offset) => Value::String(format!("{}{}", time, offset)),
        GraphValue::LocalTime(time) => Value::String(time.to_string()),
        GraphValue::DateTime(dt) => Value::String(dt.to_rfc3339()),
        GraphValue::LocalDateTime(dt) => Value::String(format!("{}T{}", dt.date(), dt.time())),
        GraphValue::Duration(text) => Value::String(text.clone()),
    }
}

/// Property map for one result row.
pub fn row_properties(row: &Row) -> Map<String, Value> {
    if let [GraphValue::Node(node)] = row.values.as_slice() {
        if let Value::Object(properties) = node_to_json(node) {
            return properties;
        }
    }

    row.columns
        .iter()
        .zip(row.values.iter())
        .map(|(column, value)| (column.clone(), normalize(value)))
        .collect()
}

/// Hydrate rows into entities through [`Model::new_from_builder`].
pub fn hydrate<T: Model>(rows: &[Row]) -> Result<Vec<T>, ExecutionError> {
    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            T::new_from_builder(row_properties(row)).map_err(|err| ExecutionError::Hydration {
                row: i,
                message: err.to_string(),
            })
        })
        .collect()
}

/// Normalize a property map for storage: nested maps and lists holding maps or lists become
/// JSON strings, flat scalar lists and scalars are kept.
pub fn prepare_properties(properties: &Map<String, Value>) -> Map<String, Value> {
    properties
        .iter()
        .map(|(key, value)| {
            let stored = match value {
                Value::Object(_) => Value::String(value.to_string()),
                Value::Array(items) if items.iter().any(|v| v.is_object() || v.is_array()) => {
                    Value::String(value.to_string())
                }
                other => other.clone(),
            };
            (key.clone(), stored)
        })
        .collect()
}

/// A [`QueryBuilder`] whose rows hydrate into `T`.
#[derive(Debug, Clone)]
pub struct ModelQuery<T> {
    builder: QueryBuilder,
    _model: PhantomData<fn() -> T>,
}

impl<T: Model> ModelQuery<T> {
    pub(crate) fn new(builder: QueryBuilder) -> Self {
        Self {
            builder,
            _model: PhantomData,
        }
    }

    pub fn builder(&self) -> &QueryBuilder {
        &self.builder
    }

    pub fn to_cypher(&self) -> Result<String, CompilationError> {
        self.builder.to_cypher()
    }

    pub async fn get(&self, connection: &Connection) -> Result<Vec<T>, ExecutionError> {
        let rows = self.builder.rows(connection).await?;
        hydrate(&rows)
    }

    pub async fn first(&self, connection: &Connection) -> Result<Option<T>, ExecutionError> {
        let rows = self.builder.clone().limit(1).rows(connection).await?;
        Ok(hydrate(&rows)?.into_iter().next())
    }

    pub async fn count(&self, connection: &Connection) -> Result<i64, ExecutionError> {
        self.builder.count(connection).await
    }
}
