//! Clause descriptors: the structured, SQL-shaped predicate list the compiler consumes.
//!
//! Descriptors are plain data. They serialize as `{"type": "basic", "boolean": "and", ...}` so a
//! query description can be stored or loaded as JSON.

use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::parameters::Parameters;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// Combinator joining a clause to the previous one at the same nesting level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Boolean {
    #[default]
    And,
    Or,
}

impl Boolean {
    pub fn as_cypher(&self) -> &'static str {
        match self {
            Boolean::And => "AND",
            Boolean::Or => "OR",
        }
    }
}

/// A bound value. Temporal variants are formatted to strings when bound.
#[derive(Debug, Clone, PartialEq)]
pub enum ClauseValue {
    Json(Value),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
}

impl ClauseValue {
    pub fn null() -> Self {
        ClauseValue::Json(Value::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ClauseValue::Json(Value::Null))
    }

    /// List view of the value. JSON objects are re-indexed to their values in order, so an
    /// accidentally keyed list never reaches the query as a map.
    pub fn as_list(&self) -> Option<Vec<ClauseValue>> {
        match self {
            ClauseValue::Json(Value::Array(items)) => {
                Some(items.iter().cloned().map(ClauseValue::Json).collect())
            }
            ClauseValue::Json(Value::Object(map)) => {
                Some(map.values().cloned().map(ClauseValue::Json).collect())
            }
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ClauseValue::Json(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            ClauseValue::Json(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ClauseValue::Json(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Value as sent in the parameter map.
    pub fn to_parameter(&self) -> Value {
        match self {
            ClauseValue::Json(Value::Object(map)) => {
                Value::Array(map.values().cloned().collect())
            }
            ClauseValue::Json(value) => value.clone(),
            ClauseValue::Date(date) => Value::String(date.format(DATE_FORMAT).to_string()),
            ClauseValue::DateTime(dt) => Value::String(dt.format(DATETIME_FORMAT).to_string()),
            ClauseValue::Time(time) => Value::String(time.format(TIME_FORMAT).to_string()),
        }
    }

    /// Year, month and day components for temporal extraction clauses.
    pub(crate) fn date_parts(&self) -> Option<(i32, u32, u32)> {
        match self {
            ClauseValue::Date(d) => Some((d.year(), d.month(), d.day())),
            ClauseValue::DateTime(dt) => Some((dt.year(), dt.month(), dt.day())),
            _ => None,
        }
    }

    pub(crate) fn time_string(&self) -> Option<String> {
        match self {
            ClauseValue::Time(t) => Some(t.format(TIME_FORMAT).to_string()),
            ClauseValue::DateTime(dt) => Some(format!(
                "{:02}:{:02}:{:02}",
                dt.hour(),
                dt.minute(),
                dt.second()
            )),
            ClauseValue::Json(Value::String(s)) => Some(s.clone()),
            _ => None,
        }
    }
}

impl Default for ClauseValue {
    fn default() -> Self {
        ClauseValue::null()
    }
}

impl Serialize for ClauseValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ClauseValue::Json(value) => value.serialize(serializer),
            other => other.to_parameter().serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ClauseValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(ClauseValue::Json)
    }
}

impl From<Value> for ClauseValue {
    fn from(value: Value) -> Self {
        ClauseValue::Json(value)
    }
}

impl From<&str> for ClauseValue {
    fn from(value: &str) -> Self {
        ClauseValue::Json(Value::String(value.to_string()))
    }
}

impl From<String> for ClauseValue {
    fn from(value: String) -> Self {
        ClauseValue::Json(Value::String(value))
    }
}

impl From<bool> for ClauseValue {
    fn from(value: bool) -> Self {
        ClauseValue::Json(Value::Bool(value))
    }
}

impl From<i32> for ClauseValue {
    fn from(value: i32) -> Self {
        ClauseValue::Json(Value::from(value))
    }
}

impl From<i64> for ClauseValue {
    fn from(value: i64) -> Self {
        ClauseValue::Json(Value::from(value))
    }
}

impl From<u32> for ClauseValue {
    fn from(value: u32) -> Self {
        ClauseValue::Json(Value::from(value))
    }
}

impl From<u64> for ClauseValue {
    fn from(value: u64) -> Self {
        ClauseValue::Json(Value::from(value))
    }
}

impl From<f64> for ClauseValue {
    fn from(value: f64) -> Self {
        ClauseValue::Json(Value::from(value))
    }
}

impl From<NaiveDate> for ClauseValue {
    fn from(value: NaiveDate) -> Self {
        ClauseValue::Date(value)
    }
}

impl From<NaiveDateTime> for ClauseValue {
    fn from(value: NaiveDateTime) -> Self {
        ClauseValue::DateTime(value)
    }
}

impl From<NaiveTime> for ClauseValue {
    fn from(value: NaiveTime) -> Self {
        ClauseValue::Time(value)
    }
}

impl<T: Into<ClauseValue>> From<Option<T>> for ClauseValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

impl<T: Into<ClauseValue>> From<Vec<T>> for ClauseValue {
    fn from(values: Vec<T>) -> Self {
        ClauseValue::Json(Value::Array(
            values.into_iter().map(|v| v.into().to_parameter()).collect(),
        ))
    }
}

/// Clause list of a nested group or EXISTS sub-query. `label` is only meaningful for EXISTS.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub wheres: Vec<Clause>,
}

impl SubQuery {
    pub fn new(label: Option<&str>, wheres: Vec<Clause>) -> Self {
        Self {
            label: label.map(str::to_string),
            wheres,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClauseKind {
    Basic {
        column: String,
        operator: String,
        #[serde(default)]
        value: ClauseValue,
    },
    Column {
        first: String,
        operator: String,
        second: String,
    },
    Nested {
        query: SubQuery,
    },
    Exists {
        query: SubQuery,
        #[serde(default)]
        not: bool,
    },
    In {
        column: String,
        #[serde(default, deserialize_with = "list_or_map")]
        values: Vec<ClauseValue>,
    },
    NotIn {
        column: String,
        #[serde(default, deserialize_with = "list_or_map")]
        values: Vec<ClauseValue>,
    },
    Null {
        column: String,
    },
    NotNull {
        column: String,
    },
    Between {
        column: String,
        #[serde(default, deserialize_with = "list_or_map")]
        values: Vec<ClauseValue>,
    },
    NotBetween {
        column: String,
        #[serde(default, deserialize_with = "list_or_map")]
        values: Vec<ClauseValue>,
    },
    Date {
        column: String,
        operator: String,
        value: ClauseValue,
    },
    Month {
        column: String,
        operator: String,
        value: ClauseValue,
    },
    Day {
        column: String,
        operator: String,
        value: ClauseValue,
    },
    Year {
        column: String,
        operator: String,
        value: ClauseValue,
    },
    Time {
        column: String,
        operator: String,
        value: ClauseValue,
    },
    JsonContains {
        column: String,
        value: ClauseValue,
        #[serde(default)]
        not: bool,
    },
    JsonLength {
        column: String,
        operator: String,
        value: ClauseValue,
    },
    Raw {
        sql: String,
        #[serde(default)]
        bindings: Parameters,
    },
}

impl ClauseKind {
    pub fn clause_type(&self) -> ClauseType {
        match self {
            ClauseKind::Basic { .. } => ClauseType::Basic,
            ClauseKind::Column { .. } => ClauseType::Column,
            ClauseKind::Nested { .. } => ClauseType::Nested,
            ClauseKind::Exists { .. } => ClauseType::Exists,
            ClauseKind::In { .. } => ClauseType::In,
            ClauseKind::NotIn { .. } => ClauseType::NotIn,
            ClauseKind::Null { .. } => ClauseType::Null,
            ClauseKind::NotNull { .. } => ClauseType::NotNull,
            ClauseKind::Between { .. } => ClauseType::Between,
            ClauseKind::NotBetween { .. } => ClauseType::NotBetween,
            ClauseKind::Date { .. } => ClauseType::Date,
            ClauseKind::Month { .. } => ClauseType::Month,
            ClauseKind::Day { .. } => ClauseType::Day,
            ClauseKind::Year { .. } => ClauseType::Year,
            ClauseKind::Time { .. } => ClauseType::Time,
            ClauseKind::JsonContains { .. } => ClauseType::JsonContains,
            ClauseKind::JsonLength { .. } => ClauseType::JsonLength,
            ClauseKind::Raw { .. } => ClauseType::Raw,
        }
    }
}

/// Tag-only view of [`ClauseKind`], carried by compilation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClauseType {
    Basic,
    Column,
    Nested,
    Exists,
    In,
    NotIn,
    Null,
    NotNull,
    Between,
    NotBetween,
    Date,
    Month,
    Day,
    Year,
    Time,
    JsonContains,
    JsonLength,
    Raw,
    Join,
    Select,
}

impl fmt::Display for ClauseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClauseType::Basic => "basic",
            ClauseType::Column => "column",
            ClauseType::Nested => "nested",
            ClauseType::Exists => "exists",
            ClauseType::In => "in",
            ClauseType::NotIn => "not in",
            ClauseType::Null => "null",
            ClauseType::NotNull => "not null",
            ClauseType::Between => "between",
            ClauseType::NotBetween => "not between",
            ClauseType::Date => "date",
            ClauseType::Month => "month",
            ClauseType::Day => "day",
            ClauseType::Year => "year",
            ClauseType::Time => "time",
            ClauseType::JsonContains => "json contains",
            ClauseType::JsonLength => "json length",
            ClauseType::Raw => "raw",
            ClauseType::Join => "join",
            ClauseType::Select => "select",
        };
        f.write_str(name)
    }
}

/// One predicate plus the combinator that joins it to its predecessor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    #[serde(default)]
    pub boolean: Boolean,
    #[serde(flatten)]
    pub kind: ClauseKind,
}

impl Clause {
    pub fn new(boolean: Boolean, kind: ClauseKind) -> Self {
        Self { boolean, kind }
    }

    pub fn and(kind: ClauseKind) -> Self {
        Self::new(Boolean::And, kind)
    }

    pub fn or(kind: ClauseKind) -> Self {
        Self::new(Boolean::Or, kind)
    }

    pub fn basic(column: &str, operator: &str, value: impl Into<ClauseValue>) -> ClauseKind {
        ClauseKind::Basic {
            column: column.to_string(),
            operator: operator.to_string(),
            value: value.into(),
        }
    }
}

fn list_or_map<'de, D>(deserializer: D) -> Result<Vec<ClauseValue>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items.into_iter().map(ClauseValue::Json).collect(),
        Value::Object(map) => map.into_iter().map(|(_, v)| ClauseValue::Json(v)).collect(),
        Value::Null => Vec::new(),
        other => vec![ClauseValue::Json(other)],
    })
}
