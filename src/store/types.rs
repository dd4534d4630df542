//! Query result types returned by the store.

use rusqlite::types::ValueRef;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Result of executing one read-only query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    /// Result columns in select-list order.
    pub columns: Vec<ColumnInfo>,

    /// Rows of data, at most the store's row cap.
    pub rows: Vec<Row>,

    /// Time taken to execute the query.
    #[serde(with = "duration_serde")]
    pub execution_time: Duration,

    /// Number of rows kept in `rows`.
    pub row_count: usize,

    /// Number of rows the query produced before truncation.
    pub total_rows: usize,

    /// Whether rows were dropped because the result exceeded the cap.
    #[serde(default)]
    pub was_truncated: bool,
}

impl QueryResult {
    /// Creates a result from columns and rows, untruncated.
    pub fn with_data(columns: Vec<ColumnInfo>, rows: Vec<Row>) -> Self {
        let row_count = rows.len();
        Self {
            columns,
            rows,
            execution_time: Duration::ZERO,
            row_count,
            total_rows: row_count,
            was_truncated: false,
        }
    }

    /// Returns true if the result set is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns a truncation warning message if the result was truncated.
    pub fn truncation_warning(&self) -> Option<String> {
        self.was_truncated.then(|| {
            format!(
                "Result truncated: showing {} of {} rows",
                self.row_count, self.total_rows
            )
        })
    }

    /// Converts rows into JSON objects keyed by column name.
    pub fn to_records(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row)
                    .map(|(col, value)| (col.name.clone(), value.to_json()))
                    .collect()
            })
            .collect()
    }
}

/// Name and storage class of a result column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,

    /// SQLite storage class of the first non-NULL value (`NULL` if none).
    pub data_type: String,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// A row of data from a query result.
pub type Row = Vec<Value>;

/// A single value read from the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns true if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Name of the SQLite storage class holding this value.
    pub fn storage_class(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Int(_) => "INTEGER",
            Value::Float(_) => "REAL",
            Value::Text(_) => "TEXT",
            Value::Bytes(_) => "BLOB",
        }
    }

    /// Converts the value to JSON; non-finite floats become null.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Int(i) => (*i).into(),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => s.clone().into(),
            Value::Bytes(b) => format!("<{} bytes>", b.len()).into(),
        }
    }

    /// Renders the value for tabular display.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Text(s) => s.clone(),
            Value::Bytes(b) => format!("<{} bytes>", b.len()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(v: ValueRef<'_>) -> Self {
        match v {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Int(i),
            ValueRef::Real(f) => Value::Float(f),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

/// Serde support for Duration as whole milliseconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Null.to_display_string(), "NULL");
        assert_eq!(Value::Int(42).to_display_string(), "42");
        assert_eq!(Value::Float(150.0).to_display_string(), "150");
        assert_eq!(Value::from("ABC").to_display_string(), "ABC");
        assert_eq!(Value::Bytes(vec![1, 2, 3]).to_display_string(), "<3 bytes>");
    }

    #[test]
    fn test_value_from_sqlite() {
        assert_eq!(Value::from(ValueRef::Integer(7)), Value::Int(7));
        assert_eq!(Value::from(ValueRef::Text(b"abc")), Value::from("abc"));
        assert!(Value::from(ValueRef::Null).is_null());
        assert_eq!(Value::from(ValueRef::Real(1.5)).storage_class(), "REAL");
    }

    #[test]
    fn test_to_records() {
        let result = QueryResult::with_data(
            vec![ColumnInfo::new("trigramme", "TEXT"), ColumnInfo::new("total", "REAL")],
            vec![
                vec![Value::from("ABC"), Value::Float(150.0)],
                vec![Value::from("XYZ"), Value::Null],
            ],
        );

        assert_eq!(
            serde_json::to_value(result.to_records()).unwrap(),
            json!([
                {"trigramme": "ABC", "total": 150.0},
                {"trigramme": "XYZ", "total": null}
            ])
        );
    }

    #[test]
    fn test_non_finite_float_is_null_in_json() {
        assert_eq!(Value::Float(f64::NAN).to_json(), serde_json::Value::Null);
    }

    #[test]
    fn test_truncation_warning() {
        let mut result = QueryResult::with_data(vec![], vec![vec![]; 3]);
        assert_eq!(result.truncation_warning(), None);

        result.was_truncated = true;
        result.total_rows = 10;
        assert_eq!(
            result.truncation_warning().as_deref(),
            Some("Result truncated: showing 3 of 10 rows")
        );
    }
}
