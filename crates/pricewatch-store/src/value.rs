//! Scalar values and result records.
//!
//! A [`Record`] is an *ordered* mapping from column name to [`Value`]. Column
//! order follows the `SELECT` list of the query that produced it, and every
//! record of one result shares the same columns.

use chrono::NaiveDate;
use rusqlite::types::ValueRef;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A single cell of a query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Date(NaiveDate),
}

impl Value {
    /// Convert a borrowed SQLite cell; `as_date` parses `YYYY-MM-DD` text.
    pub fn from_sql(raw: ValueRef<'_>, as_date: bool) -> Self {
        match raw {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                let text = String::from_utf8_lossy(bytes).into_owned();
                if as_date {
                    if let Ok(date) = NaiveDate::parse_from_str(&text, "%Y-%m-%d") {
                        return Value::Date(date);
                    }
                }
                Value::Text(text)
            }
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view; integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Real(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r:.2}"),
            Value::Text(s) => f.write_str(s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

/// One row of a materialised query result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(columns: usize) -> Self {
        Self {
            fields: Vec::with_capacity(columns),
        }
    }

    /// Append a column. Later duplicates shadow nothing; lookups return the first match.
    pub fn push(&mut self, column: impl Into<String>, value: Value) {
        self.fields.push((column.into(), value));
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

struct RecordVisitor;

impl<'de> Visitor<'de> for RecordVisitor {
    type Value = Record;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of column name to value")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Record, A::Error> {
        let mut record = Record::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((name, value)) = access.next_entry::<String, Value>()? {
            record.push(name, value);
        }
        Ok(record)
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(RecordVisitor)
    }
}

/// True when all records expose the same column names in the same order.
pub fn uniform_columns(records: &[Record]) -> bool {
    let Some(first) = records.first() else {
        return true;
    };
    records
        .iter()
        .all(|record| record.columns().eq(first.columns()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Record {
        let mut record = Record::new();
        record.push("city", Value::Text("Lviv".to_string()));
        record.push("store_count", Value::Integer(5));
        record.push("avg_price", Value::Null);
        record.push(
            "month",
            Value::Date(NaiveDate::from_ymd_opt(2026, 3, 1).expect("date")),
        );
        record
    }

    #[test]
    fn record_json_keeps_column_order() {
        let json = serde_json::to_string(&sample()).expect("serialize");
        let city = json.find("\"city\"").expect("city");
        let count = json.find("\"store_count\"").expect("store_count");
        let month = json.find("\"month\"").expect("month");
        assert!(city < count && count < month);

        let back: Record = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, sample());
        assert_eq!(
            back.get("month").and_then(Value::as_date),
            NaiveDate::from_ymd_opt(2026, 3, 1)
        );
    }

    #[test]
    fn date_parsing_falls_back_to_text() {
        let v = Value::from_sql(ValueRef::Text(b"not-a-date"), true);
        assert_eq!(v, Value::Text("not-a-date".to_string()));
        let v = Value::from_sql(ValueRef::Text(b"2025-11-01"), true);
        assert!(v.as_date().is_some());
    }

    #[test]
    fn uniform_columns_detects_mismatch() {
        let a = sample();
        let mut b = Record::new();
        b.push("city", Value::Text("Kyiv".to_string()));
        assert!(uniform_columns(&[a.clone(), a.clone()]));
        assert!(!uniform_columns(&[a, b]));
        assert!(uniform_columns(&[]));
    }
}
