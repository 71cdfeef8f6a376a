use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// One raw source row, column name to value, in source column order.
pub type Row = Map<String, Value>;

/// One canonical record, field name to value.
pub type Record = Map<String, Value>;

/// Identifiable reference of a row or record within a run.
///
/// The primary-key value is used when it can be extracted, otherwise the 1-based position of the
/// row in the run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RecordRef {
    Key(String),
    Position(usize),
}

impl RecordRef {
    /// Builds a reference from a primary-key value, falling back to `position` when the value is
    /// missing or blank.
    pub fn from_key_value(value: Option<&Value>, position: usize) -> RecordRef {
        let key = match value {
            Some(Value::String(value)) => Some(value.trim().to_owned()),
            Some(Value::Number(value)) => Some(value.to_string()),
            Some(Value::Bool(value)) => Some(value.to_string()),
            _ => None,
        };

        match key {
            Some(key) if !key.is_empty() => RecordRef::Key(key),
            _ => RecordRef::Position(position),
        }
    }

    /// Shifts a position reference by `offset` rows. Key references are returned unchanged.
    pub fn offset(self, offset: usize) -> RecordRef {
        match self {
            RecordRef::Position(position) => RecordRef::Position(position + offset),
            key => key,
        }
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordRef::Key(key) => f.write_str(key),
            RecordRef::Position(position) => write!(f, "row #{position}"),
        }
    }
}
