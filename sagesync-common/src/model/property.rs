//! Raw and typed attribute values
//!
//! SAGE delivers property maps with heterogeneous values. `PropertyValue` is
//! the raw wire shape; `FieldValue` is the typed shape after coercion onto a
//! domain field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw property value as delivered by SAGE
///
/// Untagged: booleans, integers and reals deserialize natively; RFC 3339
/// strings become dates; everything else is text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Real(f64),
    Date(DateTime<Utc>),
    Text(String),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(v) => write!(f, "{}", v),
            PropertyValue::Int(v) => write!(f, "{}", v),
            PropertyValue::Real(v) => write!(f, "{}", v),
            PropertyValue::Date(v) => write!(f, "{}", v.to_rfc3339()),
            PropertyValue::Text(v) => write!(f, "{}", v),
        }
    }
}

/// Typed value of a schema-mapped domain field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Int(i64),
    Bool(bool),
    Date(DateTime<Utc>),
}

impl FieldValue {
    /// String rendering used for display-name templating and logging
    pub fn render(&self) -> String {
        match self {
            FieldValue::Text(v) => v.clone(),
            FieldValue::Int(v) => v.to_string(),
            FieldValue::Bool(v) => v.to_string(),
            FieldValue::Date(v) => v.to_rfc3339(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_deserialization() {
        let v: PropertyValue = serde_json::from_str("true").unwrap();
        assert_eq!(v, PropertyValue::Bool(true));

        let v: PropertyValue = serde_json::from_str("42").unwrap();
        assert_eq!(v, PropertyValue::Int(42));

        let v: PropertyValue = serde_json::from_str("\"female\"").unwrap();
        assert_eq!(v, PropertyValue::Text("female".to_string()));
    }

    #[test]
    fn test_rfc3339_string_becomes_date() {
        let v: PropertyValue = serde_json::from_str("\"2024-03-01T10:30:00Z\"").unwrap();
        match v {
            PropertyValue::Date(d) => assert_eq!(d.timestamp(), 1709289000),
            other => panic!("expected date, got {:?}", other),
        }
    }
}
