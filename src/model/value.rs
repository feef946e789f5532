//! Field value type stored in record slots.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::RecordId;
use crate::schema::FieldKind;

/// A single stored field value.
///
/// Absent fields are represented by `Option::None` at the slot level, so
/// there is no `Null` variant here. `Ref` is the stored form of a pointer
/// field; its textual form (the target's name) is only produced by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Text(String),
    Int(i64),
    Real(f64),
    Ref(RecordId),
}

// ============================================================================
// Type checking
// ============================================================================

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Text(_) => "TEXT",
            Value::Int(_) => "INTEGER",
            Value::Real(_) => "REAL",
            Value::Ref(_) => "REFERENCE",
        }
    }

    pub fn is_ref(&self) -> bool { matches!(self, Value::Ref(_)) }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Real(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_ref_id(&self) -> Option<RecordId> {
        match self {
            Value::Ref(id) => Some(*id),
            _ => None,
        }
    }

    /// Whether this value can be stored in a field of the given kind.
    ///
    /// Integers are accepted by real fields; nothing but `Ref` is accepted
    /// by reference fields.
    pub fn fits(&self, kind: FieldKind) -> bool {
        match (kind, self) {
            (FieldKind::Text, Value::Text(_)) => true,
            (FieldKind::Integer, Value::Int(_)) => true,
            (FieldKind::Real, Value::Real(_) | Value::Int(_)) => true,
            (FieldKind::Reference, Value::Ref(_)) => true,
            _ => false,
        }
    }

    /// Parse raw field text for a scalar field kind.
    ///
    /// Returns `None` for blank input. Reference fields are resolved by the
    /// store, never parsed here, so they come back as `Text`.
    pub fn parse(kind: FieldKind, raw: &str) -> Option<std::result::Result<Value, String>> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        Some(match kind {
            FieldKind::Text | FieldKind::Reference => Ok(Value::Text(raw.to_owned())),
            FieldKind::Integer => raw.parse::<i64>().map(Value::Int).map_err(|_| raw.to_owned()),
            FieldKind::Real => raw.parse::<f64>().map(Value::Real).map_err(|_| raw.to_owned()),
        })
    }
}

// ============================================================================
// Conversions (From impls)
// ============================================================================

impl From<i32> for Value { fn from(v: i32) -> Self { Value::Int(v as i64) } }
impl From<i64> for Value { fn from(v: i64) -> Self { Value::Int(v) } }
impl From<f64> for Value { fn from(v: f64) -> Self { Value::Real(v) } }
impl From<String> for Value { fn from(v: String) -> Self { Value::Text(v) } }
impl From<&str> for Value { fn from(v: &str) -> Self { Value::Text(v.to_owned()) } }
impl From<RecordId> for Value { fn from(v: RecordId) -> Self { Value::Ref(v) } }

// ============================================================================
// Display
// ============================================================================

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{s}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Real(v) => write!(f, "{v}"),
            Value::Ref(id) => write!(f, "{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_from() {
        assert_eq!(Value::from("hello"), Value::Text("hello".into()));
        assert_eq!(Value::from(42), Value::Int(42));
        assert_eq!(Value::from(2.5), Value::Real(2.5));
    }

    #[test]
    fn test_parse_by_kind() {
        assert_eq!(Value::parse(FieldKind::Integer, " 12 "), Some(Ok(Value::Int(12))));
        assert_eq!(Value::parse(FieldKind::Real, "0.25"), Some(Ok(Value::Real(0.25))));
        assert_eq!(Value::parse(FieldKind::Real, "abc"), Some(Err("abc".to_string())));
        assert_eq!(Value::parse(FieldKind::Text, "   "), None);
    }

    #[test]
    fn test_fits() {
        assert!(Value::Int(3).fits(FieldKind::Real));
        assert!(!Value::Real(3.5).fits(FieldKind::Integer));
        assert!(!Value::Text("Z1".into()).fits(FieldKind::Reference));
        assert!(Value::Ref(RecordId::new()).fits(FieldKind::Reference));
    }
}
