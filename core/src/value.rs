//! Scalar value type used for index keys and query predicates

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Scalar value indexed by the engine.
///
/// Values form a single total order: type classes are ordered
/// `MinValue < Null < numeric < String < Boolean < DateTime < MaxValue`,
/// and the three numeric variants compare against each other by numeric
/// value. `MinValue` and `MaxValue` are the boundary scalars: they key the
/// index sentinels and are the defined results of `min()`/`max()` on an
/// empty collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    MinValue,
    Null,
    Int32(i32),
    Int64(i64),
    Double(f64),
    String(String),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    MaxValue,
}

impl Value {
    /// Rank of the value's type class within the total order.
    fn type_order(&self) -> u8 {
        match self {
            Value::MinValue => 0,
            Value::Null => 1,
            Value::Int32(_) | Value::Int64(_) | Value::Double(_) => 2,
            Value::String(_) => 3,
            Value::Boolean(_) => 4,
            Value::DateTime(_) => 5,
            Value::MaxValue => 6,
        }
    }

    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if the value is one of the numeric variants
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int32(_) | Value::Int64(_) | Value::Double(_))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Int32(a), Value::Int32(b)) => a.cmp(b),
            (Value::Int64(a), Value::Int64(b)) => a.cmp(b),
            (Value::Int32(a), Value::Int64(b)) => i64::from(*a).cmp(b),
            (Value::Int64(a), Value::Int32(b)) => a.cmp(&i64::from(*b)),
            (Value::Double(a), Value::Double(b)) => a.total_cmp(b),
            (Value::Int32(a), Value::Double(b)) => f64::from(*a).total_cmp(b),
            (Value::Double(a), Value::Int32(b)) => a.total_cmp(&f64::from(*b)),
            (Value::Int64(a), Value::Double(b)) => (*a as f64).total_cmp(b),
            (Value::Double(a), Value::Int64(b)) => a.total_cmp(&(*b as f64)),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            _ => self.type_order().cmp(&other.type_order()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Equality must agree with the total order, so Int32(1), Int64(1) and
// Double(1.0) are all equal.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int32(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int64(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::DateTime(value)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::MinValue => write!(f, "$minValue"),
            Value::Null => write!(f, "null"),
            Value::Int32(i) => write!(f, "{}", i),
            Value::Int64(i) => write!(f, "{}", i),
            Value::Double(d) => write!(f, "{}", d),
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            Value::MaxValue => write!(f, "$maxValue"),
        }
    }
}
