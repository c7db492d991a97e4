//! Records, keys and table types.
//!
//! A record is a tuple-like row of scalar values with a designated key
//! position (1-indexed, default 1). The key is the value at that
//! position; the remainder is opaque payload. Records are the atomic
//! units of storage and replication.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A scalar value inside a record.
///
/// Values carry a derived total order (variant rank first, then payload)
/// so that `ordered_set` keys sort deterministically on every replica.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Value {
    /// A signed integer.
    Int(i64),
    /// A text value.
    Text(String),
    /// A boolean.
    Bool(bool),
}

impl Value {
    /// Shorthand for an integer value.
    #[must_use]
    pub fn int(v: i64) -> Self {
        Self::Int(v)
    }

    /// Shorthand for a text value.
    #[must_use]
    pub fn text(v: impl Into<String>) -> Self {
        Self::Text(v.into())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
        }
    }
}

/// A tuple-like row of values.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Vec<Value>);

impl Record {
    /// Creates a record from its values.
    #[must_use]
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// Returns the value at the 1-indexed key position, or `None` when
    /// the record is too short to have one.
    #[must_use]
    pub fn key(&self, keypos: usize) -> Option<&Value> {
        keypos.checked_sub(1).and_then(|i| self.0.get(i))
    }

    /// Returns the number of values in the record.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.0.len()
    }

    /// Returns the record's values.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.0
    }
}

impl From<Vec<Value>> for Record {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

impl<const N: usize> From<[Value; N]> for Record {
    fn from(values: [Value; N]) -> Self {
        Self(values.into())
    }
}

/// The shape of a table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableType {
    /// At most one record per key; keys are totally ordered and dumps
    /// are sorted by key ascending.
    #[default]
    OrderedSet,
    /// Any number of distinct records per key; records are compared by
    /// whole value for deletion.
    Bag,
}
