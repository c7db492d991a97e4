//! The local keyed replica and the replicated operation body.
//!
//! `TableStore` is a pure state container: no I/O, no messaging. The
//! table server owns the single mutating reference; reads go through the
//! shared handle directly. `WriteOp` is the one operation type that
//! local writes, replication fan-out and queued drains all funnel
//! through, so every path applies mutations identically.

use meshtable_types::{Record, TableType, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// A replicated mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteOp {
    /// Insert one record (per-key overwrite for `ordered_set`).
    Insert(Record),
    /// Insert many records as one operation.
    InsertMany(Vec<Record>),
    /// Delete every record with the given key.
    Delete(Value),
    /// Delete every record with any of the given keys.
    DeleteMany(Vec<Value>),
    /// Delete one record by whole value (bag-oriented).
    DeleteObject(Record),
    /// Delete many records by whole value.
    DeleteObjects(Vec<Record>),
}

/// The local contents of one table.
#[derive(Debug, Clone)]
pub enum TableStore {
    /// At most one record per key.
    OrderedSet {
        keypos: usize,
        rows: BTreeMap<Value, Record>,
    },
    /// Any number of distinct records per key.
    Bag {
        keypos: usize,
        rows: BTreeMap<Value, Vec<Record>>,
    },
}

impl TableStore {
    /// Creates an empty store of the given shape.
    #[must_use]
    pub fn new(table_type: TableType, keypos: usize) -> Self {
        match table_type {
            TableType::OrderedSet => Self::OrderedSet {
                keypos,
                rows: BTreeMap::new(),
            },
            TableType::Bag => Self::Bag {
                keypos,
                rows: BTreeMap::new(),
            },
        }
    }

    /// The table's shape.
    #[must_use]
    pub fn table_type(&self) -> TableType {
        match self {
            Self::OrderedSet { .. } => TableType::OrderedSet,
            Self::Bag { .. } => TableType::Bag,
        }
    }

    /// The 1-indexed key position.
    #[must_use]
    pub fn keypos(&self) -> usize {
        match self {
            Self::OrderedSet { keypos, .. } | Self::Bag { keypos, .. } => *keypos,
        }
    }

    /// Number of records held.
    #[must_use]
    pub fn size(&self) -> usize {
        match self {
            Self::OrderedSet { rows, .. } => rows.len(),
            Self::Bag { rows, .. } => rows.values().map(Vec::len).sum(),
        }
    }

    /// All records with the given key.
    #[must_use]
    pub fn lookup(&self, key: &Value) -> Vec<Record> {
        match self {
            Self::OrderedSet { rows, .. } => rows.get(key).cloned().into_iter().collect(),
            Self::Bag { rows, .. } => rows.get(key).cloned().unwrap_or_default(),
        }
    }

    /// Full contents, ordered by key ascending.
    #[must_use]
    pub fn dump(&self) -> Vec<Record> {
        match self {
            Self::OrderedSet { rows, .. } => rows.values().cloned().collect(),
            Self::Bag { rows, .. } => rows.values().flatten().cloned().collect(),
        }
    }

    /// Applies one mutation. Records too short to carry a key are
    /// logged and skipped rather than crashing the server.
    pub fn apply(&mut self, op: &WriteOp) {
        match op {
            WriteOp::Insert(rec) => self.insert(rec.clone()),
            WriteOp::InsertMany(recs) => {
                for rec in recs {
                    self.insert(rec.clone());
                }
            }
            WriteOp::Delete(key) => self.delete_key(key),
            WriteOp::DeleteMany(keys) => {
                for key in keys {
                    self.delete_key(key);
                }
            }
            WriteOp::DeleteObject(rec) => self.delete_object(rec),
            WriteOp::DeleteObjects(recs) => {
                for rec in recs {
                    self.delete_object(rec);
                }
            }
        }
    }

    fn insert(&mut self, rec: Record) {
        let keypos = self.keypos();
        let Some(key) = rec.key(keypos).cloned() else {
            warn!(keypos, arity = rec.arity(), "dropping record with no key");
            return;
        };
        match self {
            Self::OrderedSet { rows, .. } => {
                rows.insert(key, rec);
            }
            Self::Bag { rows, .. } => {
                let bucket = rows.entry(key).or_default();
                if !bucket.contains(&rec) {
                    bucket.push(rec);
                }
            }
        }
    }

    fn delete_key(&mut self, key: &Value) {
        match self {
            Self::OrderedSet { rows, .. } => {
                rows.remove(key);
            }
            Self::Bag { rows, .. } => {
                rows.remove(key);
            }
        }
    }

    fn delete_object(&mut self, rec: &Record) {
        let keypos = self.keypos();
        let Some(key) = rec.key(keypos) else {
            return;
        };
        match self {
            Self::OrderedSet { rows, .. } => {
                // Only remove when the whole record matches.
                if rows.get(key) == Some(rec) {
                    rows.remove(key);
                }
            }
            Self::Bag { rows, .. } => {
                if let Some(bucket) = rows.get_mut(key) {
                    bucket.retain(|r| r != rec);
                    if bucket.is_empty() {
                        rows.remove(key);
                    }
                }
            }
        }
    }
}
