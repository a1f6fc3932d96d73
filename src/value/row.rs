//! Table rows
//!
//! A row is a table version plus named fields. Fields may nest (JSON-like
//! maps), and MR counter fields may appear at the top level or inside a map.
//!
//! ## Encoding
//! ```text
//! ┌────────────┬──────────────────────────────┐
//! │ Format (1) │ bincode(Row)                 │
//! └────────────┴──────────────────────────────┘
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{AtlasError, Result};

/// Format byte leading every encoded row
pub const ROW_FORMAT: u8 = 0x01;

/// A field path; a single element names a top-level field
pub type FieldPath = Vec<String>;

/// One table row
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    /// Table version the row was written against
    pub table_version: u32,
    pub fields: BTreeMap<String, FieldValue>,
}

/// Field value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Integer(i64),
    Text(String),
    Binary(Vec<u8>),
    Counter(MrCounter),
    Map(BTreeMap<String, FieldValue>),
}

impl Row {
    pub fn new(table_version: u32) -> Self {
        Self {
            table_version,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter
    pub fn with(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Look up a (possibly nested) field
    pub fn get_path(&self, path: &[String]) -> Option<&FieldValue> {
        let (first, rest) = path.split_first()?;
        let mut current = self.fields.get(first)?;
        for name in rest {
            current = match current {
                FieldValue::Map(map) => map.get(name)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Set a (possibly nested) field, creating intermediate maps
    ///
    /// Returns false if an intermediate field exists and is not a map.
    pub fn set_path(&mut self, path: &[String], value: FieldValue) -> bool {
        let Some((last, parents)) = path.split_last() else {
            return false;
        };
        let mut map = &mut self.fields;
        for name in parents {
            let entry = map
                .entry(name.clone())
                .or_insert_with(|| FieldValue::Map(BTreeMap::new()));
            map = match entry {
                FieldValue::Map(inner) => inner,
                _ => return false,
            };
        }
        map.insert(last.clone(), value);
        true
    }

    /// Remove a (possibly nested) field
    pub fn remove_path(&mut self, path: &[String]) -> Option<FieldValue> {
        let (last, parents) = path.split_last()?;
        let mut map = &mut self.fields;
        for name in parents {
            map = match map.get_mut(name)? {
                FieldValue::Map(inner) => inner,
                _ => return None,
            };
        }
        map.remove(last)
    }

    /// Encode as format byte + bincode body
    pub fn encode(&self) -> Result<Vec<u8>> {
        let body = bincode::serialize(self)?;
        let mut out = Vec::with_capacity(1 + body.len());
        out.push(ROW_FORMAT);
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Decode bytes produced by [`Row::encode`]
    pub fn decode(bytes: &[u8]) -> Result<Row> {
        match bytes.split_first() {
            Some((&ROW_FORMAT, body)) => Ok(bincode::deserialize(body)?),
            Some((format, _)) => Err(AtlasError::Serialization(format!(
                "Unknown row format: 0x{:02x}",
                format
            ))),
            None => Err(AtlasError::Serialization("Empty row value".to_string())),
        }
    }
}

// =============================================================================
// MR Counter
// =============================================================================

/// Multi-region counter (PN-counter)
///
/// Each region only ever grows its own increment and decrement totals, so
/// merging takes the per-region maximum. Merge is commutative, associative
/// and idempotent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MrCounter {
    increments: BTreeMap<u32, u64>,
    decrements: BTreeMap<u32, u64>,
}

impl MrCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a delta on behalf of `region_id`
    pub fn add(&mut self, region_id: u32, delta: i64) {
        let side = if delta >= 0 {
            &mut self.increments
        } else {
            &mut self.decrements
        };
        *side.entry(region_id).or_insert(0) += delta.unsigned_abs();
    }

    /// Current counter value
    pub fn value(&self) -> i64 {
        let inc: u64 = self.increments.values().sum();
        let dec: u64 = self.decrements.values().sum();
        inc as i64 - dec as i64
    }

    /// Per-region maximum of both sides
    pub fn merge(&self, other: &MrCounter) -> MrCounter {
        MrCounter {
            increments: merge_max(&self.increments, &other.increments),
            decrements: merge_max(&self.decrements, &other.decrements),
        }
    }
}

fn merge_max(a: &BTreeMap<u32, u64>, b: &BTreeMap<u32, u64>) -> BTreeMap<u32, u64> {
    let mut out = a.clone();
    for (&region, &count) in b {
        let slot = out.entry(region).or_insert(0);
        *slot = (*slot).max(count);
    }
    out
}
