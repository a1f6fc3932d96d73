//! Schema Module
//!
//! Table metadata collaborator: table id → schema. The execution core uses it
//! to enumerate MR counter fields, detect multi-region tables, check row
//! version evolution, and derive secondary index keys.
//!
//! ## Key Layout
//! A row key alternates table id components and primary key components from
//! the top-level ancestor down:
//! ```text
//! [top-id, top-pk..., child-id, child-pk..., grandchild-id, ...]
//! ```

mod targets;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{AtlasError, Result};
use crate::keyspace::Key;
use crate::value::{FieldPath, FieldValue, Row};

pub use targets::{KeyMatch, ResolvedTargets, TargetTables};

/// Table identifier
pub type TableId = u64;

/// One level of a table's key layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutLevel {
    pub table_id: TableId,
    pub pk_components: usize,
}

/// Secondary index definition (single field)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    pub name: String,
    pub field: FieldPath,
}

/// Table schema
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub id: TableId,
    pub name: String,
    pub namespace: Option<String>,
    pub parent_id: Option<TableId>,
    /// Primary key components at this level
    pub pk_components: usize,
    /// Current table version
    pub version: u32,
    /// Rows written against an older table version are rejected
    pub min_writable_version: u32,
    /// Regions the table replicates to; empty for single-region tables
    pub regions: Vec<u32>,
    /// MR counter columns (single-element paths are top-level columns)
    pub mr_counters: Vec<FieldPath>,
    /// Table has no non-key columns
    pub key_only: bool,
    pub indexes: Vec<IndexDef>,
    /// Filled in by the catalog from the parent chain
    layout: Vec<LayoutLevel>,
}

impl TableSchema {
    pub fn new(id: TableId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            namespace: None,
            parent_id: None,
            pk_components: 1,
            version: 1,
            min_writable_version: 1,
            regions: Vec::new(),
            mr_counters: Vec::new(),
            key_only: false,
            indexes: Vec::new(),
            layout: Vec::new(),
        }
    }

    pub fn namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = Some(ns.into());
        self
    }

    pub fn parent(mut self, parent_id: TableId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn pk_components(mut self, n: usize) -> Self {
        self.pk_components = n;
        self
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn min_writable_version(mut self, version: u32) -> Self {
        self.min_writable_version = version;
        self
    }

    pub fn regions(mut self, regions: Vec<u32>) -> Self {
        self.regions = regions;
        self
    }

    /// Add a top-level MR counter column
    pub fn mr_counter(mut self, name: impl Into<String>) -> Self {
        self.mr_counters.push(vec![name.into()]);
        self
    }

    /// Add an MR counter nested inside a JSON column
    pub fn json_mr_counter(mut self, path: &[&str]) -> Self {
        self.mr_counters
            .push(path.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn key_only(mut self, key_only: bool) -> Self {
        self.key_only = key_only;
        self
    }

    pub fn index(mut self, name: impl Into<String>, field: &[&str]) -> Self {
        self.indexes.push(IndexDef {
            name: name.into(),
            field: field.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn is_multi_region(&self) -> bool {
        !self.regions.is_empty()
    }

    pub fn has_mr_counters(&self) -> bool {
        !self.mr_counters.is_empty()
    }

    pub fn layout(&self) -> &[LayoutLevel] {
        &self.layout
    }

    /// Number of components in a full row key
    pub fn key_len(&self) -> usize {
        self.layout.iter().map(|l| 1 + l.pk_components).sum()
    }

    /// Key component holding this table's id
    pub fn id_component(&self) -> Vec<u8> {
        id_component(self.id)
    }

    /// Build a row key from primary key values of every level, top first
    pub fn row_key(&self, pk_values: &[&str]) -> Result<Key> {
        let expected: usize = self.layout.iter().map(|l| l.pk_components).sum();
        if pk_values.len() != expected {
            return Err(AtlasError::IllegalArgument(format!(
                "Table {} needs {} key values, got {}",
                self.name,
                expected,
                pk_values.len()
            )));
        }
        let mut components = Vec::with_capacity(self.key_len());
        let mut values = pk_values.iter();
        for level in &self.layout {
            components.push(id_component(level.table_id));
            for _ in 0..level.pk_components {
                if let Some(v) = values.next() {
                    components.push(v.as_bytes().to_vec());
                }
            }
        }
        Ok(Key::new(components))
    }

    /// Shard key prefix (table id + top-level pk values)
    pub fn shard_key(&self, pk_values: &[&str]) -> Key {
        let mut components = vec![id_component(self.layout.first().map_or(self.id, |l| l.table_id))];
        components.extend(pk_values.iter().map(|v| v.as_bytes().to_vec()));
        Key::new(components)
    }

    /// True if `key` is a full row key of this table
    pub fn owns_key(&self, key: &Key) -> bool {
        if key.len() != self.key_len() {
            return false;
        }
        let mut pos = 0;
        for level in &self.layout {
            if key.components()[pos] != id_component(level.table_id) {
                return false;
            }
            pos += 1 + level.pk_components;
        }
        true
    }

    /// Ancestor key of `key` at layout depth `depth` (0 = top-level table)
    pub fn ancestor_key(&self, key: &Key, depth: usize) -> Key {
        let len: usize = self.layout[..=depth.min(self.layout.len().saturating_sub(1))]
            .iter()
            .map(|l| 1 + l.pk_components)
            .sum();
        key.prefix(len)
    }

    /// Depth of this table in its hierarchy (0 = top-level)
    pub fn depth(&self) -> usize {
        self.layout.len().saturating_sub(1)
    }

    pub fn index_def(&self, name: &str) -> Option<&IndexDef> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// Secondary key of `row` for index `name`; `None` if the field is absent
    pub fn index_key(&self, name: &str, row: &Row) -> Option<Vec<u8>> {
        let def = self.index_def(name)?;
        row.get_path(&def.field).and_then(index_field_bytes)
    }

    /// Reject rows written against a table version that is no longer writable
    pub fn check_row_version(&self, row_version: u32) -> Result<()> {
        if row_version < self.min_writable_version {
            return Err(AtlasError::TableVersionMismatch {
                table_id: self.id,
                client_version: row_version,
                required_version: self.min_writable_version,
            });
        }
        Ok(())
    }
}

/// Key component for a table id
pub fn id_component(table_id: TableId) -> Vec<u8> {
    format!("t{}", table_id).into_bytes()
}

/// Order-preserving encoding of an indexable field value
pub fn index_field_bytes(value: &FieldValue) -> Option<Vec<u8>> {
    match value {
        FieldValue::Integer(i) => Some(encode_index_int(*i)),
        FieldValue::Counter(c) => Some(encode_index_int(c.value())),
        FieldValue::Text(s) => {
            let mut out = vec![0x03];
            out.extend_from_slice(s.as_bytes());
            Some(out)
        }
        FieldValue::Binary(b) => {
            let mut out = vec![0x04];
            out.extend_from_slice(b);
            Some(out)
        }
        FieldValue::Null | FieldValue::Map(_) => None,
    }
}

fn encode_index_int(i: i64) -> Vec<u8> {
    let mut out = vec![0x02];
    out.extend_from_slice(&((i as u64) ^ (1 << 63)).to_be_bytes());
    out
}

// =============================================================================
// Metadata Collaborator
// =============================================================================

/// Table metadata lookup
pub trait TableMetadata: Send + Sync {
    /// Schema for `id`
    fn table(&self, id: TableId) -> Option<Arc<TableSchema>>;

    /// Every known table
    fn tables(&self) -> Vec<Arc<TableSchema>>;

    /// Schema generation observed by this lookup
    fn metadata_seq_num(&self) -> u64;

    /// Table owning a full row key, if any
    fn table_for_key(&self, key: &Key) -> Option<Arc<TableSchema>> {
        self.tables().into_iter().find(|t| t.owns_key(key))
    }
}

/// In-memory table catalog
#[derive(Default)]
pub struct Catalog {
    tables: RwLock<HashMap<TableId, Arc<TableSchema>>>,
    seq_num: AtomicU64,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table; parents must be registered first
    pub fn add_table(&self, mut schema: TableSchema) -> Result<Arc<TableSchema>> {
        let mut tables = self.tables.write();
        if tables.contains_key(&schema.id) {
            return Err(AtlasError::IllegalArgument(format!(
                "Table {} already exists",
                schema.id
            )));
        }

        let mut layout = match schema.parent_id {
            Some(pid) => {
                let parent = tables.get(&pid).ok_or(AtlasError::TableNotFound(pid))?;
                if schema.namespace.is_none() {
                    schema.namespace = parent.namespace.clone();
                }
                if schema.regions.is_empty() {
                    schema.regions = parent.regions.clone();
                }
                parent.layout.clone()
            }
            None => Vec::new(),
        };
        layout.push(LayoutLevel {
            table_id: schema.id,
            pk_components: schema.pk_components,
        });
        schema.layout = layout;

        let schema = Arc::new(schema);
        tables.insert(schema.id, Arc::clone(&schema));
        self.seq_num.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("Registered table {} ({})", schema.name, schema.id);
        Ok(schema)
    }

    /// Replace an existing table's schema (schema evolution)
    pub fn evolve_table(&self, id: TableId, f: impl FnOnce(&mut TableSchema)) -> Result<Arc<TableSchema>> {
        let mut tables = self.tables.write();
        let current = tables.get(&id).ok_or(AtlasError::TableNotFound(id))?;
        let mut next = TableSchema::clone(current);
        f(&mut next);
        next.layout = current.layout.clone();
        let next = Arc::new(next);
        tables.insert(id, Arc::clone(&next));
        self.seq_num.fetch_add(1, Ordering::SeqCst);
        Ok(next)
    }
}

impl TableMetadata for Catalog {
    fn table(&self, id: TableId) -> Option<Arc<TableSchema>> {
        self.tables.read().get(&id).cloned()
    }

    fn tables(&self) -> Vec<Arc<TableSchema>> {
        self.tables.read().values().cloned().collect()
    }

    fn metadata_seq_num(&self) -> u64 {
        self.seq_num.load(Ordering::SeqCst)
    }
}
