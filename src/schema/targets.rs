//! Target tables for multi-key table operations
//!
//! A table scan names the tables whose rows it returns (a target table and
//! optionally some of its descendants) and, separately, the ancestor tables
//! whose rows are emitted alongside each returned row.

use std::sync::Arc;

use crate::error::{AtlasError, Result};
use crate::keyspace::Key;

use super::{id_component, TableId, TableMetadata, TableSchema};

/// Wire form: table ids only
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetTables {
    /// Tables whose rows are returned; the first is the primary target
    pub targets: Vec<TableId>,
    /// Ancestor tables whose rows are returned once per distinct key
    pub ancestors: Vec<TableId>,
}

impl TargetTables {
    pub fn single(table_id: TableId) -> Self {
        Self {
            targets: vec![table_id],
            ancestors: Vec::new(),
        }
    }

    pub fn with_child(mut self, table_id: TableId) -> Self {
        self.targets.push(table_id);
        self
    }

    pub fn with_ancestor(mut self, table_id: TableId) -> Self {
        self.ancestors.push(table_id);
        self
    }

    /// Look up every table id
    pub fn resolve(&self, metadata: &dyn TableMetadata) -> Result<ResolvedTargets> {
        if self.targets.is_empty() {
            return Err(AtlasError::IllegalArgument(
                "Table operation has no target tables".to_string(),
            ));
        }
        let lookup = |id: &TableId| metadata.table(*id).ok_or(AtlasError::TableNotFound(*id));
        let targets = self.targets.iter().map(lookup).collect::<Result<Vec<_>>>()?;
        let mut ancestors = self.ancestors.iter().map(lookup).collect::<Result<Vec<_>>>()?;
        // Emit outermost ancestors first
        ancestors.sort_by_key(|t| t.depth());

        let top = targets[0]
            .layout()
            .first()
            .map_or(targets[0].id, |l| l.table_id);
        Ok(ResolvedTargets {
            top_component: id_component(top),
            targets,
            ancestors,
        })
    }
}

/// Outcome of matching a scanned key against the targets
#[derive(Debug, Clone)]
pub enum KeyMatch {
    /// Row of a target table
    Target(Arc<TableSchema>),
    /// Row of some other table in the same hierarchy
    Skip,
    /// Key has left the hierarchy; nothing further can match
    NoMore,
}

/// Target tables with schemas attached
#[derive(Debug, Clone)]
pub struct ResolvedTargets {
    top_component: Vec<u8>,
    pub targets: Vec<Arc<TableSchema>>,
    pub ancestors: Vec<Arc<TableSchema>>,
}

impl ResolvedTargets {
    /// The primary target table
    pub fn primary(&self) -> &Arc<TableSchema> {
        &self.targets[0]
    }

    pub fn classify(&self, key: &Key) -> KeyMatch {
        match key.components().first() {
            Some(first) if *first == self.top_component => {}
            _ => return KeyMatch::NoMore,
        }
        match self.targets.iter().find(|t| t.owns_key(key)) {
            Some(t) => KeyMatch::Target(Arc::clone(t)),
            None => KeyMatch::Skip,
        }
    }

    /// True if any target or ancestor is multi-region
    pub fn is_multi_region(&self) -> bool {
        self.targets.iter().any(|t| t.is_multi_region())
    }
}
