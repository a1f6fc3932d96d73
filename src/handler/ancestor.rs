//! Ancestor row expansion for hierarchical table scans
//!
//! Each distinct ancestor row is emitted once per batch, ahead of the first
//! descendant that refers to it.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::Result;
use crate::keyspace::Key;
use crate::ops::ResultRecord;
use crate::schema::{ResolvedTargets, TableSchema};
use crate::store::{CursorConfig, RecordCursor, Transaction};
use crate::tracker::ExecContext;

use super::common::{charge_scanned, result_record};
use super::OperationHandler;

pub(super) struct AncestorList<'a> {
    cursor: Option<Box<dyn RecordCursor + 'a>>,
    /// Outermost first
    tables: Vec<Arc<TableSchema>>,
    emitted: HashSet<Vec<u8>>,
    include_tombstones: bool,
}

impl<'a> AncestorList<'a> {
    /// `cursor` is only read from when `tables` is non-empty
    pub(super) fn new(
        cursor: Option<Box<dyn RecordCursor + 'a>>,
        tables: Vec<Arc<TableSchema>>,
        include_tombstones: bool,
    ) -> Self {
        Self {
            cursor,
            tables,
            emitted: HashSet::new(),
            include_tombstones,
        }
    }

    /// Push the not yet emitted ancestor rows of `key` onto `out`
    pub(super) fn add_ancestors(
        &mut self,
        key: &[u8],
        keys_only: bool,
        ctx: &mut ExecContext,
        out: &mut Vec<ResultRecord>,
    ) -> Result<()> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(());
        };
        if self.tables.is_empty() {
            return Ok(());
        }

        let descendant = Key::from_bytes(key)?;
        for table in &self.tables {
            let ancestor = table.ancestor_key(&descendant, table.depth());
            if ancestor.len() >= descendant.len() || !table.owns_key(&ancestor) {
                continue;
            }
            let bytes = ancestor.to_bytes();
            if !self.emitted.insert(bytes.clone()) {
                continue;
            }
            match cursor.search(&bytes)? {
                Some(record) if self.include_tombstones || !record.tombstone => {
                    charge_scanned(ctx, bytes.len(), &record, keys_only);
                    out.push(result_record(bytes, &record, keys_only));
                }
                _ => {
                    ctx.add_empty_read_charge();
                }
            }
        }
        Ok(())
    }
}

impl OperationHandler {
    /// Ancestor list for one batch; opens a second cursor only when needed
    pub(super) fn ancestor_list<'a>(
        &'a self,
        txn: &'a Transaction,
        config: CursorConfig,
        targets: &ResolvedTargets,
        include_tombstones: bool,
    ) -> Result<AncestorList<'a>> {
        let cursor = if targets.ancestors.is_empty() {
            None
        } else {
            Some(self.store.open_cursor(txn, config)?)
        };
        Ok(AncestorList::new(cursor, targets.ancestors.clone(), include_tombstones))
    }
}
