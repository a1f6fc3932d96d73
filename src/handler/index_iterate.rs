//! IndexIterate / IndexKeysIterate
//!
//! Walks one secondary index of the primary target table and looks each
//! entry up in the primary store. Resumes strictly after the
//! (secondary, primary) pair the previous batch ended on.

use crate::error::{AtlasError, Result};
use crate::keyspace::{Key, KeyRange};
use crate::ops::{IndexIterate, IterateResult, Operation};
use crate::schema::KeyMatch;
use crate::store::{Direction, IndexEntry, Transaction};
use crate::tracker::ExecContext;

use super::common::{charge_scanned, result_record};
use super::scanner::BatchLimits;
use super::OperationHandler;

impl OperationHandler {
    pub(super) fn index_iterate(
        &self,
        op: &Operation,
        iterate: &IndexIterate,
        keys_only: bool,
        ctx: &mut ExecContext,
        txn: &Transaction,
    ) -> Result<IterateResult> {
        self.authorize_targets(op, &iterate.targets)?;
        let targets = iterate.targets.resolve(self.metadata.as_ref())?;
        let table = targets.primary();
        if table.index_def(&iterate.index_name).is_none() {
            return Err(AtlasError::IndexNotFound {
                table_id: table.id,
                index: iterate.index_name.clone(),
            });
        }

        let limits = BatchLimits {
            batch_size: self.batch_size(iterate.batch_size),
            max_read_kb: iterate.max_read_kb,
            max_write_kb: 0,
        };
        let direction = iterate.direction;
        let range = iterate.range.clone().unwrap_or_default();
        let config = self.cursor_config(op, ctx);
        let mut index = self
            .store
            .open_index_cursor(txn, table.id, &iterate.index_name, config)?;
        let mut primary = self.store.open_cursor(txn, config)?;
        let mut ancestors = self.ancestor_list(txn, config, &targets, false)?;

        let mut entry = match (&iterate.resume_secondary_key, &iterate.resume_primary_key) {
            (Some(sec), Some(prim)) => {
                index.seek_after(&IndexEntry::new(sec.clone(), prim.clone()), direction)?
            }
            _ => {
                let (start, inclusive) = match direction {
                    Direction::Forward => (range.start.as_deref(), range.start_inclusive),
                    Direction::Reverse => (range.end.as_deref(), range.end_inclusive),
                };
                index.seek_secondary(start, direction, inclusive)?
            }
        };

        let mut result = IterateResult::default();
        let mut count = 0;
        let mut last: Option<IndexEntry> = None;
        while let Some(current) = entry {
            if past_end(&range, direction, &current.secondary) {
                break;
            }

            let record = primary.search(&current.primary)?;
            let owned = matches!(
                targets.classify(&Key::from_bytes(&current.primary)?),
                KeyMatch::Target(_)
            );
            match record {
                Some(record) if owned && !record.tombstone => {
                    ancestors.add_ancestors(&current.primary, keys_only, ctx, &mut result.records)?;
                    charge_scanned(ctx, current.primary.len(), &record, keys_only);
                    let mut row = result_record(current.primary.clone(), &record, keys_only);
                    row.index_key = Some(current.secondary.clone());
                    result.records.push(row);

                    count += 1;
                    last = Some(current);
                    if limits.reached(ctx, count) {
                        result.more = true;
                        break;
                    }
                }
                // Entry outlived its primary record, or belongs to another table
                _ => {}
            }
            entry = index.advance(direction)?;
        }

        if count == 0 && ctx.read_kb() == 0 {
            ctx.add_empty_read_charge();
        }
        if result.more {
            if let Some(last) = last {
                result.resume_key = Some(last.primary);
                result.resume_secondary_key = Some(last.secondary);
            }
        }
        Ok(result)
    }
}

/// True once `secondary` has left the range on the far side of the scan
fn past_end(range: &KeyRange, direction: Direction, secondary: &[u8]) -> bool {
    match direction {
        Direction::Forward => match &range.end {
            Some(end) => {
                secondary > end.as_slice() || (secondary == end.as_slice() && !range.end_inclusive)
            }
            None => false,
        },
        Direction::Reverse => match &range.start {
            Some(start) => {
                secondary < start.as_slice()
                    || (secondary == start.as_slice() && !range.start_inclusive)
            }
            None => false,
        },
    }
}
