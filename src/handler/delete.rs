//! Delete and DeleteIfVersion
//!
//! A delete on a multi-region table, or one that asks for it, writes a
//! tombstone in place of the record. Deleting an absent key or a tombstone
//! is a failed delete that charges only the read floor.

use crate::error::Result;
use crate::ops::{Delete, DeleteResult, Operation};
use crate::store::{Partition, Transaction};
use crate::tracker::ExecContext;
use crate::version::Version;

use super::common::{capture_previous, charge_record_read};
use super::OperationHandler;

impl OperationHandler {
    pub(super) fn delete(
        &self,
        op: &Operation,
        delete: &Delete,
        match_version: Option<Version>,
        ctx: &mut ExecContext,
        txn: &Transaction,
        partition: &Partition,
    ) -> Result<DeleteResult> {
        let table = self.opt_table(delete.table_id)?;
        self.authorize_key(op, table.as_ref(), &delete.key)?;

        let mut cursor = self.store.open_cursor(txn, self.cursor_config(op, ctx))?;
        let record = match cursor.search(&delete.key)? {
            Some(record) if !record.tombstone => record,
            _ => {
                ctx.add_empty_read_charge();
                return Ok(DeleteResult::default());
            }
        };

        let choice = delete.return_choice;
        charge_record_read(ctx, delete.key.len(), &record, choice.needs_value());

        if let Some(expected) = match_version {
            if !record.version.same_write(&expected) {
                tracing::trace!("DeleteIfVersion mismatch: have {}, expected {}", record.version, expected);
                return Ok(DeleteResult {
                    deleted: false,
                    previous: capture_previous(&record, choice),
                });
            }
        }

        let tombstone = delete.do_tombstone || table.as_ref().is_some_and(|t| t.is_multi_region());
        self.remove_record(cursor.as_mut(), &delete.key, &record, tombstone, ctx, partition)?;

        let previous = match match_version {
            Some(_) => None,
            None => capture_previous(&record, choice),
        };
        Ok(DeleteResult {
            deleted: true,
            previous,
        })
    }
}
