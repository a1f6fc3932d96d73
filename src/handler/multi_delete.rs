//! MultiDeleteTable
//!
//! Deletes target rows under a parent key until the write budget runs out.
//! Each key is read at the floor charge; rows on multi-region tables become
//! tombstones.

use crate::error::Result;
use crate::keyspace::{Key, ScanBounds};
use crate::ops::{MultiDeleteResult, MultiDeleteTable, Operation};
use crate::store::{Direction, Partition, Transaction};
use crate::tracker::ExecContext;

use super::scanner::{scan_targets, BatchLimits, Scanner};
use super::OperationHandler;

impl OperationHandler {
    pub(super) fn multi_delete(
        &self,
        op: &Operation,
        multi_delete: &MultiDeleteTable,
        ctx: &mut ExecContext,
        txn: &Transaction,
        partition: &Partition,
    ) -> Result<MultiDeleteResult> {
        self.authorize_targets(op, &multi_delete.targets)?;
        let targets = multi_delete.targets.resolve(self.metadata.as_ref())?;
        let tombstone = multi_delete.do_tombstone || targets.is_multi_region();

        let parent = Key::from_bytes(&multi_delete.parent_key)?;
        let bounds = ScanBounds::for_parent(&parent, multi_delete.sub_range.as_ref());
        let cursor = self.store.open_cursor(txn, self.cursor_config(op, ctx))?;
        let mut scanner = Scanner::new(
            cursor,
            bounds,
            Direction::Forward,
            multi_delete.resume_key.clone(),
            false,
        );
        let limits = BatchLimits {
            batch_size: 0,
            max_read_kb: 0,
            max_write_kb: multi_delete.max_write_kb,
        };

        let outcome = scan_targets(&mut scanner, &targets, &limits, ctx, |scanner, key, record, _, ctx| {
            ctx.add_empty_read_charge();
            self.remove_record(scanner.cursor_mut(), key, record, tombstone, ctx, partition)
        })?;

        tracing::debug!(
            "MultiDeleteTable removed {} rows (tombstones: {}, more: {})",
            outcome.count,
            tombstone,
            outcome.more
        );
        Ok(MultiDeleteResult {
            num_deleted: outcome.count,
            more: outcome.more,
            resume_key: outcome.resume_key(),
        })
    }
}
