//! TableIterate / TableKeysIterate

use crate::error::Result;
use crate::ops::{IterateResult, Operation, TableIterate};
use crate::store::Transaction;
use crate::tracker::ExecContext;

use super::multi_get::RowScan;
use super::scanner::BatchLimits;
use super::OperationHandler;

impl OperationHandler {
    pub(super) fn table_iterate(
        &self,
        op: &Operation,
        iterate: &TableIterate,
        keys_only: bool,
        ctx: &mut ExecContext,
        txn: &Transaction,
    ) -> Result<IterateResult> {
        self.authorize_targets(op, &iterate.targets)?;
        let targets = iterate.targets.resolve(self.metadata.as_ref())?;

        let limits = BatchLimits {
            batch_size: self.batch_size(iterate.batch_size),
            max_read_kb: iterate.max_read_kb,
            max_write_kb: 0,
        };
        let config = self.cursor_config(op, ctx);
        let mut ancestors = self.ancestor_list(txn, config, &targets, iterate.include_tombstones)?;
        let scan = RowScan {
            parent_key: &iterate.parent_key,
            sub_range: iterate.sub_range.as_ref(),
            direction: iterate.direction,
            resume_key: iterate.resume_key.clone(),
            include_tombstones: iterate.include_tombstones,
            keys_only,
        };
        let (records, outcome) =
            self.scan_rows(scan, &targets, &limits, &mut ancestors, config, ctx, txn)?;

        tracing::trace!(
            "TableIterate returned {} records (more: {})",
            records.len(),
            outcome.more
        );
        Ok(IterateResult {
            records,
            more: outcome.more,
            resume_key: outcome.resume_key(),
            resume_secondary_key: None,
        })
    }

    /// Requested batch size, or the configured default for 0
    pub(super) fn batch_size(&self, requested: u32) -> u32 {
        if requested == 0 {
            self.config.default_batch_size
        } else {
            requested
        }
    }
}
