//! MultiGetBatchTable / MultiGetBatchTableKeys
//!
//! Scans each parent key in turn under one shared batch size and read
//! budget. The resume key applies to the parent key the batch stopped in,
//! reported as `resume_parent_index`; a follow-up request starts from that
//! key, which becomes its first parent key.

use crate::error::Result;
use crate::ops::{BulkGetResult, KeyBatch, MultiGetBatchTable, Operation};
use crate::store::{Direction, Transaction};
use crate::tracker::ExecContext;

use super::multi_get::RowScan;
use super::scanner::BatchLimits;
use super::OperationHandler;

impl OperationHandler {
    pub(super) fn bulk_get(
        &self,
        op: &Operation,
        bulk: &MultiGetBatchTable,
        keys_only: bool,
        ctx: &mut ExecContext,
        txn: &Transaction,
    ) -> Result<BulkGetResult> {
        self.authorize_targets(op, &bulk.targets)?;
        let targets = bulk.targets.resolve(self.metadata.as_ref())?;

        let batch_size = self.batch_size(bulk.batch_size);
        let config = self.cursor_config(op, ctx);
        let mut ancestors = self.ancestor_list(txn, config, &targets, bulk.include_tombstones)?;

        let mut result = BulkGetResult::default();
        let mut total = 0;
        for (index, parent_key) in bulk.parent_keys.iter().enumerate() {
            // 0 stays unlimited; otherwise a full batch has already suspended
            let remaining = if batch_size == 0 { 0 } else { batch_size - total };
            let limits = BatchLimits {
                batch_size: remaining,
                max_read_kb: bulk.max_read_kb,
                max_write_kb: 0,
            };
            let scan = RowScan {
                parent_key,
                sub_range: bulk.sub_range.as_ref(),
                direction: Direction::Forward,
                resume_key: if index == 0 { bulk.resume_key.clone() } else { None },
                include_tombstones: bulk.include_tombstones,
                keys_only,
            };
            let (records, outcome) =
                self.scan_rows(scan, &targets, &limits, &mut ancestors, config, ctx, txn)?;

            total += outcome.count;
            if !records.is_empty() {
                result.batches.push(KeyBatch {
                    key_index: index as u32,
                    records,
                });
            }
            if outcome.more {
                result.more = true;
                result.resume_parent_index = index as u32;
                result.resume_key = outcome.resume_key();
                tracing::debug!("Bulk get suspended in parent key {} after {} rows", index, total);
                break;
            }
        }
        Ok(result)
    }
}
