//! PutBatch
//!
//! ## Modes
//! - overwrite: every entry is written; a key repeated later in the batch is
//!   reported present and skipped
//! - insert (overwrite = false): an entry whose key is already present,
//!   including from earlier in the same batch, is reported and skipped
//! - resolve (`use_put_resolve`): each entry is resolved against the
//!   resident record; entries that lose are reported
//!
//! Entries without a region take the batch's local region.

use std::collections::HashSet;

use bytes::Bytes;

use crate::access::AccessTarget;
use crate::config::NULL_REGION_ID;
use crate::error::{AtlasError, Result};
use crate::keyspace::KeySpace;
use crate::ops::{BatchEntry, Operation, PutBatch, PutBatchResult, ReturnChoice};
use crate::store::{Partition, Transaction};
use crate::tracker::ExecContext;

use super::put::{check_row_version, PutKind, WriteSpec};
use super::put_resolve::ResolveSpec;
use super::OperationHandler;

impl OperationHandler {
    pub(super) fn put_batch(
        &self,
        op: &Operation,
        batch: &PutBatch,
        ctx: &mut ExecContext,
        txn: &Transaction,
        partition: &Partition,
    ) -> Result<PutBatchResult> {
        let table = self.opt_table(batch.table_id)?;
        match &table {
            Some(table) => self.authorize(op, &AccessTarget::table(table))?,
            None => {
                let keyspaces: HashSet<KeySpace> =
                    batch.entries.iter().map(|e| KeySpace::classify(&e.key)).collect();
                for keyspace in keyspaces {
                    self.authorize(op, &AccessTarget::Keyspace(keyspace))?;
                }
            }
        }
        for entry in batch.entries.iter().filter(|e| !e.tombstone) {
            check_row_version(table.as_ref(), &entry.value)?;
        }

        let default_region = if batch.local_region_id != NULL_REGION_ID {
            batch.local_region_id
        } else {
            self.local_region(table.as_ref())
        };
        let mut cursor = self.store.open_cursor(txn, self.cursor_config(op, ctx))?;

        let mut result = PutBatchResult::default();
        let mut written: HashSet<&[u8]> = HashSet::new();
        for (index, entry) in batch.entries.iter().enumerate() {
            let modification_time = entry.modification_time.unwrap_or_else(|| ctx.now_ms());
            let region_id = entry.region_id.unwrap_or(default_region);
            let expiration_time = self.entry_expiration(entry, modification_time)?;
            let value = if entry.tombstone {
                Bytes::new()
            } else {
                entry.value.clone()
            };

            let applied = if batch.use_put_resolve {
                let spec = ResolveSpec {
                    key: &entry.key,
                    value,
                    modification_time,
                    region_id,
                    tombstone: entry.tombstone,
                    expiration_time,
                    creation_time: 0,
                    table: table.as_deref(),
                };
                self.resolve_record(cursor.as_mut(), &spec, ctx, partition)?
                    .success()
            } else if batch.overwrite && written.contains(entry.key.as_slice()) {
                false
            } else {
                let spec = WriteSpec {
                    key: &entry.key,
                    value,
                    kind: if batch.overwrite {
                        PutKind::Overwrite
                    } else {
                        PutKind::IfAbsent
                    },
                    return_choice: ReturnChoice::None,
                    expiration_time,
                    update_ttl: batch.update_ttl,
                    modification_time,
                    region_id,
                    tombstone: entry.tombstone,
                    table: table.as_deref(),
                };
                self.put_record(cursor.as_mut(), &spec, ctx, partition)?
                    .success()
            };

            if applied {
                result.num_put += 1;
                written.insert(entry.key.as_slice());
            } else {
                result.key_present_indices.push(index as u32);
            }
        }

        tracing::debug!(
            "PutBatch wrote {} of {} entries ({} present)",
            result.num_put,
            batch.entries.len(),
            result.key_present_indices.len()
        );
        Ok(result)
    }

    /// Absolute expiration of a batch entry; tombstones default to the
    /// configured tombstone lifetime
    fn entry_expiration(&self, entry: &BatchEntry, modification_time: u64) -> Result<u64> {
        match entry.ttl {
            Some(ttl) => ttl.expiration_time(modification_time),
            None if entry.tombstone => modification_time
                .checked_add(self.config.tombstone_ttl_ms)
                .ok_or_else(|| {
                    AtlasError::IllegalArgument(format!(
                        "tombstone expiration out of range at modification time {}",
                        modification_time
                    ))
                }),
            None => Ok(0),
        }
    }
}
