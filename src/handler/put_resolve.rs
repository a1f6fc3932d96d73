//! PutResolve: apply a write replicated from another region
//!
//! ```text
//! search ──absent──► insert (NoOverwrite) ──KeyExists──► Retry
//!    │ resident
//!    ▼
//! resolve(local stamp, remote stamp)
//!    ├─ RemoteWins ─► overwrite, counters merged into the incoming row
//!    └─ LocalWins  ─► counters merged into the resident row;
//!                     rewrite only if that changed it ("loser merge")
//! ```
//!
//! Counters are merged only when the table has MR counters and neither side
//! is a tombstone. A loser merge still reports `success == false`: the
//! incoming write did not take effect, even though the store changed.

use bytes::Bytes;

use crate::error::{AtlasError, Result};
use crate::ops::{Operation, PutResolve, PutResult};
use crate::resolver::{merge_counters, Resolution, WriteStamp};
use crate::schema::TableSchema;
use crate::store::{Partition, PutOutcome, PutPolicy, RecordCursor, StoredRecord, Transaction, WriteOptions};
use crate::tracker::ExecContext;
use crate::value::{FieldPath, Row};

use super::common::{charge_put, charge_record_read, put_event, with_retries, RetryOutcome};
use super::put::{check_row_version, written};
use super::OperationHandler;

/// A replicated write with its conflict metadata
pub(super) struct ResolveSpec<'a> {
    pub key: &'a [u8],
    pub value: Bytes,
    pub modification_time: u64,
    pub region_id: u32,
    pub tombstone: bool,
    pub expiration_time: u64,
    /// 0 = use the modification time
    pub creation_time: u64,
    pub table: Option<&'a TableSchema>,
}

impl<'a> ResolveSpec<'a> {
    fn stamp(&self) -> WriteStamp {
        WriteStamp::new(self.modification_time, self.region_id)
    }

    fn options(&self) -> WriteOptions {
        WriteOptions {
            expiration_time: self.expiration_time,
            keep_expiration: false,
            modification_time: self.modification_time,
            creation_time: Some(if self.creation_time == 0 {
                self.modification_time
            } else {
                self.creation_time
            }),
            region_id: self.region_id,
            tombstone: self.tombstone,
        }
    }

    /// Counter paths to merge against `resident`, if any
    fn merge_paths(&self, resident: &StoredRecord) -> Option<&'a [FieldPath]> {
        if self.tombstone || resident.tombstone {
            return None;
        }
        self.table
            .filter(|t| t.has_mr_counters())
            .map(|t| t.mr_counters.as_slice())
    }
}

impl OperationHandler {
    pub(super) fn put_resolve(
        &self,
        op: &Operation,
        resolve: &PutResolve,
        ctx: &mut ExecContext,
        txn: &Transaction,
        partition: &Partition,
    ) -> Result<PutResult> {
        let table = self.opt_table(resolve.table_id)?;
        self.authorize_key(op, table.as_ref(), &resolve.key)?;

        if resolve.tombstone && !resolve.value.is_empty() {
            return Err(AtlasError::IllegalArgument(format!(
                "Tombstone PutResolve carries a {} byte value",
                resolve.value.len()
            )));
        }
        check_row_version(table.as_ref(), &resolve.value)?;

        let spec = ResolveSpec {
            key: &resolve.key,
            value: resolve.value.clone(),
            modification_time: resolve.modification_time,
            region_id: resolve.region_id,
            tombstone: resolve.tombstone,
            expiration_time: resolve.expiration_time,
            creation_time: resolve.creation_time,
            table: table.as_deref(),
        };

        let mut cursor = self.store.open_cursor(txn, self.cursor_config(op, ctx))?;
        self.resolve_record(cursor.as_mut(), &spec, ctx, partition)
    }

    /// Resolve one replicated write against the resident record
    pub(super) fn resolve_record(
        &self,
        cursor: &mut dyn RecordCursor,
        spec: &ResolveSpec<'_>,
        ctx: &mut ExecContext,
        partition: &Partition,
    ) -> Result<PutResult> {
        with_retries("PutResolve", self.config.max_write_retries, || {
            let Some(resident) = cursor.search(spec.key)? else {
                let options = spec.options();
                return match cursor.put(spec.key, &spec.value, PutPolicy::NoOverwrite, &options)? {
                    PutOutcome::Written {
                        version,
                        storage_size,
                        index_writes,
                    } => {
                        ctx.add_empty_read_charge();
                        charge_put(ctx, partition, storage_size, None, index_writes);
                        self.emit(put_event(
                            spec.key,
                            &spec.value,
                            version,
                            &options,
                            options.creation_time.unwrap_or(spec.modification_time),
                            spec.expiration_time,
                        ));
                        Ok(RetryOutcome::Success(PutResult {
                            new_version: Some(version),
                            expiration_time: spec.expiration_time,
                            previous: None,
                        }))
                    }
                    PutOutcome::KeyExists => Ok(RetryOutcome::Retry),
                };
            };

            let local = WriteStamp::new(resident.modification_time, resident.region_id);
            let resolution = self.resolver.resolve(local, spec.stamp());
            tracing::trace!(
                "Resolved {:?} (local {}@{}, remote {}@{})",
                resolution,
                local.timestamp,
                local.region_id,
                spec.modification_time,
                spec.region_id
            );

            let result = match resolution {
                Resolution::RemoteWins => self.apply_remote(cursor, spec, &resident, ctx, partition)?,
                Resolution::LocalWins => {
                    self.merge_into_local(cursor, spec, &resident, ctx, partition)?;
                    PutResult::default()
                }
            };
            Ok(RetryOutcome::Success(result))
        })
    }

    fn apply_remote(
        &self,
        cursor: &mut dyn RecordCursor,
        spec: &ResolveSpec<'_>,
        resident: &StoredRecord,
        ctx: &mut ExecContext,
        partition: &Partition,
    ) -> Result<PutResult> {
        let old_size = cursor.storage_size()?;
        let paths = spec.merge_paths(resident);
        charge_record_read(ctx, spec.key.len(), resident, paths.is_some());

        let value = match paths {
            Some(paths) => {
                let remote = Row::decode(&spec.value)?;
                let local = Row::decode(&resident.value)?;
                Bytes::from(merge_counters(&remote, &local, paths).encode()?)
            }
            None => spec.value.clone(),
        };

        let options = spec.options();
        let (version, storage_size, index_writes) =
            written(cursor.put(spec.key, &value, PutPolicy::Current, &options)?)?;
        charge_put(ctx, partition, storage_size, Some(old_size), index_writes);
        self.emit(put_event(
            spec.key,
            &value,
            version,
            &options,
            options.creation_time.unwrap_or(spec.modification_time),
            spec.expiration_time,
        ));

        Ok(PutResult {
            new_version: Some(version),
            expiration_time: spec.expiration_time,
            previous: None,
        })
    }

    /// Loser merge: fold the incoming counters into the resident row
    fn merge_into_local(
        &self,
        cursor: &mut dyn RecordCursor,
        spec: &ResolveSpec<'_>,
        resident: &StoredRecord,
        ctx: &mut ExecContext,
        partition: &Partition,
    ) -> Result<()> {
        let Some(paths) = spec.merge_paths(resident) else {
            ctx.add_empty_read_charge();
            return Ok(());
        };
        charge_record_read(ctx, spec.key.len(), resident, true);

        let local = Row::decode(&resident.value)?;
        let remote = Row::decode(&spec.value)?;
        let merged = merge_counters(&local, &remote, paths);
        if merged == local {
            return Ok(());
        }

        let old_size = cursor.storage_size()?;
        let value = Bytes::from(merged.encode()?);
        let options = WriteOptions {
            expiration_time: resident.expiration_time,
            keep_expiration: false,
            modification_time: resident.modification_time,
            creation_time: Some(resident.creation_time),
            region_id: resident.region_id,
            tombstone: false,
        };
        let (version, storage_size, index_writes) =
            written(cursor.put(spec.key, &value, PutPolicy::Current, &options)?)?;
        charge_put(ctx, partition, storage_size, Some(old_size), index_writes);
        tracing::debug!("Merged incoming counters into the winning resident row");
        self.emit(put_event(
            spec.key,
            &value,
            version,
            &options,
            resident.creation_time,
            resident.expiration_time,
        ));
        Ok(())
    }
}
