//! Put family: Put, PutIfAbsent, PutIfPresent, PutIfVersion
//!
//! ## Write Path
//! ```text
//! Put / PutIfAbsent:
//!   insert (NoOverwrite) ──ok──► done, nothing to report
//!          │ KeyExists
//!          ▼
//!   search ──absent──► Retry (record vanished)
//!          │ tombstone ──► overwrite as if absent
//!          ▼ live
//!   capture previous ──► update in place (Current)
//!
//! PutIfPresent / PutIfVersion:
//!   search ──absent / tombstone──► fail
//!          ▼ live
//!   version check ──► update in place (Current)
//! ```
//!
//! MR counter columns of the resident row are carried into the new row, so
//! the resident row is always fetched in full when the table has any.

use std::sync::Arc;

use bytes::Bytes;

use crate::error::{AtlasError, Result};
use crate::ops::{Operation, Put, PutResult, ReturnChoice};
use crate::resolver::copy_counters;
use crate::schema::TableSchema;
use crate::store::{Partition, PutOutcome, PutPolicy, RecordCursor, StoredRecord, Transaction, WriteOptions};
use crate::tracker::ExecContext;
use crate::value::{FieldPath, Row};
use crate::version::Version;

use super::common::{
    capture_previous, charge_put, charge_record_read, put_event, with_retries, RetryOutcome,
};
use super::OperationHandler;

/// Existence policy of a Put-family write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutKind {
    /// Insert or overwrite
    Overwrite,
    IfAbsent,
    IfPresent,
    /// Overwrite only the record with this version
    IfVersion(Version),
}

impl PutKind {
    fn name(self) -> &'static str {
        match self {
            PutKind::Overwrite => "Put",
            PutKind::IfAbsent => "PutIfAbsent",
            PutKind::IfPresent => "PutIfPresent",
            PutKind::IfVersion(_) => "PutIfVersion",
        }
    }

    /// Kinds that try an atomic insert before looking at the resident record
    fn inserts_first(self) -> bool {
        matches!(self, PutKind::Overwrite | PutKind::IfAbsent)
    }
}

/// One logical write, independent of the operation that carries it
pub(super) struct WriteSpec<'a> {
    pub key: &'a [u8],
    pub value: Bytes,
    pub kind: PutKind,
    pub return_choice: ReturnChoice,
    /// Absolute expiration; 0 = never
    pub expiration_time: u64,
    pub update_ttl: bool,
    pub modification_time: u64,
    pub region_id: u32,
    pub tombstone: bool,
    pub table: Option<&'a TableSchema>,
}

impl<'a> WriteSpec<'a> {
    fn counters(&self) -> Option<&'a [FieldPath]> {
        if self.tombstone {
            return None;
        }
        self.table
            .filter(|t| t.has_mr_counters())
            .map(|t| t.mr_counters.as_slice())
    }

    fn options(&self, keep_expiration: bool) -> WriteOptions {
        WriteOptions {
            expiration_time: self.expiration_time,
            keep_expiration,
            modification_time: self.modification_time,
            creation_time: None,
            region_id: self.region_id,
            tombstone: self.tombstone,
        }
    }

    fn failed(&self, previous: Option<&StoredRecord>) -> PutResult {
        PutResult {
            new_version: None,
            expiration_time: 0,
            previous: previous.and_then(|r| capture_previous(r, self.return_choice)),
        }
    }
}

impl OperationHandler {
    pub(super) fn put(
        &self,
        op: &Operation,
        put: &Put,
        kind: PutKind,
        ctx: &mut ExecContext,
        txn: &Transaction,
        partition: &Partition,
    ) -> Result<PutResult> {
        let table = self.opt_table(put.table_id)?;
        self.authorize_key(op, table.as_ref(), &put.key)?;

        let value = put.value.to_bytes()?;
        check_row_version(table.as_ref(), &value)?;

        let now = ctx.now_ms();
        let expiration_time = match put.ttl {
            Some(ttl) => ttl.expiration_time(now)?,
            None => 0,
        };
        let spec = WriteSpec {
            key: &put.key,
            value,
            kind,
            return_choice: put.return_choice,
            expiration_time,
            update_ttl: put.update_ttl,
            modification_time: now,
            region_id: self.local_region(table.as_ref()),
            tombstone: false,
            table: table.as_deref(),
        };

        let mut cursor = self.store.open_cursor(txn, self.cursor_config(op, ctx))?;
        self.put_record(cursor.as_mut(), &spec, ctx, partition)
    }

    /// Execute one Put-family write on an open cursor
    pub(super) fn put_record(
        &self,
        cursor: &mut dyn RecordCursor,
        spec: &WriteSpec<'_>,
        ctx: &mut ExecContext,
        partition: &Partition,
    ) -> Result<PutResult> {
        with_retries(spec.kind.name(), self.config.max_write_retries, || {
            if spec.kind.inserts_first() {
                let options = spec.options(false);
                if let PutOutcome::Written {
                    version,
                    storage_size,
                    index_writes,
                } = cursor.put(spec.key, &spec.value, PutPolicy::NoOverwrite, &options)?
                {
                    ctx.add_empty_read_charge();
                    charge_put(ctx, partition, storage_size, None, index_writes);
                    self.emit(put_event(
                        spec.key,
                        &spec.value,
                        version,
                        &options,
                        spec.modification_time,
                        spec.expiration_time,
                    ));
                    return Ok(RetryOutcome::Success(PutResult {
                        new_version: Some(version),
                        expiration_time: spec.expiration_time,
                        previous: None,
                    }));
                }
            }

            let record = match cursor.search(spec.key)? {
                Some(record) if !record.tombstone => record,
                Some(tombstone) if spec.kind.inserts_first() => {
                    return self
                        .overwrite_tombstone(cursor, spec, &tombstone, ctx, partition)
                        .map(RetryOutcome::Success);
                }
                None if spec.kind.inserts_first() => return Ok(RetryOutcome::Retry),
                _ => {
                    ctx.add_empty_read_charge();
                    return Ok(RetryOutcome::Success(spec.failed(None)));
                }
            };

            let precondition_holds = match spec.kind {
                PutKind::IfAbsent => false,
                PutKind::IfVersion(expected) => record.version.same_write(&expected),
                PutKind::Overwrite | PutKind::IfPresent => true,
            };
            if !precondition_holds {
                charge_record_read(ctx, spec.key.len(), &record, spec.return_choice.needs_value());
                return Ok(RetryOutcome::Success(spec.failed(Some(&record))));
            }

            self.overwrite_live(cursor, spec, &record, ctx, partition)
                .map(RetryOutcome::Success)
        })
    }

    /// Replace the live record under the cursor
    fn overwrite_live(
        &self,
        cursor: &mut dyn RecordCursor,
        spec: &WriteSpec<'_>,
        record: &StoredRecord,
        ctx: &mut ExecContext,
        partition: &Partition,
    ) -> Result<PutResult> {
        let old_size = cursor.storage_size()?;
        let counters = spec.counters();
        charge_record_read(
            ctx,
            spec.key.len(),
            record,
            counters.is_some() || spec.return_choice.needs_value(),
        );

        let value = match counters {
            Some(paths) => {
                let incoming = Row::decode(&spec.value)?;
                let resident = Row::decode(&record.value)?;
                Bytes::from(copy_counters(&resident, &incoming, paths).encode()?)
            }
            None => spec.value.clone(),
        };

        let keep_expiration = !spec.update_ttl && !spec.tombstone;
        let options = spec.options(keep_expiration);
        let (version, storage_size, index_writes) = written(cursor.put(
            spec.key,
            &value,
            PutPolicy::Current,
            &options,
        )?)?;
        charge_put(ctx, partition, storage_size, Some(old_size), index_writes);

        let expiration_time = if keep_expiration {
            record.expiration_time
        } else {
            spec.expiration_time
        };
        self.emit(put_event(
            spec.key,
            &value,
            version,
            &options,
            record.creation_time,
            expiration_time,
        ));

        let previous = match spec.kind {
            PutKind::IfVersion(_) => None,
            _ => capture_previous(record, spec.return_choice),
        };
        Ok(PutResult {
            new_version: Some(version),
            expiration_time,
            previous,
        })
    }

    /// Write over a tombstone; the key counts as absent
    fn overwrite_tombstone(
        &self,
        cursor: &mut dyn RecordCursor,
        spec: &WriteSpec<'_>,
        tombstone: &StoredRecord,
        ctx: &mut ExecContext,
        partition: &Partition,
    ) -> Result<PutResult> {
        let old_size = tombstone.storage_size(spec.key.len());
        let options = spec.options(false);
        let (version, storage_size, index_writes) = written(cursor.put(
            spec.key,
            &spec.value,
            PutPolicy::Current,
            &options,
        )?)?;
        ctx.add_empty_read_charge();
        charge_put(ctx, partition, storage_size, Some(old_size), index_writes);
        self.emit(put_event(
            spec.key,
            &spec.value,
            version,
            &options,
            spec.modification_time,
            spec.expiration_time,
        ));
        Ok(PutResult {
            new_version: Some(version),
            expiration_time: spec.expiration_time,
            previous: None,
        })
    }
}

/// Unpack a put that cannot report `KeyExists`
pub(super) fn written(outcome: PutOutcome) -> Result<(Version, usize, u32)> {
    match outcome {
        PutOutcome::Written {
            version,
            storage_size,
            index_writes,
        } => Ok((version, storage_size, index_writes)),
        PutOutcome::KeyExists => Err(AtlasError::Storage(
            "Put on the current record reported an existing key".to_string(),
        )),
    }
}

/// Reject a row written against a table version that is no longer writable
pub(super) fn check_row_version(table: Option<&Arc<TableSchema>>, value: &[u8]) -> Result<()> {
    match table {
        Some(table) if !value.is_empty() => {
            let row = Row::decode(value)?;
            table.check_row_version(row.table_version)
        }
        _ => Ok(()),
    }
}
