//! Helpers shared by every handler
//!
//! Handlers are plain functions composed from these pieces rather than a
//! hierarchy: retry loop, charging, previous-record capture, migration
//! events, and the physical delete / tombstone step.

use bytes::Bytes;

use crate::error::{AtlasError, Result};
use crate::ops::{PreviousRecord, ResultRecord, ReturnChoice};
use crate::replication::{MigrationEvent, MigrationKind};
use crate::store::{Partition, PutOutcome, PutPolicy, RecordCursor, StoredRecord, WriteOptions};
use crate::tracker::ExecContext;
use crate::version::Version;

use super::OperationHandler;

// =============================================================================
// Retry Loop
// =============================================================================

/// Outcome of one attempt at a write that can race with a concurrent delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T> {
    Success(T),
    /// The record vanished between the insert attempt and the search
    Retry,
}

/// Run `attempt` until it succeeds, at most `max_retries` times
pub(super) fn with_retries<T>(
    operation: &'static str,
    max_retries: u32,
    mut attempt: impl FnMut() -> Result<RetryOutcome<T>>,
) -> Result<T> {
    let attempts = max_retries.max(1);
    for n in 1..=attempts {
        match attempt()? {
            RetryOutcome::Success(value) => return Ok(value),
            RetryOutcome::Retry => {
                tracing::debug!("{} raced with a concurrent delete (attempt {}/{})", operation, n, attempts);
            }
        }
    }
    tracing::warn!("{} gave up after {} attempts", operation, attempts);
    Err(AtlasError::MaxRetriesExceeded {
        operation,
        retries: attempts,
    })
}

// =============================================================================
// Charging
// =============================================================================

/// Charge a read of a resident record
///
/// Only a read that needs the value pays for its size; existence and version
/// checks pay the floor.
pub(super) fn charge_record_read(
    ctx: &mut ExecContext,
    key_len: usize,
    record: &StoredRecord,
    with_value: bool,
) -> u32 {
    if with_value {
        ctx.add_read_bytes(record.storage_size(key_len))
    } else {
        ctx.add_empty_read_charge()
    }
}

/// Charge a put: the new record, plus the replaced one as a second leg
pub(super) fn charge_put(
    ctx: &mut ExecContext,
    partition: &Partition,
    new_size: usize,
    old_size: Option<usize>,
    index_writes: u32,
) {
    ctx.add_write_bytes(new_size, index_writes);
    let old = old_size.unwrap_or(0);
    if let Some(old_size) = old_size {
        ctx.add_write_bytes(old_size, 0);
    }
    partition.add_size_delta(new_size as i64 - old as i64);
}

// =============================================================================
// Records
// =============================================================================

/// Previous-record information a caller asked for
pub(super) fn capture_previous(record: &StoredRecord, choice: ReturnChoice) -> Option<PreviousRecord> {
    if !choice.needs_previous() {
        return None;
    }
    Some(PreviousRecord {
        value: choice.needs_value().then(|| record.value.clone()),
        version: choice.needs_version().then_some(record.version),
        creation_time: record.creation_time,
        modification_time: record.modification_time,
        expiration_time: record.expiration_time,
    })
}

/// Iteration result entry
pub(super) fn result_record(key: Vec<u8>, record: &StoredRecord, keys_only: bool) -> ResultRecord {
    ResultRecord {
        key,
        value: (!keys_only).then(|| record.value.clone()),
        version: Some(record.version),
        creation_time: record.creation_time,
        modification_time: record.modification_time,
        expiration_time: record.expiration_time,
        tombstone: record.tombstone,
        index_key: None,
    }
}

/// Read charge for one scanned record
pub(super) fn charge_scanned(ctx: &mut ExecContext, key_len: usize, record: &StoredRecord, keys_only: bool) {
    charge_record_read(ctx, key_len, record, !keys_only);
}

/// Migration event for a completed put
pub(super) fn put_event(
    key: &[u8],
    value: &Bytes,
    version: Version,
    options: &WriteOptions,
    creation_time: u64,
    expiration_time: u64,
) -> MigrationEvent {
    MigrationEvent {
        kind: if options.tombstone {
            MigrationKind::Tombstone
        } else {
            MigrationKind::Put
        },
        key: key.to_vec(),
        value: (!options.tombstone).then(|| value.clone()),
        version: Some(version),
        creation_time,
        modification_time: options.modification_time,
        expiration_time,
    }
}

// =============================================================================
// Shared Write Steps
// =============================================================================

impl OperationHandler {
    /// Mirror a change to the migration stream, if one is attached
    pub(super) fn emit(&self, event: MigrationEvent) {
        if let Some(stream) = &self.migration {
            stream.send(event);
        }
    }

    /// Options for a tombstone written at `now_ms`
    pub(super) fn tombstone_options(&self, now_ms: u64) -> Result<WriteOptions> {
        let expiration_time = now_ms
            .checked_add(self.config.tombstone_ttl_ms)
            .ok_or_else(|| {
                AtlasError::IllegalArgument(format!(
                    "tombstone expiration out of range at time {}",
                    now_ms
                ))
            })?;
        Ok(WriteOptions {
            expiration_time,
            keep_expiration: false,
            modification_time: now_ms,
            creation_time: None,
            region_id: self.config.local_region_id,
            tombstone: true,
        })
    }

    /// Remove the live record under `cursor`
    ///
    /// With `tombstone` set the record is replaced by an empty tombstone
    /// instead, charged as a delete of the old record plus a put of the
    /// tombstone. Read charges are the caller's.
    pub(super) fn remove_record(
        &self,
        cursor: &mut dyn RecordCursor,
        key: &[u8],
        record: &StoredRecord,
        tombstone: bool,
        ctx: &mut ExecContext,
        partition: &Partition,
    ) -> Result<()> {
        if !tombstone {
            let outcome = cursor.delete()?;
            ctx.add_write_bytes(outcome.storage_size, outcome.index_writes);
            partition.add_size_delta(-(outcome.storage_size as i64));
            self.emit(MigrationEvent {
                kind: MigrationKind::Delete,
                key: key.to_vec(),
                value: None,
                version: None,
                creation_time: record.creation_time,
                modification_time: record.modification_time,
                expiration_time: record.expiration_time,
            });
            return Ok(());
        }

        let old_size = cursor.storage_size()?;
        let options = self.tombstone_options(ctx.now_ms())?;
        match cursor.put(key, &[], PutPolicy::Current, &options)? {
            PutOutcome::Written {
                version,
                storage_size,
                index_writes,
            } => {
                ctx.add_write_bytes(old_size, index_writes);
                ctx.add_write_bytes(storage_size, 0);
                partition.add_size_delta(storage_size as i64 - old_size as i64);
                tracing::debug!(
                    "Wrote tombstone in place of a {} byte record (expires {})",
                    old_size,
                    options.expiration_time
                );
                self.emit(put_event(
                    key,
                    &Bytes::new(),
                    version,
                    &options,
                    options.modification_time,
                    options.expiration_time,
                ));
                Ok(())
            }
            PutOutcome::KeyExists => Err(AtlasError::Storage(
                "Tombstone put on the current record reported an existing key".to_string(),
            )),
        }
    }
}
