//! Store Module
//!
//! The record store collaborator the execution core runs against.
//!
//! ## Responsibilities
//! - Cursor-based search / scan / put / delete inside a transaction
//! - Versioning of every physical write
//! - Storage size of the record under the cursor
//! - Secondary index scans
//!
//! The core only uses the traits below. [`MemStore`] is the in-process
//! implementation used by tests, the bench, and the `opctl` replay tool.

mod index;
mod memory;

use std::sync::atomic::{AtomicI64, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::Result;
use crate::schema::TableId;
use crate::version::Version;

pub use index::IndexEntry;
pub use memory::MemStore;

// =============================================================================
// Records
// =============================================================================

/// A record as held by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub value: Bytes,
    pub version: Version,
    pub creation_time: u64,
    pub modification_time: u64,
    /// Absolute expiration in unix millis; 0 = never
    pub expiration_time: u64,
    pub region_id: u32,
    pub tombstone: bool,
}

impl StoredRecord {
    /// Bytes this record occupies for key `key_len` long
    pub fn storage_size(&self, key_len: usize) -> usize {
        key_len + self.value.len()
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expiration_time != 0 && self.expiration_time <= now_ms
    }
}

/// Metadata stamped on a write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Absolute expiration in unix millis; 0 = never
    pub expiration_time: u64,
    /// Keep the existing record's expiration instead of `expiration_time`
    pub keep_expiration: bool,
    pub modification_time: u64,
    /// Creation time to record; `None` = keep existing or use modification time
    pub creation_time: Option<u64>,
    pub region_id: u32,
    pub tombstone: bool,
}

/// Overwrite policy for [`RecordCursor::put`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutPolicy {
    /// Fail with `KeyExists` if any unexpired record (tombstones included)
    /// is present
    NoOverwrite,
    /// Insert or replace
    Overwrite,
    /// Replace the record the cursor is positioned on
    Current,
}

/// Outcome of a put
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    Written {
        version: Version,
        storage_size: usize,
        index_writes: u32,
    },
    /// NoOverwrite found a record; the cursor is not positioned on it
    KeyExists,
}

/// Outcome of deleting the current record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub storage_size: usize,
    pub index_writes: u32,
}

/// Scan direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Forward,
    Reverse,
}

/// Lock isolation for a cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Isolation {
    /// Read locks released when the cursor closes
    #[default]
    ReadCommitted,
    /// Read locks held until the transaction ends
    RepeatableRead,
}

/// Cursor configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct CursorConfig {
    pub isolation: Isolation,
    /// Records expiring at or before this time are invisible
    pub now_ms: u64,
}

// =============================================================================
// Collaborator Traits
// =============================================================================

/// Cursor over primary records
///
/// Reads return `(key, record)` and leave the cursor positioned on the key.
/// Expired records are never returned. Tombstones are returned; visibility is
/// the caller's decision. Dropping the cursor closes it.
pub trait RecordCursor {
    /// Exact lookup
    fn search(&mut self, key: &[u8]) -> Result<Option<StoredRecord>>;

    /// Position on the first key `>= key` (forward) or last key `<= key`
    /// (reverse); strict when `inclusive` is false. `None` starts at the end
    /// matching the direction.
    fn seek(
        &mut self,
        key: Option<&[u8]>,
        direction: Direction,
        inclusive: bool,
    ) -> Result<Option<(Vec<u8>, StoredRecord)>>;

    /// Step to the neighbouring key
    fn advance(&mut self, direction: Direction) -> Result<Option<(Vec<u8>, StoredRecord)>>;

    fn put(
        &mut self,
        key: &[u8],
        value: &[u8],
        policy: PutPolicy,
        options: &WriteOptions,
    ) -> Result<PutOutcome>;

    /// Delete the record under the cursor
    fn delete(&mut self) -> Result<DeleteOutcome>;

    /// Storage size of the record under the cursor
    fn storage_size(&self) -> Result<usize>;

    /// Version of the record under the cursor
    fn current_version(&self) -> Option<Version>;
}

/// Cursor over one secondary index
pub trait IndexCursor {
    /// Position on the first entry whose secondary key is `>= sec` (forward)
    /// or the last `<= sec` (reverse); strict when `inclusive` is false.
    fn seek_secondary(
        &mut self,
        sec: Option<&[u8]>,
        direction: Direction,
        inclusive: bool,
    ) -> Result<Option<IndexEntry>>;

    /// Position strictly after (forward) or before (reverse) `entry`
    fn seek_after(&mut self, entry: &IndexEntry, direction: Direction) -> Result<Option<IndexEntry>>;

    fn advance(&mut self, direction: Direction) -> Result<Option<IndexEntry>>;
}

/// Transactional record store
pub trait RecordStore: Send + Sync {
    fn begin_transaction(&self) -> Transaction;

    fn open_cursor<'a>(
        &'a self,
        txn: &'a Transaction,
        config: CursorConfig,
    ) -> Result<Box<dyn RecordCursor + 'a>>;

    fn open_index_cursor<'a>(
        &'a self,
        txn: &'a Transaction,
        table_id: TableId,
        index: &str,
        config: CursorConfig,
    ) -> Result<Box<dyn IndexCursor + 'a>>;
}

// =============================================================================
// Transaction & Partition
// =============================================================================

/// Active transaction handle
#[derive(Debug)]
pub struct Transaction {
    id: u64,
    held_read_locks: Mutex<Vec<Vec<u8>>>,
}

impl Transaction {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            held_read_locks: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Read locks still held by this transaction
    pub fn held_read_locks(&self) -> usize {
        self.held_read_locks.lock().len()
    }

    /// Keep read locks until the transaction ends
    pub fn hold_read_locks(&self, keys: impl IntoIterator<Item = Vec<u8>>) {
        self.held_read_locks.lock().extend(keys);
    }

    /// End the transaction, releasing every lock
    pub fn commit(self) {
        tracing::trace!("Transaction {} committed", self.id);
    }
}

/// Target partition of an operation
#[derive(Debug)]
pub struct Partition {
    pub id: u32,
    pub shard_id: u32,
    size_delta: AtomicI64,
}

impl Partition {
    pub fn new(id: u32, shard_id: u32) -> Self {
        Self {
            id,
            shard_id,
            size_delta: AtomicI64::new(0),
        }
    }

    /// Record a change in stored bytes
    pub fn add_size_delta(&self, delta: i64) {
        self.size_delta.fetch_add(delta, Ordering::Relaxed);
    }

    /// Net stored bytes added since the partition handle was created
    pub fn size_delta(&self) -> i64 {
        self.size_delta.load(Ordering::Relaxed)
    }
}
