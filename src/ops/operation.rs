//! Operation definitions
//!
//! An `Operation` is immutable once decoded. Everything that changes while it
//! runs lives in [`crate::tracker::ExecContext`].

use bytes::Bytes;

use crate::access::Privilege;
use crate::error::{AtlasError, Result};
use crate::keyspace::KeyRange;
use crate::query::ResumeInfo;
use crate::schema::{TableId, TargetTables};
use crate::store::Direction;
use crate::value::RequestValue;
use crate::version::Version;

use super::{OpCode, ReturnChoice};

const HOUR_MS: u64 = 60 * 60 * 1000;

/// Unit of a time-to-live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TtlUnit {
    Hours = 0,
    Days = 1,
}

/// Record time-to-live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeToLive {
    pub value: u64,
    pub unit: TtlUnit,
}

impl TimeToLive {
    pub fn hours(value: u64) -> Self {
        Self {
            value,
            unit: TtlUnit::Hours,
        }
    }

    pub fn days(value: u64) -> Self {
        Self {
            value,
            unit: TtlUnit::Days,
        }
    }

    /// Length in milliseconds, or `None` if it does not fit in a `u64`
    pub fn to_millis(self) -> Option<u64> {
        match self.unit {
            TtlUnit::Hours => self.value.checked_mul(HOUR_MS),
            TtlUnit::Days => self.value.checked_mul(24 * HOUR_MS),
        }
    }

    /// Absolute expiration for a write made at `now_ms`; 0 = never
    pub fn expiration_time(self, now_ms: u64) -> Result<u64> {
        if self.value == 0 {
            return Ok(0);
        }
        self.to_millis()
            .and_then(|ms| now_ms.checked_add(ms))
            .ok_or_else(|| AtlasError::IllegalArgument(format!("TTL out of range: {:?}", self)))
    }
}

// =============================================================================
// Single-Key Operations
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Get {
    pub key: Vec<u8>,
    pub table_id: Option<TableId>,
}

/// Put, PutIfAbsent and PutIfPresent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Put {
    pub key: Vec<u8>,
    pub value: RequestValue,
    pub return_choice: ReturnChoice,
    pub table_id: Option<TableId>,
    pub ttl: Option<TimeToLive>,
    /// Replace the TTL of an existing record; otherwise an update keeps it
    pub update_ttl: bool,
}

impl Put {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<RequestValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            return_choice: ReturnChoice::None,
            table_id: None,
            ttl: None,
            update_ttl: false,
        }
    }

    pub fn return_choice(mut self, choice: ReturnChoice) -> Self {
        self.return_choice = choice;
        self
    }

    pub fn table(mut self, table_id: TableId) -> Self {
        self.table_id = Some(table_id);
        self
    }

    pub fn ttl(mut self, ttl: TimeToLive, update_ttl: bool) -> Self {
        self.ttl = Some(ttl);
        self.update_ttl = update_ttl;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutIfVersion {
    pub put: Put,
    pub match_version: Version,
}

/// Replicated write from another region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutResolve {
    pub key: Vec<u8>,
    /// Empty for a tombstone
    pub value: Bytes,
    pub table_id: Option<TableId>,
    pub modification_time: u64,
    pub region_id: u32,
    pub tombstone: bool,
    /// Absolute expiration; 0 = never
    pub expiration_time: u64,
    /// 0 = unknown, the modification time is used
    pub creation_time: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delete {
    pub key: Vec<u8>,
    pub return_choice: ReturnChoice,
    pub table_id: Option<TableId>,
    /// Write a tombstone even on a single-region table
    pub do_tombstone: bool,
}

impl Delete {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            return_choice: ReturnChoice::None,
            table_id: None,
            do_tombstone: false,
        }
    }

    pub fn return_choice(mut self, choice: ReturnChoice) -> Self {
        self.return_choice = choice;
        self
    }

    pub fn table(mut self, table_id: TableId) -> Self {
        self.table_id = Some(table_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteIfVersion {
    pub delete: Delete,
    pub match_version: Version,
}

// =============================================================================
// Multi-Key Operations
// =============================================================================

/// MultiGet / MultiGetKeys over the plain keyspace
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MultiGet {
    pub parent_key: Vec<u8>,
    pub sub_range: Option<KeyRange>,
    pub include_tombstones: bool,
}

/// MultiGetTable / MultiGetTableKeys
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MultiGetTable {
    pub parent_key: Vec<u8>,
    pub sub_range: Option<KeyRange>,
    pub targets: TargetTables,
    pub include_tombstones: bool,
}

/// TableIterate / TableKeysIterate
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableIterate {
    pub parent_key: Vec<u8>,
    pub sub_range: Option<KeyRange>,
    pub targets: TargetTables,
    pub direction: Direction,
    /// 0 = configured default
    pub batch_size: u32,
    /// 0 = no budget
    pub max_read_kb: u32,
    pub resume_key: Option<Vec<u8>>,
    pub include_tombstones: bool,
}

/// IndexIterate / IndexKeysIterate
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndexIterate {
    pub index_name: String,
    pub targets: TargetTables,
    /// Range over secondary key bytes
    pub range: Option<KeyRange>,
    pub direction: Direction,
    pub batch_size: u32,
    pub max_read_kb: u32,
    pub resume_secondary_key: Option<Vec<u8>>,
    pub resume_primary_key: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MultiDeleteTable {
    pub parent_key: Vec<u8>,
    pub sub_range: Option<KeyRange>,
    pub targets: TargetTables,
    /// 0 = no budget
    pub max_write_kb: u32,
    pub resume_key: Option<Vec<u8>>,
    pub do_tombstone: bool,
}

/// MultiGetBatchTable / MultiGetBatchTableKeys
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MultiGetBatchTable {
    pub parent_keys: Vec<Vec<u8>>,
    pub sub_range: Option<KeyRange>,
    pub targets: TargetTables,
    pub batch_size: u32,
    pub max_read_kb: u32,
    /// Resume point within the first parent key
    pub resume_key: Option<Vec<u8>>,
    pub include_tombstones: bool,
}

// =============================================================================
// Batch, Query, Charge
// =============================================================================

/// One PutBatch entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    pub key: Vec<u8>,
    pub value: Bytes,
    pub ttl: Option<TimeToLive>,
    pub tombstone: bool,
    pub modification_time: Option<u64>,
    /// `None` = the batch's local region
    pub region_id: Option<u32>,
}

impl BatchEntry {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ttl: None,
            tombstone: false,
            modification_time: None,
            region_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutBatch {
    pub table_id: Option<TableId>,
    pub entries: Vec<BatchEntry>,
    /// Overwrite existing records; otherwise insert-if-absent
    pub overwrite: bool,
    /// Resolve every entry against the resident record
    pub use_put_resolve: bool,
    pub local_region_id: u32,
    pub update_ttl: bool,
}

impl PutBatch {
    pub fn new(entries: Vec<BatchEntry>) -> Self {
        Self {
            table_id: None,
            entries,
            overwrite: true,
            use_put_resolve: false,
            local_region_id: crate::config::NULL_REGION_ID,
            update_ttl: false,
        }
    }
}

/// One batch of a query plan
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Query {
    /// Serialized plan, opaque to this crate
    pub plan: Bytes,
    pub bind_variables: Vec<(String, Bytes)>,
    /// Tables the plan reads or writes
    pub table_ids: Vec<TableId>,
    pub is_update: bool,
    pub batch_size: u32,
    pub max_read_kb: u32,
    /// Partitions or shards the batch must see; empty for a single partition
    pub partitions: Vec<u32>,
    pub resume_info: Option<ResumeInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableCharge {
    pub table_id: TableId,
    pub read_kb: u32,
    pub write_kb: u32,
}

// =============================================================================
// Operation
// =============================================================================

/// The closed set of operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Nop,
    Get(Get),

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------
    Put(Put),
    PutIfAbsent(Put),
    PutIfPresent(Put),
    PutIfVersion(PutIfVersion),
    PutResolve(PutResolve),
    Delete(Delete),
    DeleteIfVersion(DeleteIfVersion),

    // -------------------------------------------------------------------------
    // Multi-key
    // -------------------------------------------------------------------------
    MultiGet(MultiGet),
    MultiGetKeys(MultiGet),
    MultiGetTable(MultiGetTable),
    MultiGetTableKeys(MultiGetTable),
    TableIterate(TableIterate),
    TableKeysIterate(TableIterate),
    IndexIterate(IndexIterate),
    IndexKeysIterate(IndexIterate),
    MultiDeleteTable(MultiDeleteTable),
    MultiGetBatchTable(MultiGetBatchTable),
    MultiGetBatchTableKeys(MultiGetBatchTable),

    // -------------------------------------------------------------------------
    // Batch / Query / Charge
    // -------------------------------------------------------------------------
    PutBatch(PutBatch),
    QuerySinglePartition(Query),
    QueryMultiPartition(Query),
    QueryMultiShard(Query),
    TableCharge(TableCharge),
}

impl Operation {
    pub fn opcode(&self) -> OpCode {
        match self {
            Operation::Nop => OpCode::Nop,
            Operation::Get(_) => OpCode::Get,
            Operation::Put(_) => OpCode::Put,
            Operation::PutIfAbsent(_) => OpCode::PutIfAbsent,
            Operation::PutIfPresent(_) => OpCode::PutIfPresent,
            Operation::PutIfVersion(_) => OpCode::PutIfVersion,
            Operation::PutResolve(_) => OpCode::PutResolve,
            Operation::Delete(_) => OpCode::Delete,
            Operation::DeleteIfVersion(_) => OpCode::DeleteIfVersion,
            Operation::MultiGet(_) => OpCode::MultiGet,
            Operation::MultiGetKeys(_) => OpCode::MultiGetKeys,
            Operation::MultiGetTable(_) => OpCode::MultiGetTable,
            Operation::MultiGetTableKeys(_) => OpCode::MultiGetTableKeys,
            Operation::TableIterate(_) => OpCode::TableIterate,
            Operation::TableKeysIterate(_) => OpCode::TableKeysIterate,
            Operation::IndexIterate(_) => OpCode::IndexIterate,
            Operation::IndexKeysIterate(_) => OpCode::IndexKeysIterate,
            Operation::MultiDeleteTable(_) => OpCode::MultiDeleteTable,
            Operation::MultiGetBatchTable(_) => OpCode::MultiGetBatchTable,
            Operation::MultiGetBatchTableKeys(_) => OpCode::MultiGetBatchTableKeys,
            Operation::PutBatch(_) => OpCode::PutBatch,
            Operation::QuerySinglePartition(_) => OpCode::QuerySinglePartition,
            Operation::QueryMultiPartition(_) => OpCode::QueryMultiPartition,
            Operation::QueryMultiShard(_) => OpCode::QueryMultiShard,
            Operation::TableCharge(_) => OpCode::TableCharge,
        }
    }

    /// True for every kind that may modify the store
    pub fn performs_write(&self) -> bool {
        match self {
            Operation::Put(_)
            | Operation::PutIfAbsent(_)
            | Operation::PutIfPresent(_)
            | Operation::PutIfVersion(_)
            | Operation::PutResolve(_)
            | Operation::Delete(_)
            | Operation::DeleteIfVersion(_)
            | Operation::MultiDeleteTable(_)
            | Operation::PutBatch(_) => true,
            Operation::QuerySinglePartition(q)
            | Operation::QueryMultiPartition(q)
            | Operation::QueryMultiShard(q) => q.is_update,
            _ => false,
        }
    }

    /// True for delete-shaped kinds
    pub fn is_delete(&self) -> bool {
        match self {
            Operation::Delete(_) | Operation::DeleteIfVersion(_) | Operation::MultiDeleteTable(_) => {
                true
            }
            Operation::PutResolve(op) => op.tombstone,
            _ => false,
        }
    }

    /// Plain MultiGet kinds hold read locks until the transaction ends
    pub fn needs_repeatable_read(&self) -> bool {
        matches!(self, Operation::MultiGet(_) | Operation::MultiGetKeys(_))
    }

    /// Return choice of single-key writes
    pub fn return_choice(&self) -> ReturnChoice {
        match self {
            Operation::Put(p) | Operation::PutIfAbsent(p) | Operation::PutIfPresent(p) => {
                p.return_choice
            }
            Operation::PutIfVersion(p) => p.put.return_choice,
            Operation::Delete(d) => d.return_choice,
            Operation::DeleteIfVersion(d) => d.delete.return_choice,
            _ => ReturnChoice::None,
        }
    }

    /// Privileges the caller must hold on every table or keyspace touched
    pub fn required_privileges(&self) -> Vec<Privilege> {
        let mut required = Vec::with_capacity(2);
        if self.is_delete() {
            required.push(Privilege::Delete);
        } else if self.performs_write() {
            required.push(Privilege::Insert);
        }
        if let Operation::PutBatch(batch) = self {
            if batch.entries.iter().any(|e| e.tombstone) {
                required.push(Privilege::Delete);
            }
        }
        if !self.performs_write() || self.return_choice().needs_previous() {
            required.push(Privilege::Read);
        }
        required
    }

    /// Table named by a single-key or batch operation
    pub fn table_id(&self) -> Option<TableId> {
        match self {
            Operation::Get(g) => g.table_id,
            Operation::Put(p) | Operation::PutIfAbsent(p) | Operation::PutIfPresent(p) => {
                p.table_id
            }
            Operation::PutIfVersion(p) => p.put.table_id,
            Operation::PutResolve(p) => p.table_id,
            Operation::Delete(d) => d.table_id,
            Operation::DeleteIfVersion(d) => d.delete.table_id,
            Operation::MultiGetTable(m) | Operation::MultiGetTableKeys(m) => {
                m.targets.targets.first().copied()
            }
            Operation::TableIterate(t) | Operation::TableKeysIterate(t) => {
                t.targets.targets.first().copied()
            }
            Operation::IndexIterate(i) | Operation::IndexKeysIterate(i) => {
                i.targets.targets.first().copied()
            }
            Operation::MultiDeleteTable(m) => m.targets.targets.first().copied(),
            Operation::MultiGetBatchTable(m) | Operation::MultiGetBatchTableKeys(m) => {
                m.targets.targets.first().copied()
            }
            Operation::PutBatch(b) => b.table_id,
            Operation::TableCharge(c) => Some(c.table_id),
            Operation::QuerySinglePartition(q)
            | Operation::QueryMultiPartition(q)
            | Operation::QueryMultiShard(q) => q.table_ids.first().copied(),
            Operation::Nop | Operation::MultiGet(_) | Operation::MultiGetKeys(_) => None,
        }
    }
}
