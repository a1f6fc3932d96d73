//! Operation results
//!
//! Built once by the handler, immutable afterwards. Every result carries the
//! KB charged and the schema generation the execution observed.

use bytes::Bytes;

use crate::error::{AtlasError, Result};
use crate::query::ResumeInfo;
use crate::version::Version;

use super::{OpCode, ResultKind};

/// Information about the record a write replaced or failed against
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreviousRecord {
    pub value: Option<Bytes>,
    pub version: Option<Version>,
    pub creation_time: u64,
    pub modification_time: u64,
    pub expiration_time: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetResult {
    pub value: Option<Bytes>,
    pub version: Option<Version>,
    pub creation_time: u64,
    pub modification_time: u64,
    pub expiration_time: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutResult {
    /// Version of the new record; `None` when nothing was written for the caller
    pub new_version: Option<Version>,
    pub expiration_time: u64,
    pub previous: Option<PreviousRecord>,
}

impl PutResult {
    pub fn success(&self) -> bool {
        self.new_version.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteResult {
    /// A live record existed and was removed
    pub deleted: bool,
    pub previous: Option<PreviousRecord>,
}

/// One row or key returned by an iteration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultRecord {
    pub key: Vec<u8>,
    /// `None` for key-only iterations
    pub value: Option<Bytes>,
    pub version: Option<Version>,
    pub creation_time: u64,
    pub modification_time: u64,
    pub expiration_time: u64,
    pub tombstone: bool,
    /// Secondary key, for index iterations
    pub index_key: Option<Vec<u8>>,
}

/// MultiGet / MultiGetTable / TableIterate / IndexIterate (and key variants)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IterateResult {
    pub records: Vec<ResultRecord>,
    pub more: bool,
    pub resume_key: Option<Vec<u8>>,
    /// Index iterations only
    pub resume_secondary_key: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiDeleteResult {
    pub num_deleted: u32,
    pub more: bool,
    pub resume_key: Option<Vec<u8>>,
}

/// Rows found under one parent key of a bulk get
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyBatch {
    /// Index into the request's parent keys
    pub key_index: u32,
    pub records: Vec<ResultRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkGetResult {
    pub batches: Vec<KeyBatch>,
    pub more: bool,
    /// Parent key index the resume key applies to
    pub resume_parent_index: u32,
    pub resume_key: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutBatchResult {
    pub num_put: u32,
    /// Input indices that were already present (insert mode) or lost
    /// resolution (resolve mode)
    pub key_present_indices: Vec<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResult {
    pub rows: Vec<Bytes>,
    pub more: bool,
    pub resume_info: Option<ResumeInfo>,
}

/// Kind-specific result body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultPayload {
    Nop,
    Get(GetResult),
    Put(PutResult),
    Delete(DeleteResult),
    Iterate(IterateResult),
    MultiDelete(MultiDeleteResult),
    BulkGet(BulkGetResult),
    PutBatch(PutBatchResult),
    Query(QueryResult),
    TableCharge,
}

impl ResultPayload {
    pub fn kind(&self) -> ResultKind {
        match self {
            ResultPayload::Nop => ResultKind::Nop,
            ResultPayload::Get(_) => ResultKind::Get,
            ResultPayload::Put(_) => ResultKind::Put,
            ResultPayload::Delete(_) => ResultKind::Delete,
            ResultPayload::Iterate(_) => ResultKind::Iterate,
            ResultPayload::MultiDelete(_) => ResultKind::MultiDelete,
            ResultPayload::BulkGet(_) => ResultKind::BulkGet,
            ResultPayload::PutBatch(_) => ResultKind::PutBatch,
            ResultPayload::Query(_) => ResultKind::Query,
            ResultPayload::TableCharge => ResultKind::TableCharge,
        }
    }
}

/// Result of one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpResult {
    pub opcode: OpCode,
    pub read_kb: u32,
    pub write_kb: u32,
    pub metadata_seq_num: u64,
    pub payload: ResultPayload,
}

impl OpResult {
    /// Build a result, rejecting a payload that does not belong to `opcode`
    pub fn new(
        opcode: OpCode,
        read_kb: u32,
        write_kb: u32,
        metadata_seq_num: u64,
        payload: ResultPayload,
    ) -> Result<Self> {
        let result = Self {
            opcode,
            read_kb,
            write_kb,
            metadata_seq_num,
            payload,
        };
        result.check_type(opcode)?;
        Ok(result)
    }

    /// Fail if this result is not the shape `expected` produces
    pub fn check_type(&self, expected: OpCode) -> Result<()> {
        if self.opcode != expected || self.payload.kind() != expected.result_kind() {
            return Err(AtlasError::ResultTypeMismatch {
                expected: format!("{} ({:?})", expected, expected.result_kind()),
                actual: format!("{} ({:?})", self.opcode, self.payload.kind()),
            });
        }
        Ok(())
    }

    /// Kind-specific success
    pub fn success(&self) -> bool {
        match &self.payload {
            ResultPayload::Get(r) => r.value.is_some(),
            ResultPayload::Put(r) => r.success(),
            ResultPayload::Delete(r) => r.deleted,
            ResultPayload::Nop
            | ResultPayload::Iterate(_)
            | ResultPayload::MultiDelete(_)
            | ResultPayload::BulkGet(_)
            | ResultPayload::PutBatch(_)
            | ResultPayload::Query(_)
            | ResultPayload::TableCharge => true,
        }
    }

    // =========================================================================
    // Typed Accessors
    // =========================================================================

    pub fn as_get(&self) -> Option<&GetResult> {
        match &self.payload {
            ResultPayload::Get(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_put(&self) -> Option<&PutResult> {
        match &self.payload {
            ResultPayload::Put(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_delete(&self) -> Option<&DeleteResult> {
        match &self.payload {
            ResultPayload::Delete(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_iterate(&self) -> Option<&IterateResult> {
        match &self.payload {
            ResultPayload::Iterate(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_multi_delete(&self) -> Option<&MultiDeleteResult> {
        match &self.payload {
            ResultPayload::MultiDelete(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_bulk_get(&self) -> Option<&BulkGetResult> {
        match &self.payload {
            ResultPayload::BulkGet(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_put_batch(&self) -> Option<&PutBatchResult> {
        match &self.payload {
            ResultPayload::PutBatch(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_query(&self) -> Option<&QueryResult> {
        match &self.payload {
            ResultPayload::Query(r) => Some(r),
            _ => None,
        }
    }
}
