//! Operation codes
//!
//! Append-only: the numeric value of an opcode is part of the wire format and
//! must never be reordered or reused.

use crate::error::{AtlasError, Result};
use crate::protocol::{
    MINIMUM_SERIAL_VERSION, MULTI_REGION_SERIAL_VERSION, TABLE_CHARGE_SERIAL_VERSION,
};

/// Operation kind tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    Nop = 0,
    Get = 1,
    MultiGet = 2,
    MultiGetKeys = 3,
    MultiGetTable = 4,
    MultiGetTableKeys = 5,
    TableIterate = 6,
    TableKeysIterate = 7,
    IndexIterate = 8,
    IndexKeysIterate = 9,
    Put = 10,
    PutIfAbsent = 11,
    PutIfPresent = 12,
    PutIfVersion = 13,
    Delete = 14,
    DeleteIfVersion = 15,
    MultiDeleteTable = 16,
    MultiGetBatchTable = 17,
    MultiGetBatchTableKeys = 18,
    PutBatch = 19,
    QuerySinglePartition = 20,
    QueryMultiPartition = 21,
    QueryMultiShard = 22,
    PutResolve = 23,
    TableCharge = 24,
}

/// Shape of the result produced for an opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    Nop,
    Get,
    Put,
    Delete,
    Iterate,
    MultiDelete,
    BulkGet,
    PutBatch,
    Query,
    TableCharge,
}

impl OpCode {
    /// Every opcode, in wire order
    pub const ALL: [OpCode; 25] = [
        OpCode::Nop,
        OpCode::Get,
        OpCode::MultiGet,
        OpCode::MultiGetKeys,
        OpCode::MultiGetTable,
        OpCode::MultiGetTableKeys,
        OpCode::TableIterate,
        OpCode::TableKeysIterate,
        OpCode::IndexIterate,
        OpCode::IndexKeysIterate,
        OpCode::Put,
        OpCode::PutIfAbsent,
        OpCode::PutIfPresent,
        OpCode::PutIfVersion,
        OpCode::Delete,
        OpCode::DeleteIfVersion,
        OpCode::MultiDeleteTable,
        OpCode::MultiGetBatchTable,
        OpCode::MultiGetBatchTableKeys,
        OpCode::PutBatch,
        OpCode::QuerySinglePartition,
        OpCode::QueryMultiPartition,
        OpCode::QueryMultiShard,
        OpCode::PutResolve,
        OpCode::TableCharge,
    ];

    /// First serial version that knows this opcode
    pub fn intro_serial_version(self) -> u16 {
        match self {
            OpCode::PutResolve => MULTI_REGION_SERIAL_VERSION,
            OpCode::TableCharge => TABLE_CHARGE_SERIAL_VERSION,
            _ => MINIMUM_SERIAL_VERSION,
        }
    }

    /// The one valid result shape for this opcode
    pub fn result_kind(self) -> ResultKind {
        match self {
            OpCode::Nop => ResultKind::Nop,
            OpCode::Get => ResultKind::Get,
            OpCode::Put
            | OpCode::PutIfAbsent
            | OpCode::PutIfPresent
            | OpCode::PutIfVersion
            | OpCode::PutResolve => ResultKind::Put,
            OpCode::Delete | OpCode::DeleteIfVersion => ResultKind::Delete,
            OpCode::MultiGet
            | OpCode::MultiGetKeys
            | OpCode::MultiGetTable
            | OpCode::MultiGetTableKeys
            | OpCode::TableIterate
            | OpCode::TableKeysIterate
            | OpCode::IndexIterate
            | OpCode::IndexKeysIterate => ResultKind::Iterate,
            OpCode::MultiDeleteTable => ResultKind::MultiDelete,
            OpCode::MultiGetBatchTable | OpCode::MultiGetBatchTableKeys => ResultKind::BulkGet,
            OpCode::PutBatch => ResultKind::PutBatch,
            OpCode::QuerySinglePartition | OpCode::QueryMultiPartition | OpCode::QueryMultiShard => {
                ResultKind::Query
            }
            OpCode::TableCharge => ResultKind::TableCharge,
        }
    }
}

impl TryFrom<u8> for OpCode {
    type Error = AtlasError;

    fn try_from(byte: u8) -> Result<Self> {
        OpCode::ALL
            .get(byte as usize)
            .copied()
            .ok_or_else(|| AtlasError::Protocol(format!("Unknown opcode: {}", byte)))
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
