//! Ops Module
//!
//! The closed set of operations a storage node executes, and their results.
//!
//! ```text
//! ┌───────────┐  decode   ┌───────────┐  execute  ┌──────────┐
//! │  request  │ ────────► │ Operation │ ────────► │ OpResult │
//! │  frame    │           │ (OpCode)  │           │ (kind)   │
//! └───────────┘           └───────────┘           └──────────┘
//! ```
//!
//! Each [`OpCode`] maps to exactly one [`ResultKind`].

mod choice;
mod opcode;
mod operation;
mod result;

pub use choice::ReturnChoice;
pub use opcode::{OpCode, ResultKind};
pub use operation::{
    BatchEntry, Delete, DeleteIfVersion, Get, IndexIterate, MultiDeleteTable, MultiGet,
    MultiGetBatchTable, MultiGetTable, Operation, Put, PutBatch, PutIfVersion, PutResolve, Query,
    TableCharge, TableIterate, TimeToLive, TtlUnit,
};
pub use result::{
    BulkGetResult, DeleteResult, GetResult, IterateResult, KeyBatch, MultiDeleteResult, OpResult,
    PreviousRecord, PutBatchResult, PutResult, QueryResult, ResultPayload, ResultRecord,
};
