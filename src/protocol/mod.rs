//! Protocol Module
//!
//! Versioned wire format for operations and their results.
//!
//! ## Frame Format
//! ```text
//! ┌──────────────┬──────────┬─────────────────────────────┐
//! │ SerialVer(2) │ Len (4)  │         Payload             │
//! └──────────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Serial Versions
//! - 20: base protocol
//! - 21: TTL
//! - 22: multi-region (PutResolve, tombstones, region ids)
//! - 23: creation / modification times
//! - 24: TableCharge, metadata sequence number
//!
//! ### Compatibility Rules
//! - Decoding an older frame defaults every newer field
//! - Encoding for an older peer fails if a newer feature is in use
//! - An opcode newer than the frame's serial version is rejected
//! - A result whose opcode differs from the request's is a fatal mismatch

mod codec;
mod command;
mod response;
mod serial;
mod wire;

pub use codec::{
    decode_request, decode_result, encode_request, encode_result, read_request, read_result,
    write_request, write_result, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
pub use command::{decode_request_payload, encode_request_payload, Request};
pub use response::{decode_result_payload, encode_result_payload};
pub use serial::{
    check_serial_version, CREATION_TIME_SERIAL_VERSION, CURRENT_SERIAL_VERSION,
    MINIMUM_SERIAL_VERSION, MULTI_REGION_SERIAL_VERSION, TABLE_CHARGE_SERIAL_VERSION,
    TTL_SERIAL_VERSION,
};
