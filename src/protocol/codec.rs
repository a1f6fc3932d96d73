//! Protocol codec
//!
//! Framing and stream helpers for requests and results.
//!
//! ## Frame Format
//! ```text
//! ┌──────────────┬──────────┬─────────────────────────────┐
//! │ SerialVer(2) │ Len (4)  │         Payload             │
//! └──────────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! Request payloads are described in `command.rs`, result payloads in
//! `response.rs`.

use std::io::{Read, Write};

use bytes::Bytes;

use super::command::{decode_request_payload, encode_request_payload, Request};
use super::response::{decode_result_payload, encode_result_payload};
use crate::error::{AtlasError, Result};
use crate::ops::{OpCode, OpResult};

/// Header size: 2 bytes serial version + 4 bytes length
pub const HEADER_SIZE: usize = 6;

/// Maximum payload size (16 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

// =============================================================================
// Framing
// =============================================================================

fn frame(serial_version: u16, payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD_SIZE as usize {
        return Err(AtlasError::Protocol(format!(
            "Payload too large: {} bytes (max {})",
            payload.len(),
            MAX_PAYLOAD_SIZE
        )));
    }
    let mut message = Vec::with_capacity(HEADER_SIZE + payload.len());
    message.extend_from_slice(&serial_version.to_be_bytes());
    message.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    message.extend_from_slice(payload);
    Ok(message)
}

/// Parse a frame header: (serial version, payload length)
fn parse_header(header: &[u8]) -> Result<(u16, usize)> {
    if header.len() < HEADER_SIZE {
        return Err(AtlasError::Protocol(format!(
            "Incomplete header: expected {} bytes, got {}",
            HEADER_SIZE,
            header.len()
        )));
    }
    let serial_version = u16::from_be_bytes([header[0], header[1]]);
    let payload_len = u32::from_be_bytes([header[2], header[3], header[4], header[5]]) as usize;

    if payload_len > MAX_PAYLOAD_SIZE as usize {
        return Err(AtlasError::Protocol(format!(
            "Payload too large: {} bytes (max {})",
            payload_len, MAX_PAYLOAD_SIZE
        )));
    }
    Ok((serial_version, payload_len))
}

/// Split a complete frame into (serial version, payload)
fn unframe(bytes: &[u8]) -> Result<(u16, Bytes)> {
    let (serial_version, payload_len) = parse_header(bytes)?;
    let total_len = HEADER_SIZE + payload_len;
    if bytes.len() < total_len {
        return Err(AtlasError::Protocol(format!(
            "Incomplete payload: expected {} bytes, got {}",
            total_len,
            bytes.len()
        )));
    }
    Ok((
        serial_version,
        Bytes::copy_from_slice(&bytes[HEADER_SIZE..total_len]),
    ))
}

// =============================================================================
// Request Encoding/Decoding
// =============================================================================

/// Encode a framed request using the request's serial version
pub fn encode_request(request: &Request) -> Result<Vec<u8>> {
    let payload = encode_request_payload(request)?;
    frame(request.serial_version, &payload)
}

/// Decode a framed request
pub fn decode_request(bytes: &[u8]) -> Result<Request> {
    let (serial_version, payload) = unframe(bytes)?;
    decode_request_payload(payload, serial_version)
}

// =============================================================================
// Result Encoding/Decoding
// =============================================================================

/// Encode a framed result for a peer speaking `serial_version`
pub fn encode_result(result: &OpResult, serial_version: u16) -> Result<Vec<u8>> {
    let payload = encode_result_payload(result, serial_version)?;
    frame(serial_version, &payload)
}

/// Decode a framed result produced for an `expected` operation
pub fn decode_result(bytes: &[u8], expected: OpCode) -> Result<OpResult> {
    let (serial_version, payload) = unframe(bytes)?;
    decode_result_payload(payload, serial_version, expected)
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read one frame: (serial version, payload)
fn read_frame<R: Read>(reader: &mut R) -> Result<(u16, Bytes)> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;
    let (serial_version, payload_len) = parse_header(&header)?;

    let mut payload = vec![0u8; payload_len];
    if payload_len > 0 {
        reader.read_exact(&mut payload)?;
    }
    Ok((serial_version, Bytes::from(payload)))
}

/// Read a complete request from a stream
///
/// Blocks until a complete request is received or an error occurs
pub fn read_request<R: Read>(reader: &mut R) -> Result<Request> {
    let (serial_version, payload) = read_frame(reader)?;
    decode_request_payload(payload, serial_version)
}

/// Write a request to a stream
pub fn write_request<W: Write>(writer: &mut W, request: &Request) -> Result<()> {
    let bytes = encode_request(request)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Read a complete result from a stream
pub fn read_result<R: Read>(reader: &mut R, expected: OpCode) -> Result<OpResult> {
    let (serial_version, payload) = read_frame(reader)?;
    decode_result_payload(payload, serial_version, expected)
}

/// Write a result to a stream
pub fn write_result<W: Write>(writer: &mut W, result: &OpResult, serial_version: u16) -> Result<()> {
    let bytes = encode_result(result, serial_version)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}
