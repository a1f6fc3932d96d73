//! Primitive field encoding
//!
//! All integers are big-endian. Variable-length fields are a `u32` length
//! followed by the bytes; optional fields are a presence byte followed by the
//! field.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{AtlasError, Result};
use crate::keyspace::KeyRange;
use crate::ops::{ReturnChoice, TimeToLive, TtlUnit};
use crate::schema::TargetTables;
use crate::store::Direction;
use crate::version::Version;

// =============================================================================
// Decoding
// =============================================================================

fn ensure(buf: &Bytes, n: usize, what: &str) -> Result<()> {
    if buf.remaining() < n {
        return Err(AtlasError::Protocol(format!(
            "Truncated {}: need {} bytes, have {}",
            what,
            n,
            buf.remaining()
        )));
    }
    Ok(())
}

pub(crate) fn get_u8(buf: &mut Bytes, what: &str) -> Result<u8> {
    ensure(buf, 1, what)?;
    Ok(buf.get_u8())
}

pub(crate) fn get_u16(buf: &mut Bytes, what: &str) -> Result<u16> {
    ensure(buf, 2, what)?;
    Ok(buf.get_u16())
}

pub(crate) fn get_u32(buf: &mut Bytes, what: &str) -> Result<u32> {
    ensure(buf, 4, what)?;
    Ok(buf.get_u32())
}

pub(crate) fn get_u64(buf: &mut Bytes, what: &str) -> Result<u64> {
    ensure(buf, 8, what)?;
    Ok(buf.get_u64())
}

pub(crate) fn get_bool(buf: &mut Bytes, what: &str) -> Result<bool> {
    match get_u8(buf, what)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(AtlasError::Protocol(format!(
            "Invalid boolean for {}: {}",
            what, other
        ))),
    }
}

pub(crate) fn get_bytes(buf: &mut Bytes, what: &str) -> Result<Bytes> {
    let len = get_u32(buf, what)? as usize;
    ensure(buf, len, what)?;
    Ok(buf.copy_to_bytes(len))
}

pub(crate) fn get_vec(buf: &mut Bytes, what: &str) -> Result<Vec<u8>> {
    Ok(get_bytes(buf, what)?.to_vec())
}

pub(crate) fn get_opt_vec(buf: &mut Bytes, what: &str) -> Result<Option<Vec<u8>>> {
    if get_bool(buf, what)? {
        Ok(Some(get_vec(buf, what)?))
    } else {
        Ok(None)
    }
}

pub(crate) fn get_opt_bytes(buf: &mut Bytes, what: &str) -> Result<Option<Bytes>> {
    if get_bool(buf, what)? {
        Ok(Some(get_bytes(buf, what)?))
    } else {
        Ok(None)
    }
}

pub(crate) fn get_string(buf: &mut Bytes, what: &str) -> Result<String> {
    let bytes = get_vec(buf, what)?;
    String::from_utf8(bytes)
        .map_err(|_| AtlasError::Protocol(format!("Invalid UTF-8 in {}", what)))
}

/// Table id; 0 on the wire means none
pub(crate) fn get_table_id(buf: &mut Bytes) -> Result<Option<u64>> {
    let id = get_u64(buf, "table id")?;
    Ok((id != 0).then_some(id))
}

pub(crate) fn get_version(buf: &mut Bytes) -> Result<Version> {
    let shard_id = get_u32(buf, "version shard")?;
    let seq = get_u64(buf, "version sequence")?;
    let node_id = get_u32(buf, "version node")?;
    let position = if get_bool(buf, "version position")? {
        Some(get_u64(buf, "version position")?)
    } else {
        None
    };
    Ok(Version::new(shard_id, seq, node_id, position))
}

pub(crate) fn get_opt_version(buf: &mut Bytes) -> Result<Option<Version>> {
    if get_bool(buf, "version")? {
        Ok(Some(get_version(buf)?))
    } else {
        Ok(None)
    }
}

pub(crate) fn get_return_choice(buf: &mut Bytes) -> Result<ReturnChoice> {
    ReturnChoice::try_from(get_u8(buf, "return choice")?)
}

pub(crate) fn get_direction(buf: &mut Bytes) -> Result<Direction> {
    match get_u8(buf, "direction")? {
        0 => Ok(Direction::Forward),
        1 => Ok(Direction::Reverse),
        other => Err(AtlasError::Protocol(format!("Unknown direction: {}", other))),
    }
}

pub(crate) fn get_ttl(buf: &mut Bytes) -> Result<Option<TimeToLive>> {
    if !get_bool(buf, "ttl")? {
        return Ok(None);
    }
    let value = get_u64(buf, "ttl value")?;
    let unit = match get_u8(buf, "ttl unit")? {
        0 => TtlUnit::Hours,
        1 => TtlUnit::Days,
        other => return Err(AtlasError::Protocol(format!("Unknown TTL unit: {}", other))),
    };
    Ok(Some(TimeToLive { value, unit }))
}

pub(crate) fn get_key_range(buf: &mut Bytes) -> Result<Option<KeyRange>> {
    if !get_bool(buf, "key range")? {
        return Ok(None);
    }
    Ok(Some(KeyRange {
        start: get_opt_vec(buf, "range start")?,
        start_inclusive: get_bool(buf, "range start inclusive")?,
        end: get_opt_vec(buf, "range end")?,
        end_inclusive: get_bool(buf, "range end inclusive")?,
    }))
}

pub(crate) fn get_targets(buf: &mut Bytes) -> Result<TargetTables> {
    let targets = get_table_ids(buf, "target tables")?;
    let ancestors = get_table_ids(buf, "ancestor tables")?;
    Ok(TargetTables { targets, ancestors })
}

fn get_table_ids(buf: &mut Bytes, what: &str) -> Result<Vec<u64>> {
    let count = get_u16(buf, what)? as usize;
    let mut ids = Vec::with_capacity(count);
    for _ in 0..count {
        ids.push(get_u64(buf, what)?);
    }
    Ok(ids)
}

// =============================================================================
// Encoding
// =============================================================================

pub(crate) fn put_bool(buf: &mut BytesMut, value: bool) {
    buf.put_u8(value as u8);
}

pub(crate) fn put_bytes(buf: &mut BytesMut, bytes: &[u8]) {
    buf.put_u32(bytes.len() as u32);
    buf.put_slice(bytes);
}

pub(crate) fn put_opt_bytes(buf: &mut BytesMut, bytes: Option<&[u8]>) {
    match bytes {
        Some(b) => {
            put_bool(buf, true);
            put_bytes(buf, b);
        }
        None => put_bool(buf, false),
    }
}

pub(crate) fn put_table_id(buf: &mut BytesMut, table_id: Option<u64>) {
    buf.put_u64(table_id.unwrap_or(0));
}

pub(crate) fn put_version(buf: &mut BytesMut, version: &Version) {
    buf.put_u32(version.shard_id);
    buf.put_u64(version.seq);
    buf.put_u32(version.node_id);
    match version.position {
        Some(p) => {
            put_bool(buf, true);
            buf.put_u64(p);
        }
        None => put_bool(buf, false),
    }
}

pub(crate) fn put_opt_version(buf: &mut BytesMut, version: Option<&Version>) {
    match version {
        Some(v) => {
            put_bool(buf, true);
            put_version(buf, v);
        }
        None => put_bool(buf, false),
    }
}

pub(crate) fn put_direction(buf: &mut BytesMut, direction: Direction) {
    buf.put_u8(match direction {
        Direction::Forward => 0,
        Direction::Reverse => 1,
    });
}

pub(crate) fn put_ttl(buf: &mut BytesMut, ttl: Option<&TimeToLive>) {
    match ttl {
        Some(t) => {
            put_bool(buf, true);
            buf.put_u64(t.value);
            buf.put_u8(t.unit as u8);
        }
        None => put_bool(buf, false),
    }
}

pub(crate) fn put_key_range(buf: &mut BytesMut, range: Option<&KeyRange>) {
    let Some(range) = range else {
        put_bool(buf, false);
        return;
    };
    put_bool(buf, true);
    put_opt_bytes(buf, range.start.as_deref());
    put_bool(buf, range.start_inclusive);
    put_opt_bytes(buf, range.end.as_deref());
    put_bool(buf, range.end_inclusive);
}

pub(crate) fn put_targets(buf: &mut BytesMut, targets: &TargetTables) {
    for ids in [&targets.targets, &targets.ancestors] {
        buf.put_u16(ids.len() as u16);
        for id in ids.iter() {
            buf.put_u64(*id);
        }
    }
}
