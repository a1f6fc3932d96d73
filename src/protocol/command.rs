//! Request encoding
//!
//! ## Payload
//! ```text
//! ┌───────────┬──────────────┬────────────────────────────┐
//! │ Opcode(1) │ Timeout (4)  │ Operation fields           │
//! └───────────┴──────────────┴────────────────────────────┘
//! ```
//!
//! Fields introduced by a later serial version follow the older fields of the
//! same operation, so an older frame simply ends earlier.

use bytes::{BufMut, Bytes, BytesMut};

use crate::config::NULL_REGION_ID;
use crate::error::{AtlasError, Result};
use crate::ops::{
    BatchEntry, Delete, DeleteIfVersion, Get, IndexIterate, MultiDeleteTable, MultiGet,
    MultiGetBatchTable, MultiGetTable, OpCode, Operation, Put, PutBatch, PutIfVersion, PutResolve,
    Query, TableCharge, TableIterate,
};
use crate::query::ResumeInfo;

use super::serial::{
    check_serial_version, require, CREATION_TIME_SERIAL_VERSION, MULTI_REGION_SERIAL_VERSION,
    TTL_SERIAL_VERSION,
};
use super::wire::*;

/// A decoded request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Serial version the request was (or will be) encoded with
    pub serial_version: u16,
    /// Client timeout in milliseconds; 0 = none
    pub timeout_ms: u32,
    pub operation: Operation,
}

impl Request {
    pub fn new(serial_version: u16, timeout_ms: u32, operation: Operation) -> Self {
        Self {
            serial_version,
            timeout_ms,
            operation,
        }
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Encode a request payload (no frame header)
pub fn encode_request_payload(request: &Request) -> Result<BytesMut> {
    let sv = request.serial_version;
    check_serial_version(sv)?;

    let op = &request.operation;
    let opcode = op.opcode();
    if opcode.intro_serial_version() > sv {
        return Err(AtlasError::UnsupportedSerialVersion {
            feature: opcode_feature(opcode),
            found: sv,
            required: opcode.intro_serial_version(),
        });
    }

    let mut buf = BytesMut::with_capacity(64);
    buf.put_u8(opcode as u8);
    buf.put_u32(request.timeout_ms);

    match op {
        Operation::Nop => {}
        Operation::Get(get) => {
            put_bytes(&mut buf, &get.key);
            put_table_id(&mut buf, get.table_id);
        }
        Operation::Put(put) | Operation::PutIfAbsent(put) | Operation::PutIfPresent(put) => {
            encode_put(&mut buf, put, sv)?;
        }
        Operation::PutIfVersion(op) => {
            encode_put(&mut buf, &op.put, sv)?;
            put_version(&mut buf, &op.match_version);
        }
        Operation::PutResolve(op) => encode_put_resolve(&mut buf, op, sv)?,
        Operation::Delete(delete) => encode_delete(&mut buf, delete, sv)?,
        Operation::DeleteIfVersion(op) => {
            encode_delete(&mut buf, &op.delete, sv)?;
            put_version(&mut buf, &op.match_version);
        }
        Operation::MultiGet(op) | Operation::MultiGetKeys(op) => {
            put_bytes(&mut buf, &op.parent_key);
            put_key_range(&mut buf, op.sub_range.as_ref());
            encode_include_tombstones(&mut buf, op.include_tombstones, sv)?;
        }
        Operation::MultiGetTable(op) | Operation::MultiGetTableKeys(op) => {
            put_bytes(&mut buf, &op.parent_key);
            put_key_range(&mut buf, op.sub_range.as_ref());
            put_targets(&mut buf, &op.targets);
            encode_include_tombstones(&mut buf, op.include_tombstones, sv)?;
        }
        Operation::TableIterate(op) | Operation::TableKeysIterate(op) => {
            put_bytes(&mut buf, &op.parent_key);
            put_key_range(&mut buf, op.sub_range.as_ref());
            put_targets(&mut buf, &op.targets);
            put_direction(&mut buf, op.direction);
            buf.put_u32(op.batch_size);
            buf.put_u32(op.max_read_kb);
            put_opt_bytes(&mut buf, op.resume_key.as_deref());
            encode_include_tombstones(&mut buf, op.include_tombstones, sv)?;
        }
        Operation::IndexIterate(op) | Operation::IndexKeysIterate(op) => {
            put_bytes(&mut buf, op.index_name.as_bytes());
            put_targets(&mut buf, &op.targets);
            put_key_range(&mut buf, op.range.as_ref());
            put_direction(&mut buf, op.direction);
            buf.put_u32(op.batch_size);
            buf.put_u32(op.max_read_kb);
            put_opt_bytes(&mut buf, op.resume_secondary_key.as_deref());
            put_opt_bytes(&mut buf, op.resume_primary_key.as_deref());
        }
        Operation::MultiDeleteTable(op) => {
            put_bytes(&mut buf, &op.parent_key);
            put_key_range(&mut buf, op.sub_range.as_ref());
            put_targets(&mut buf, &op.targets);
            buf.put_u32(op.max_write_kb);
            put_opt_bytes(&mut buf, op.resume_key.as_deref());
            require(op.do_tombstone, "tombstone delete", sv, MULTI_REGION_SERIAL_VERSION)?;
            if sv >= MULTI_REGION_SERIAL_VERSION {
                put_bool(&mut buf, op.do_tombstone);
            }
        }
        Operation::MultiGetBatchTable(op) | Operation::MultiGetBatchTableKeys(op) => {
            buf.put_u32(op.parent_keys.len() as u32);
            for key in &op.parent_keys {
                put_bytes(&mut buf, key);
            }
            put_key_range(&mut buf, op.sub_range.as_ref());
            put_targets(&mut buf, &op.targets);
            buf.put_u32(op.batch_size);
            buf.put_u32(op.max_read_kb);
            put_opt_bytes(&mut buf, op.resume_key.as_deref());
            encode_include_tombstones(&mut buf, op.include_tombstones, sv)?;
        }
        Operation::PutBatch(op) => encode_put_batch(&mut buf, op, sv)?,
        Operation::QuerySinglePartition(q)
        | Operation::QueryMultiPartition(q)
        | Operation::QueryMultiShard(q) => encode_query(&mut buf, q),
        Operation::TableCharge(op) => {
            buf.put_u64(op.table_id);
            buf.put_u32(op.read_kb);
            buf.put_u32(op.write_kb);
        }
    }

    Ok(buf)
}

fn opcode_feature(opcode: OpCode) -> &'static str {
    match opcode {
        OpCode::PutResolve => "put resolve",
        OpCode::TableCharge => "table charge",
        _ => "operation",
    }
}

fn encode_put(buf: &mut BytesMut, put: &Put, sv: u16) -> Result<()> {
    put_bytes(buf, &put.key);
    put_table_id(buf, put.table_id);
    buf.put_u8(put.return_choice as u8);
    put_bytes(buf, &put.value.to_bytes()?);
    require(put.ttl.is_some() || put.update_ttl, "ttl", sv, TTL_SERIAL_VERSION)?;
    if sv >= TTL_SERIAL_VERSION {
        put_ttl(buf, put.ttl.as_ref());
        put_bool(buf, put.update_ttl);
    }
    Ok(())
}

fn encode_put_resolve(buf: &mut BytesMut, op: &PutResolve, sv: u16) -> Result<()> {
    require(
        op.expiration_time != 0 || op.creation_time != 0,
        "put resolve record times",
        sv,
        CREATION_TIME_SERIAL_VERSION,
    )?;
    put_bytes(buf, &op.key);
    put_table_id(buf, op.table_id);
    put_bytes(buf, &op.value);
    buf.put_u64(op.modification_time);
    buf.put_u32(op.region_id);
    put_bool(buf, op.tombstone);
    if sv >= CREATION_TIME_SERIAL_VERSION {
        buf.put_u64(op.expiration_time);
        buf.put_u64(op.creation_time);
    }
    Ok(())
}

fn encode_delete(buf: &mut BytesMut, delete: &Delete, sv: u16) -> Result<()> {
    put_bytes(buf, &delete.key);
    put_table_id(buf, delete.table_id);
    buf.put_u8(delete.return_choice as u8);
    require(delete.do_tombstone, "tombstone delete", sv, MULTI_REGION_SERIAL_VERSION)?;
    if sv >= MULTI_REGION_SERIAL_VERSION {
        put_bool(buf, delete.do_tombstone);
    }
    Ok(())
}

fn encode_include_tombstones(buf: &mut BytesMut, include: bool, sv: u16) -> Result<()> {
    require(include, "include tombstones", sv, MULTI_REGION_SERIAL_VERSION)?;
    if sv >= MULTI_REGION_SERIAL_VERSION {
        put_bool(buf, include);
    }
    Ok(())
}

fn encode_put_batch(buf: &mut BytesMut, op: &PutBatch, sv: u16) -> Result<()> {
    let uses_regions = op.use_put_resolve
        || op.local_region_id != NULL_REGION_ID
        || op
            .entries
            .iter()
            .any(|e| e.tombstone || e.region_id.is_some() || e.modification_time.is_some());
    require(uses_regions, "multi-region batch", sv, MULTI_REGION_SERIAL_VERSION)?;
    let uses_ttl = op.update_ttl || op.entries.iter().any(|e| e.ttl.is_some());
    require(uses_ttl, "ttl", sv, TTL_SERIAL_VERSION)?;

    put_table_id(buf, op.table_id);
    put_bool(buf, op.overwrite);
    if sv >= MULTI_REGION_SERIAL_VERSION {
        put_bool(buf, op.use_put_resolve);
        buf.put_u32(op.local_region_id);
    }
    if sv >= TTL_SERIAL_VERSION {
        put_bool(buf, op.update_ttl);
    }
    buf.put_u32(op.entries.len() as u32);
    for entry in &op.entries {
        put_bytes(buf, &entry.key);
        put_bytes(buf, &entry.value);
        if sv >= TTL_SERIAL_VERSION {
            put_ttl(buf, entry.ttl.as_ref());
        }
        if sv >= MULTI_REGION_SERIAL_VERSION {
            put_bool(buf, entry.tombstone);
            match entry.modification_time {
                Some(t) => {
                    put_bool(buf, true);
                    buf.put_u64(t);
                }
                None => put_bool(buf, false),
            }
            buf.put_u32(entry.region_id.unwrap_or(NULL_REGION_ID));
        }
    }
    Ok(())
}

fn encode_query(buf: &mut BytesMut, q: &Query) {
    put_bytes(buf, &q.plan);
    buf.put_u16(q.bind_variables.len() as u16);
    for (name, value) in &q.bind_variables {
        put_bytes(buf, name.as_bytes());
        put_bytes(buf, value);
    }
    buf.put_u16(q.table_ids.len() as u16);
    for id in &q.table_ids {
        buf.put_u64(*id);
    }
    put_bool(buf, q.is_update);
    buf.put_u32(q.batch_size);
    buf.put_u32(q.max_read_kb);
    buf.put_u16(q.partitions.len() as u16);
    for p in &q.partitions {
        buf.put_u32(*p);
    }
    encode_resume_info(buf, q.resume_info.as_ref());
}

pub(crate) fn encode_resume_info(buf: &mut BytesMut, info: Option<&ResumeInfo>) {
    let Some(info) = info else {
        put_bool(buf, false);
        return;
    };
    put_bool(buf, true);
    buf.put_u32(info.current_index);
    put_opt_bytes(buf, info.primary_key.as_deref());
    put_opt_bytes(buf, info.secondary_key.as_deref());
    buf.put_u64(info.num_results);
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode a request payload encoded with `serial_version`
pub fn decode_request_payload(mut buf: Bytes, serial_version: u16) -> Result<Request> {
    let sv = serial_version;
    check_serial_version(sv)?;

    let opcode = OpCode::try_from(get_u8(&mut buf, "opcode")?)?;
    if opcode.intro_serial_version() > sv {
        return Err(AtlasError::UnsupportedSerialVersion {
            feature: opcode_feature(opcode),
            found: sv,
            required: opcode.intro_serial_version(),
        });
    }
    let timeout_ms = get_u32(&mut buf, "timeout")?;
    let b = &mut buf;

    let operation = match opcode {
        OpCode::Nop => Operation::Nop,
        OpCode::Get => Operation::Get(Get {
            key: get_vec(b, "key")?,
            table_id: get_table_id(b)?,
        }),
        OpCode::Put => Operation::Put(decode_put(b, sv)?),
        OpCode::PutIfAbsent => Operation::PutIfAbsent(decode_put(b, sv)?),
        OpCode::PutIfPresent => Operation::PutIfPresent(decode_put(b, sv)?),
        OpCode::PutIfVersion => Operation::PutIfVersion(PutIfVersion {
            put: decode_put(b, sv)?,
            match_version: get_version(b)?,
        }),
        OpCode::PutResolve => Operation::PutResolve(decode_put_resolve(b, sv)?),
        OpCode::Delete => Operation::Delete(decode_delete(b, sv)?),
        OpCode::DeleteIfVersion => Operation::DeleteIfVersion(DeleteIfVersion {
            delete: decode_delete(b, sv)?,
            match_version: get_version(b)?,
        }),
        OpCode::MultiGet => Operation::MultiGet(decode_multi_get(b, sv)?),
        OpCode::MultiGetKeys => Operation::MultiGetKeys(decode_multi_get(b, sv)?),
        OpCode::MultiGetTable => Operation::MultiGetTable(decode_multi_get_table(b, sv)?),
        OpCode::MultiGetTableKeys => Operation::MultiGetTableKeys(decode_multi_get_table(b, sv)?),
        OpCode::TableIterate => Operation::TableIterate(decode_table_iterate(b, sv)?),
        OpCode::TableKeysIterate => Operation::TableKeysIterate(decode_table_iterate(b, sv)?),
        OpCode::IndexIterate => Operation::IndexIterate(decode_index_iterate(b)?),
        OpCode::IndexKeysIterate => Operation::IndexKeysIterate(decode_index_iterate(b)?),
        OpCode::MultiDeleteTable => Operation::MultiDeleteTable(MultiDeleteTable {
            parent_key: get_vec(b, "parent key")?,
            sub_range: get_key_range(b)?,
            targets: get_targets(b)?,
            max_write_kb: get_u32(b, "max write kb")?,
            resume_key: get_opt_vec(b, "resume key")?,
            do_tombstone: sv >= MULTI_REGION_SERIAL_VERSION && get_bool(b, "tombstone")?,
        }),
        OpCode::MultiGetBatchTable => Operation::MultiGetBatchTable(decode_bulk_get(b, sv)?),
        OpCode::MultiGetBatchTableKeys => {
            Operation::MultiGetBatchTableKeys(decode_bulk_get(b, sv)?)
        }
        OpCode::PutBatch => Operation::PutBatch(decode_put_batch(b, sv)?),
        OpCode::QuerySinglePartition => Operation::QuerySinglePartition(decode_query(b)?),
        OpCode::QueryMultiPartition => Operation::QueryMultiPartition(decode_query(b)?),
        OpCode::QueryMultiShard => Operation::QueryMultiShard(decode_query(b)?),
        OpCode::TableCharge => Operation::TableCharge(TableCharge {
            table_id: get_u64(b, "table id")?,
            read_kb: get_u32(b, "read kb")?,
            write_kb: get_u32(b, "write kb")?,
        }),
    };

    if !buf.is_empty() {
        return Err(AtlasError::Protocol(format!(
            "{} request has {} trailing bytes",
            opcode,
            buf.len()
        )));
    }

    Ok(Request {
        serial_version: sv,
        timeout_ms,
        operation,
    })
}

fn decode_put(b: &mut Bytes, sv: u16) -> Result<Put> {
    let key = get_vec(b, "key")?;
    let table_id = get_table_id(b)?;
    let return_choice = get_return_choice(b)?;
    let value = get_bytes(b, "value")?;
    let (ttl, update_ttl) = if sv >= TTL_SERIAL_VERSION {
        (get_ttl(b)?, get_bool(b, "update ttl")?)
    } else {
        (None, false)
    };
    Ok(Put {
        key,
        value: crate::value::RequestValue::Bytes(value),
        return_choice,
        table_id,
        ttl,
        update_ttl,
    })
}

fn decode_put_resolve(b: &mut Bytes, sv: u16) -> Result<PutResolve> {
    let key = get_vec(b, "key")?;
    let table_id = get_table_id(b)?;
    let value = get_bytes(b, "value")?;
    let modification_time = get_u64(b, "modification time")?;
    let region_id = get_u32(b, "region id")?;
    let tombstone = get_bool(b, "tombstone")?;
    let (expiration_time, creation_time) = if sv >= CREATION_TIME_SERIAL_VERSION {
        (get_u64(b, "expiration time")?, get_u64(b, "creation time")?)
    } else {
        (0, 0)
    };
    Ok(PutResolve {
        key,
        value,
        table_id,
        modification_time,
        region_id,
        tombstone,
        expiration_time,
        creation_time,
    })
}

fn decode_delete(b: &mut Bytes, sv: u16) -> Result<Delete> {
    Ok(Delete {
        key: get_vec(b, "key")?,
        table_id: get_table_id(b)?,
        return_choice: get_return_choice(b)?,
        do_tombstone: sv >= MULTI_REGION_SERIAL_VERSION && get_bool(b, "tombstone")?,
    })
}

fn decode_include_tombstones(b: &mut Bytes, sv: u16) -> Result<bool> {
    if sv >= MULTI_REGION_SERIAL_VERSION {
        get_bool(b, "include tombstones")
    } else {
        Ok(false)
    }
}

fn decode_multi_get(b: &mut Bytes, sv: u16) -> Result<MultiGet> {
    Ok(MultiGet {
        parent_key: get_vec(b, "parent key")?,
        sub_range: get_key_range(b)?,
        include_tombstones: decode_include_tombstones(b, sv)?,
    })
}

fn decode_multi_get_table(b: &mut Bytes, sv: u16) -> Result<MultiGetTable> {
    Ok(MultiGetTable {
        parent_key: get_vec(b, "parent key")?,
        sub_range: get_key_range(b)?,
        targets: get_targets(b)?,
        include_tombstones: decode_include_tombstones(b, sv)?,
    })
}

fn decode_table_iterate(b: &mut Bytes, sv: u16) -> Result<TableIterate> {
    Ok(TableIterate {
        parent_key: get_vec(b, "parent key")?,
        sub_range: get_key_range(b)?,
        targets: get_targets(b)?,
        direction: get_direction(b)?,
        batch_size: get_u32(b, "batch size")?,
        max_read_kb: get_u32(b, "max read kb")?,
        resume_key: get_opt_vec(b, "resume key")?,
        include_tombstones: decode_include_tombstones(b, sv)?,
    })
}

fn decode_index_iterate(b: &mut Bytes) -> Result<IndexIterate> {
    Ok(IndexIterate {
        index_name: get_string(b, "index name")?,
        targets: get_targets(b)?,
        range: get_key_range(b)?,
        direction: get_direction(b)?,
        batch_size: get_u32(b, "batch size")?,
        max_read_kb: get_u32(b, "max read kb")?,
        resume_secondary_key: get_opt_vec(b, "resume secondary key")?,
        resume_primary_key: get_opt_vec(b, "resume primary key")?,
    })
}

fn decode_bulk_get(b: &mut Bytes, sv: u16) -> Result<MultiGetBatchTable> {
    let count = get_u32(b, "parent key count")? as usize;
    let mut parent_keys = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        parent_keys.push(get_vec(b, "parent key")?);
    }
    Ok(MultiGetBatchTable {
        parent_keys,
        sub_range: get_key_range(b)?,
        targets: get_targets(b)?,
        batch_size: get_u32(b, "batch size")?,
        max_read_kb: get_u32(b, "max read kb")?,
        resume_key: get_opt_vec(b, "resume key")?,
        include_tombstones: decode_include_tombstones(b, sv)?,
    })
}

fn decode_put_batch(b: &mut Bytes, sv: u16) -> Result<PutBatch> {
    let table_id = get_table_id(b)?;
    let overwrite = get_bool(b, "overwrite")?;
    let (use_put_resolve, local_region_id) = if sv >= MULTI_REGION_SERIAL_VERSION {
        (get_bool(b, "use put resolve")?, get_u32(b, "local region id")?)
    } else {
        (false, NULL_REGION_ID)
    };
    let update_ttl = sv >= TTL_SERIAL_VERSION && get_bool(b, "update ttl")?;

    let count = get_u32(b, "entry count")? as usize;
    let mut entries = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let mut entry = BatchEntry::new(get_vec(b, "key")?, get_bytes(b, "value")?);
        if sv >= TTL_SERIAL_VERSION {
            entry.ttl = get_ttl(b)?;
        }
        if sv >= MULTI_REGION_SERIAL_VERSION {
            entry.tombstone = get_bool(b, "tombstone")?;
            entry.modification_time = if get_bool(b, "modification time")? {
                Some(get_u64(b, "modification time")?)
            } else {
                None
            };
            let region = get_u32(b, "region id")?;
            entry.region_id = (region != NULL_REGION_ID).then_some(region);
        }
        entries.push(entry);
    }

    Ok(PutBatch {
        table_id,
        entries,
        overwrite,
        use_put_resolve,
        local_region_id,
        update_ttl,
    })
}

fn decode_query(b: &mut Bytes) -> Result<Query> {
    let plan = get_bytes(b, "query plan")?;
    let var_count = get_u16(b, "bind variable count")? as usize;
    let mut bind_variables = Vec::with_capacity(var_count);
    for _ in 0..var_count {
        bind_variables.push((get_string(b, "bind name")?, get_bytes(b, "bind value")?));
    }
    let table_count = get_u16(b, "table count")? as usize;
    let mut table_ids = Vec::with_capacity(table_count);
    for _ in 0..table_count {
        table_ids.push(get_u64(b, "table id")?);
    }
    let is_update = get_bool(b, "is update")?;
    let batch_size = get_u32(b, "batch size")?;
    let max_read_kb = get_u32(b, "max read kb")?;
    let partition_count = get_u16(b, "partition count")? as usize;
    let mut partitions = Vec::with_capacity(partition_count);
    for _ in 0..partition_count {
        partitions.push(get_u32(b, "partition id")?);
    }
    let resume_info = decode_resume_info(b)?;
    Ok(Query {
        plan,
        bind_variables,
        table_ids,
        is_update,
        batch_size,
        max_read_kb,
        partitions,
        resume_info,
    })
}

pub(crate) fn decode_resume_info(b: &mut Bytes) -> Result<Option<ResumeInfo>> {
    if !get_bool(b, "resume info")? {
        return Ok(None);
    }
    Ok(Some(ResumeInfo {
        current_index: get_u32(b, "resume index")?,
        primary_key: get_opt_vec(b, "resume primary key")?,
        secondary_key: get_opt_vec(b, "resume secondary key")?,
        num_results: get_u64(b, "resume result count")?,
    }))
}
