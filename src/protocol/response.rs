//! Result encoding
//!
//! ## Payload
//! ```text
//! ┌───────────┬────────────┬─────────────┬───────────────────┬──────────────┐
//! │ Opcode(1) │ ReadKB (4) │ WriteKB (4) │ MetadataSeq (8)*  │ Result body  │
//! └───────────┴────────────┴─────────────┴───────────────────┴──────────────┘
//! ```
//! `*` from `TABLE_CHARGE_SERIAL_VERSION` on.
//!
//! The opcode is the one of the operation that produced the result. The body
//! layout is selected by the opcode's [`ResultKind`], never by anything else.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{AtlasError, Result};
use crate::ops::{
    BulkGetResult, DeleteResult, GetResult, IterateResult, KeyBatch, MultiDeleteResult, OpCode,
    OpResult, PreviousRecord, PutBatchResult, PutResult, QueryResult, ResultKind, ResultPayload,
    ResultRecord,
};

use super::command::{decode_resume_info, encode_resume_info};
use super::serial::{
    check_serial_version, CREATION_TIME_SERIAL_VERSION, MULTI_REGION_SERIAL_VERSION,
    TABLE_CHARGE_SERIAL_VERSION, TTL_SERIAL_VERSION,
};
use super::wire::*;

// =============================================================================
// Encoding
// =============================================================================

/// Encode a result payload (no frame header)
pub fn encode_result_payload(result: &OpResult, serial_version: u16) -> Result<BytesMut> {
    let sv = serial_version;
    check_serial_version(sv)?;
    result.check_type(result.opcode)?;

    let mut buf = BytesMut::with_capacity(64);
    buf.put_u8(result.opcode as u8);
    buf.put_u32(result.read_kb);
    buf.put_u32(result.write_kb);
    if sv >= TABLE_CHARGE_SERIAL_VERSION {
        buf.put_u64(result.metadata_seq_num);
    }

    match &result.payload {
        ResultPayload::Nop | ResultPayload::TableCharge => {}
        ResultPayload::Get(r) => {
            put_opt_bytes(&mut buf, r.value.as_deref());
            put_opt_version(&mut buf, r.version.as_ref());
            encode_times(&mut buf, r.expiration_time, r.creation_time, r.modification_time, sv);
        }
        ResultPayload::Put(r) => {
            put_opt_version(&mut buf, r.new_version.as_ref());
            if sv >= TTL_SERIAL_VERSION {
                buf.put_u64(r.expiration_time);
            }
            encode_previous(&mut buf, r.previous.as_ref(), sv);
        }
        ResultPayload::Delete(r) => {
            put_bool(&mut buf, r.deleted);
            encode_previous(&mut buf, r.previous.as_ref(), sv);
        }
        ResultPayload::Iterate(r) => {
            encode_records(&mut buf, &r.records, sv);
            put_bool(&mut buf, r.more);
            put_opt_bytes(&mut buf, r.resume_key.as_deref());
            put_opt_bytes(&mut buf, r.resume_secondary_key.as_deref());
        }
        ResultPayload::MultiDelete(r) => {
            buf.put_u32(r.num_deleted);
            put_bool(&mut buf, r.more);
            put_opt_bytes(&mut buf, r.resume_key.as_deref());
        }
        ResultPayload::BulkGet(r) => {
            buf.put_u32(r.batches.len() as u32);
            for batch in &r.batches {
                buf.put_u32(batch.key_index);
                encode_records(&mut buf, &batch.records, sv);
            }
            put_bool(&mut buf, r.more);
            buf.put_u32(r.resume_parent_index);
            put_opt_bytes(&mut buf, r.resume_key.as_deref());
        }
        ResultPayload::PutBatch(r) => {
            buf.put_u32(r.num_put);
            buf.put_u32(r.key_present_indices.len() as u32);
            for i in &r.key_present_indices {
                buf.put_u32(*i);
            }
        }
        ResultPayload::Query(r) => {
            buf.put_u32(r.rows.len() as u32);
            for row in &r.rows {
                put_bytes(&mut buf, row);
            }
            put_bool(&mut buf, r.more);
            encode_resume_info(&mut buf, r.resume_info.as_ref());
        }
    }

    Ok(buf)
}

fn encode_times(buf: &mut BytesMut, expiration: u64, creation: u64, modification: u64, sv: u16) {
    if sv >= TTL_SERIAL_VERSION {
        buf.put_u64(expiration);
    }
    if sv >= CREATION_TIME_SERIAL_VERSION {
        buf.put_u64(creation);
        buf.put_u64(modification);
    }
}

fn encode_previous(buf: &mut BytesMut, previous: Option<&PreviousRecord>, sv: u16) {
    let Some(prev) = previous else {
        put_bool(buf, false);
        return;
    };
    put_bool(buf, true);
    put_opt_bytes(buf, prev.value.as_deref());
    put_opt_version(buf, prev.version.as_ref());
    encode_times(
        buf,
        prev.expiration_time,
        prev.creation_time,
        prev.modification_time,
        sv,
    );
}

fn encode_records(buf: &mut BytesMut, records: &[ResultRecord], sv: u16) {
    buf.put_u32(records.len() as u32);
    for rec in records {
        put_bytes(buf, &rec.key);
        put_opt_bytes(buf, rec.value.as_deref());
        put_opt_version(buf, rec.version.as_ref());
        encode_times(
            buf,
            rec.expiration_time,
            rec.creation_time,
            rec.modification_time,
            sv,
        );
        if sv >= MULTI_REGION_SERIAL_VERSION {
            put_bool(buf, rec.tombstone);
        }
        put_opt_bytes(buf, rec.index_key.as_deref());
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode a result payload, requiring the shape `expected` produces
pub fn decode_result_payload(mut buf: Bytes, serial_version: u16, expected: OpCode) -> Result<OpResult> {
    let sv = serial_version;
    check_serial_version(sv)?;

    let opcode = OpCode::try_from(get_u8(&mut buf, "result opcode")?)?;
    if opcode != expected {
        return Err(AtlasError::ResultTypeMismatch {
            expected: format!("{} ({:?})", expected, expected.result_kind()),
            actual: format!("{} ({:?})", opcode, opcode.result_kind()),
        });
    }

    let b = &mut buf;
    let read_kb = get_u32(b, "read kb")?;
    let write_kb = get_u32(b, "write kb")?;
    let metadata_seq_num = if sv >= TABLE_CHARGE_SERIAL_VERSION {
        get_u64(b, "metadata sequence number")?
    } else {
        0
    };

    let payload = match expected.result_kind() {
        ResultKind::Nop => ResultPayload::Nop,
        ResultKind::TableCharge => ResultPayload::TableCharge,
        ResultKind::Get => {
            let value = get_opt_bytes(b, "value")?;
            let version = get_opt_version(b)?;
            let (expiration_time, creation_time, modification_time) = decode_times(b, sv)?;
            ResultPayload::Get(GetResult {
                value,
                version,
                creation_time,
                modification_time,
                expiration_time,
            })
        }
        ResultKind::Put => {
            let new_version = get_opt_version(b)?;
            let expiration_time = if sv >= TTL_SERIAL_VERSION {
                get_u64(b, "expiration time")?
            } else {
                0
            };
            ResultPayload::Put(PutResult {
                new_version,
                expiration_time,
                previous: decode_previous(b, sv)?,
            })
        }
        ResultKind::Delete => ResultPayload::Delete(DeleteResult {
            deleted: get_bool(b, "deleted")?,
            previous: decode_previous(b, sv)?,
        }),
        ResultKind::Iterate => ResultPayload::Iterate(IterateResult {
            records: decode_records(b, sv)?,
            more: get_bool(b, "more")?,
            resume_key: get_opt_vec(b, "resume key")?,
            resume_secondary_key: get_opt_vec(b, "resume secondary key")?,
        }),
        ResultKind::MultiDelete => ResultPayload::MultiDelete(MultiDeleteResult {
            num_deleted: get_u32(b, "deleted count")?,
            more: get_bool(b, "more")?,
            resume_key: get_opt_vec(b, "resume key")?,
        }),
        ResultKind::BulkGet => {
            let count = get_u32(b, "batch count")? as usize;
            let mut batches = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                batches.push(KeyBatch {
                    key_index: get_u32(b, "key index")?,
                    records: decode_records(b, sv)?,
                });
            }
            ResultPayload::BulkGet(BulkGetResult {
                batches,
                more: get_bool(b, "more")?,
                resume_parent_index: get_u32(b, "resume parent index")?,
                resume_key: get_opt_vec(b, "resume key")?,
            })
        }
        ResultKind::PutBatch => {
            let num_put = get_u32(b, "put count")?;
            let count = get_u32(b, "present count")? as usize;
            let mut key_present_indices = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                key_present_indices.push(get_u32(b, "present index")?);
            }
            ResultPayload::PutBatch(PutBatchResult {
                num_put,
                key_present_indices,
            })
        }
        ResultKind::Query => {
            let count = get_u32(b, "row count")? as usize;
            let mut rows = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                rows.push(get_bytes(b, "row")?);
            }
            ResultPayload::Query(QueryResult {
                rows,
                more: get_bool(b, "more")?,
                resume_info: decode_resume_info(b)?,
            })
        }
    };

    if !buf.is_empty() {
        return Err(AtlasError::Protocol(format!(
            "{} result has {} trailing bytes",
            opcode,
            buf.len()
        )));
    }

    OpResult::new(opcode, read_kb, write_kb, metadata_seq_num, payload)
}

/// (expiration, creation, modification)
fn decode_times(b: &mut Bytes, sv: u16) -> Result<(u64, u64, u64)> {
    let expiration = if sv >= TTL_SERIAL_VERSION {
        get_u64(b, "expiration time")?
    } else {
        0
    };
    let (creation, modification) = if sv >= CREATION_TIME_SERIAL_VERSION {
        (get_u64(b, "creation time")?, get_u64(b, "modification time")?)
    } else {
        (0, 0)
    };
    Ok((expiration, creation, modification))
}

fn decode_previous(b: &mut Bytes, sv: u16) -> Result<Option<PreviousRecord>> {
    if !get_bool(b, "previous record")? {
        return Ok(None);
    }
    let value = get_opt_bytes(b, "previous value")?;
    let version = get_opt_version(b)?;
    let (expiration_time, creation_time, modification_time) = decode_times(b, sv)?;
    Ok(Some(PreviousRecord {
        value,
        version,
        creation_time,
        modification_time,
        expiration_time,
    }))
}

fn decode_records(b: &mut Bytes, sv: u16) -> Result<Vec<ResultRecord>> {
    let count = get_u32(b, "record count")? as usize;
    let mut records = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let key = get_vec(b, "record key")?;
        let value = get_opt_bytes(b, "record value")?;
        let version = get_opt_version(b)?;
        let (expiration_time, creation_time, modification_time) = decode_times(b, sv)?;
        let tombstone = sv >= MULTI_REGION_SERIAL_VERSION && get_bool(b, "tombstone")?;
        let index_key = get_opt_vec(b, "index key")?;
        records.push(ResultRecord {
            key,
            value,
            version,
            creation_time,
            modification_time,
            expiration_time,
            tombstone,
            index_key,
        });
    }
    Ok(records)
}
